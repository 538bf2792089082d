use clap::Parser;
use ecctrl::{Interface, Transfer, clock::SystemClock, frame::DeviceClass};
use std::{error::Error, num::ParseIntError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Register address (hex format, e.g. `0x0000_1000`)
    #[arg(short, long, value_parser = parse_hex)]
    address: u32,

    /// Bytes to write (hex format, e.g. `aabbccdd`)
    #[arg(short, long)]
    data: String,

    /// Per-call timeout in milliseconds (0 selects the default)
    #[arg(short, long, default_value_t = 0)]
    timeout: u32,

    /// Retry slots per phase (0 selects the default)
    #[arg(short = 'r', long, default_value_t = 0, allow_negative_numbers = true)]
    max_retries: i32,

    /// Prefix frames with a timeout hint byte (USB video class bridges)
    #[arg(short, long)]
    class_tagged: bool,

    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Serial port baud rate
    #[arg(short, long, default_value_t = 115_200)]
    baud_rate: u32,
}

fn parse_hex(s: &str) -> Result<u32, ParseIntError> {
    let s = s.replace('_', "");

    u32::from_str_radix(s.strip_prefix("0x").unwrap_or(&s), 16)
}

fn parse_bytes(s: &str) -> Result<Vec<u8>, ParseIntError> {
    let digits: Vec<char> = s
        .trim_start_matches("0x")
        .chars()
        .filter(|&c| c != '_' && !c.is_whitespace())
        .collect();

    digits
        .chunks(2)
        .map(|pair| u8::from_str_radix(&pair.iter().collect::<String>(), 16))
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let data = parse_bytes(&args.data)?;
    let class = if args.class_tagged {
        DeviceClass::ClassTagged
    } else {
        DeviceClass::RawI2c
    };
    let xfer = Transfer::new(args.address)
        .with_timeout(args.timeout)
        .with_max_retries(args.max_retries)
        .with_class(class);

    let port = ecctrl::serial::open(&args.port, args.baud_rate)?;
    let mut intf = Interface::new(port, SystemClock::new());
    let status = intf.write_register(&xfer, &data)?;

    println!("Wrote {} bytes to register {:08x}", data.len(), args.address);

    if status != ecctrl::STATUS_OK {
        println!("Device reported status {status}");
    }

    Ok(())
}
