use clap::Parser;
use ecctrl::{Interface, Transfer, clock::SystemClock, frame::DeviceClass};
use std::error::Error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Register address (hex format, e.g. `0x0000_1000`)
    #[arg(short, long, value_parser = parse_hex)]
    address: u32,

    /// Number of bytes to read
    #[arg(short, long, default_value_t = 4)]
    size: usize,

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

fn parse_hex(s: &str) -> Result<u32, std::num::ParseIntError> {
    let s = s.replace('_', "");

    u32::from_str_radix(s.strip_prefix("0x").unwrap_or(&s), 16)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
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
    let mut buf = vec![0x00; args.size];
    let status = intf.read_register(&xfer, &mut buf)?;

    println!("Register {:08x}: {buf:02x?}", args.address);

    if status != ecctrl::STATUS_OK {
        println!("Device reported status {status}");
    }

    Ok(())
}
