use clap::Parser;
use ecctrl::{FifoFlags, Interface, Transfer, clock::SystemClock, frame::DeviceClass};
use std::{error::Error, fs, ops::ControlFlow};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// FIFO address (hex format, e.g. `0x0000_2000`)
    #[arg(short, long, value_parser = parse_hex)]
    address: u32,

    /// Input filename streamed into the FIFO
    #[arg(short, long)]
    input: String,

    /// Stream flags (e.g. `START | END | RETRY`)
    #[arg(short, long, value_parser = parse_flags, default_value = "START | END")]
    flags: FifoFlags,

    /// Maximum payload per chunk
    #[arg(short, long)]
    max_payload: Option<usize>,

    /// Per-call timeout in milliseconds (0 selects the default)
    #[arg(short, long, default_value_t = 0)]
    timeout: u32,

    /// Retry slots per phase (0 selects the default, negative stops at the first failure)
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

fn parse_flags(s: &str) -> Result<FifoFlags, String> {
    s.parse().map_err(|err: bitflags::parser::ParseError| err.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let data = fs::read(&args.input)?;
    let class = if args.class_tagged {
        DeviceClass::ClassTagged
    } else {
        DeviceClass::RawI2c
    };
    let mut sent = 0;
    let mut progress = || {
        sent += 1;
        println!("Sent chunk {sent}");

        ControlFlow::Continue(())
    };
    let mut xfer = Transfer::new(args.address)
        .with_timeout(args.timeout)
        .with_max_retries(args.max_retries)
        .with_flags(args.flags)
        .with_class(class)
        .with_callback(&mut progress);

    let port = ecctrl::serial::open(&args.port, args.baud_rate)?;
    let mut intf = Interface::new(port, SystemClock::new());

    if let Some(size) = args.max_payload {
        intf.set_max_payload(size);
    }

    let done = intf.write_fifo(&mut xfer, &data)?;

    println!(
        "Wrote {} of {} bytes to FIFO {:08x} (status {})",
        done.len,
        data.len(),
        args.address,
        done.status
    );

    Ok(())
}
