//! Example opening a session and dumping device information.
//!
//! Prints the string descriptors, then reads a few input reports.
//!
//! Run with: cargo run --example session_info -- 1234 5678 [serial]

use hid_session::{DeviceIdentity, DeviceSession, HidApiBackend, ReportShape, SessionConfig};
use std::env;
use std::sync::Arc;

fn parse_hex(arg: Option<String>, name: &str) -> Result<u16, Box<dyn std::error::Error>> {
    let arg = arg.ok_or_else(|| format!("missing {} argument (hex)", name))?;
    Ok(u16::from_str_radix(arg.trim_start_matches("0x"), 16)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let identity = DeviceIdentity::new(parse_hex(args.next(), "VID")?, parse_hex(args.next(), "PID")?);
    let mut config = SessionConfig::new(identity).with_report_shape(ReportShape::default());
    if let Some(serial) = args.next() {
        config = config.with_serial_number(serial);
    }

    let backend = Arc::new(HidApiBackend::new()?);
    let session = DeviceSession::open(backend, config);
    if !session.is_open() {
        eprintln!("Could not open {}.", identity);
        eprintln!("Ensure device is connected and permissions are set (e.g., udev rules on Linux).");
        return Ok(());
    }

    println!("Opened {}", identity);
    print!("{}", session.description()?);
    match session.indexed_string(1) {
        Ok(s) => println!("String descriptor #1: {}", s),
        Err(e) => println!("String descriptor #1 unavailable: {}", e),
    }

    println!("\nReading up to 5 input reports (500 ms timeout each)...");
    let mut buf = [0u8; 65];
    for i in 0..5 {
        match session.read_timeout(&mut buf, 500, 0)? {
            0 => println!("  [{}] timeout", i),
            n => println!("  [{}] {} bytes: {:02X?}", i, n, &buf[..n]),
        }
    }

    session.release();
    Ok(())
}
