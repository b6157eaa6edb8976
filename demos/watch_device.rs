//! Example watching a device identity for plug/unplug events.
//!
//! Waits for the device, then keeps a background scan running and prints
//! every arrival and removal until 30 seconds have passed.
//!
//! Run with: cargo run --example watch_device -- 1234 5678

use hid_session::{DeviceIdentity, DeviceMonitor, HidApiBackend, MonitorEvent};
use std::sync::Arc;
use std::{env, thread, time::Duration};

fn parse_hex(arg: Option<String>, name: &str) -> Result<u16, Box<dyn std::error::Error>> {
    let arg = arg.ok_or_else(|| format!("missing {} argument (hex)", name))?;
    Ok(u16::from_str_radix(arg.trim_start_matches("0x"), 16)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let identity = DeviceIdentity::new(parse_hex(args.next(), "VID")?, parse_hex(args.next(), "PID")?);

    println!("HID Device Watcher");
    println!("==================");
    println!("Watching {} (plug or unplug it to see events)\n", identity);

    let backend = Arc::new(HidApiBackend::new()?);
    let monitor = DeviceMonitor::new(backend, identity);

    println!("1. Waiting up to 5 s for the device...");
    if monitor.wait_for_device_default() {
        println!("   Device present.");
    } else {
        println!("   Device not found yet.");
    }

    println!("\n2. Background scan (30 s):");
    let events = monitor.subscribe();
    monitor.start_background_scan()?;
    for _ in 0..30 {
        thread::sleep(Duration::from_secs(1));
        for event in events.try_iter() {
            match event {
                MonitorEvent::Arrived(id) => println!("   [+] ARRIVED: {}", id),
                MonitorEvent::Removed(id) => println!("   [-] REMOVED: {}", id),
            }
        }
        if !monitor.is_scanning() {
            println!("   Scan stopped after a transport error, restarting.");
            monitor.start_background_scan()?;
        }
    }
    monitor.stop_background_scan();
    println!("\nDone. Device connected: {}", monitor.is_connected());
    Ok(())
}
