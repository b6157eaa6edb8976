//! # hid-session
//!
//! Thread-safe access to a USB HID endpoint, plus a presence monitor that
//! reports when a device is plugged in or removed.
//!
//! This crate uses the `hidapi` crate for cross-platform USB HID communication,
//! behind the [`HidBackend`] trait so the concurrency core can be driven by any
//! transport (including a mock in tests).
//!
//! ## Features
//!
//! *   Presence monitoring (`DeviceMonitor`):
//!     *   One-shot probes (`scan_once`) that never hold the device open.
//!     *   Blocking waits with timeout (`wait_for_device`).
//!     *   A background poll thread (`start_background_scan`, `stop_background_scan`)
//!         with cooperative cancellation.
//!     *   Edge-triggered arrival/removal events via callbacks or a channel (`subscribe`).
//! *   Device sessions (`DeviceSession`):
//!     *   Output reports with report ID prefix and fixed-size padding (`write`, `write_report`).
//!     *   Input reports with timeout (`read`, `read_timeout`).
//!     *   Blocking mode and input flush (`set_nonblocking`, `flush_input`).
//!     *   String descriptors (`manufacturer`, `product`, `serial_number`, `indexed_string`).
//!     *   Idempotent release, also performed on drop.
//!
//! ## Concurrency
//!
//! *   Every operation on a `DeviceSession` runs under one lock, so no two reads,
//!     writes, control calls or string queries on the same handle ever overlap.
//!     Share a session between threads with `Arc<DeviceSession<_>>`.
//! *   A `DeviceMonitor` runs at most one background poll loop. Events are
//!     delivered on the thread running the poll.
//! *   Monitors and sessions share no state; use a monitor to learn that a device
//!     is present, then open a session to talk to it.
//!
//! ## Report Sizes
//!
//! HID report descriptors are not parsed, so the report layout must be known in
//! advance and passed as a [`ReportShape`]:
//!
//! *   Writes always send `output_len + 1` bytes: the report ID (0 for devices
//!     without report IDs) followed by the zero-padded payload.
//! *   Reads request `input_len` bytes by default. For devices that use report IDs,
//!     byte 0 of the buffer is the report ID and the length must include it.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use hid_session::{DeviceIdentity, DeviceMonitor, DeviceSession, HidApiBackend, Result, SessionConfig};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let backend = Arc::new(HidApiBackend::new()?);
//!     let identity = DeviceIdentity::new(0x1234, 0x5678);
//!
//!     let monitor = DeviceMonitor::new(Arc::clone(&backend), identity);
//!     monitor.on_arrival(|id| println!("{} arrived", id));
//!     monitor.on_removed(|id| println!("{} removed", id));
//!
//!     if !monitor.wait_for_device(5000, 500) {
//!         eprintln!("Device not found");
//!         return Ok(());
//!     }
//!
//!     let session = DeviceSession::open(backend, SessionConfig::new(identity));
//!     if !session.is_open() {
//!         eprintln!("Device present but could not be opened (permissions?)");
//!         return Ok(());
//!     }
//!     print!("{}", session.description()?);
//!
//!     session.write(&[0x01, 0x02])?;
//!     let mut buf = [0u8; 65];
//!     let n = session.read_timeout(&mut buf, 1000, 0)?;
//!     println!("Received {:02X?}", &buf[..n]);
//!
//!     monitor.start_background_scan()?;
//!     // ... the monitor now reports plug/unplug events in the background.
//!     monitor.stop_background_scan();
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **Linux udev Rules:** Grant user permission to the HID device. Create `/etc/udev/rules.d/99-hid-session.rules`:
//!     ```udev
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="1234", ATTRS{idProduct}=="5678", MODE="0666", GROUP="plugdev"
//!     ```
//!     *(Adjust IDs and `GROUP` as needed)*. Reload: `sudo udevadm control --reload-rules && sudo udevadm trigger`
//!
//! ## License
//!
//! This project is licensed under the WTFPL - see the [LICENSE](LICENSE) file for details.

use std::fmt;

mod backend;
mod consts;
mod error;
mod hidapi_backend;
pub mod monitor;
pub mod report;
pub mod session;

pub use backend::{HidBackend, StringDescriptor};
pub use error::{Error, Result};
pub use hidapi_backend::{HidApiBackend, HidApiDevice, HidEnumeration};
pub use monitor::{DeviceMonitor, MonitorConfig, MonitorEvent, Presence, PresenceTracker, Transition};
pub use report::ReportShape;
pub use session::{DeviceSession, SessionConfig};
// Re-export only the defaults callers are likely to pass explicitly
pub use consts::{
    DEFAULT_INPUT_REPORT_LEN, DEFAULT_OUTPUT_REPORT_LEN, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_SCAN_INTERVAL_MS, DEFAULT_WAIT_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
    MAX_INPUT_REPORT_LEN,
};

/// Vendor/product pair identifying a class of devices (not a specific unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VID=0x{:04X} PID=0x{:04X}", self.vendor_id, self.product_id)
    }
}
