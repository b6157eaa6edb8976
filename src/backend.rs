//! The native HID transport seam consumed by [`DeviceMonitor`](crate::DeviceMonitor)
//! and [`DeviceSession`](crate::DeviceSession).
//!
//! The trait mirrors the hidapi C surface: I/O calls return a signed count or
//! status where a negative value signals failure, and the failure detail is
//! fetched afterwards with [`HidBackend::last_error`]. Error state is scoped to
//! the device handle, so callers must query it before another thread gets a
//! chance to touch the same handle.

use crate::error::Result;
use std::fmt;

/// Which string descriptor to request from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringDescriptor {
    Manufacturer,
    Product,
    SerialNumber,
    /// A string descriptor by raw index.
    Indexed(i32),
}

impl fmt::Display for StringDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringDescriptor::Manufacturer => write!(f, "manufacturer"),
            StringDescriptor::Product => write!(f, "product"),
            StringDescriptor::SerialNumber => write!(f, "serial number"),
            StringDescriptor::Indexed(index) => write!(f, "indexed ({})", index),
        }
    }
}

/// Capability surface of a native HID transport.
///
/// One backend instance is shared (behind an `Arc`) by every monitor and
/// session that talks to it, hence `Send + Sync`. Device handles only need to
/// be `Send`: a session keeps its handle behind a mutex.
pub trait HidBackend: Send + Sync + 'static {
    /// Result of a successful, non-empty enumeration. Holding one may keep the
    /// device busy for other processes; hand it back with `free_enumeration`.
    type Enumeration;
    /// An opened device handle.
    type Device: Send;

    /// Enumerates devices matching `vid`/`pid`. `Ok(None)` means nothing matched.
    fn enumerate(&self, vid: u16, pid: u16) -> Result<Option<Self::Enumeration>>;

    /// Releases an enumeration obtained from `enumerate`.
    fn free_enumeration(&self, enumeration: Self::Enumeration);

    /// Opens the first device matching `vid`/`pid` (and `serial`, if given).
    /// Returns `None` when the device cannot be opened.
    fn open(&self, vid: u16, pid: u16, serial: Option<&str>) -> Option<Self::Device>;

    /// Reads one input report into `buf`, waiting at most `timeout_ms`
    /// (negative waits indefinitely). Returns bytes read, 0 on timeout, or a
    /// negative value on failure.
    fn read_timeout(&self, device: &mut Self::Device, buf: &mut [u8], timeout_ms: i32) -> i32;

    /// Writes one output report; `frame[0]` is the report ID. Returns bytes
    /// written or a negative value on failure.
    fn write(&self, device: &mut Self::Device, frame: &[u8]) -> i32;

    /// Switches the handle between blocking and non-blocking reads.
    /// Returns 0 on success, negative on failure.
    fn set_nonblocking(&self, device: &mut Self::Device, nonblocking: bool) -> i32;

    /// Discards pending input reports. Returns 0 on success.
    fn flush_input(&self, device: &mut Self::Device) -> i32;

    /// Reads a string descriptor, truncated to `max_chars` characters.
    /// Returns `None` on failure.
    fn get_string(
        &self,
        device: &mut Self::Device,
        descriptor: StringDescriptor,
        max_chars: usize,
    ) -> Option<String>;

    /// Describes the last failure on this handle, if any.
    fn last_error(&self, device: &Self::Device) -> Option<String>;

    /// Closes the handle.
    fn close(&self, device: Self::Device);

    /// Tears down the backend's global state. Handles opened earlier must not
    /// be used afterwards.
    fn shutdown(&self);
}
