//! Exclusive, serialized access to one opened HID device.

use crate::backend::{HidBackend, StringDescriptor};
use crate::consts;
use crate::error::{describe, Error, Result};
use crate::report::ReportShape;
use crate::DeviceIdentity;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Parameters for opening a [`DeviceSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub identity: DeviceIdentity,
    /// Optional serial number discriminator. `None` (or an empty string)
    /// opens the first device matching the identity.
    pub serial_number: Option<String>,
    pub report_shape: ReportShape,
    /// Timeout used by [`DeviceSession::read`].
    pub read_timeout_ms: i32,
}

impl SessionConfig {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            serial_number: None,
            report_shape: ReportShape::default(),
            read_timeout_ms: consts::DEFAULT_READ_TIMEOUT_MS,
        }
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_report_shape(mut self, shape: ReportShape) -> Self {
        self.report_shape = shape;
        self
    }

    pub fn with_read_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    /// Serial discriminator with the empty string treated as "none".
    fn serial_filter(&self) -> Option<&str> {
        self.serial_number.as_deref().filter(|s| !s.is_empty())
    }
}

// Handle state guarded by the session lock.
struct HandleState<D> {
    device: Option<D>,
    released: bool,
}

/// A handle to one opened HID device.
///
/// Every operation that touches the handle (reads, writes, control calls,
/// string queries and release) runs under a single mutex, so at most one of
/// them is in flight at a time. The session is `Send + Sync` and can be
/// shared across threads behind an `Arc`.
///
/// Opening never fails: if the device could not be opened the session stays
/// closed, [`is_open`](Self::is_open) returns false and every operation
/// returns [`Error::NotOpen`]. The handle is closed exactly once, by
/// [`release`](Self::release) or on drop.
pub struct DeviceSession<B: HidBackend> {
    backend: Arc<B>,
    identity: DeviceIdentity,
    shape: ReportShape,
    read_timeout_ms: AtomicI32,
    // Mirrors `state.device.is_some()` so `is_open` does not wait behind a read.
    open: AtomicBool,
    state: Mutex<HandleState<B::Device>>,
}

impl<B: HidBackend> DeviceSession<B> {
    /// Opens a session. Failure to open is not an error; check [`is_open`](Self::is_open).
    pub fn open(backend: Arc<B>, config: SessionConfig) -> Self {
        let identity = config.identity;
        let device = backend.open(
            identity.vendor_id,
            identity.product_id,
            config.serial_filter(),
        );
        if device.is_some() {
            debug!("Session opened for {}", identity);
        } else {
            warn!(
                "Could not open {} (serial {:?}); session stays closed",
                identity,
                config.serial_filter()
            );
        }
        Self {
            backend,
            identity,
            shape: config.report_shape,
            read_timeout_ms: AtomicI32::new(config.read_timeout_ms),
            open: AtomicBool::new(device.is_some()),
            state: Mutex::new(HandleState {
                device,
                released: false,
            }),
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn report_shape(&self) -> ReportShape {
        self.shape
    }

    /// True while the session holds an open device handle.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn read_timeout_ms(&self) -> i32 {
        self.read_timeout_ms.load(Ordering::Relaxed)
    }

    pub fn set_read_timeout_ms(&self, timeout_ms: i32) {
        self.read_timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, HandleState<B::Device>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Runs `op` on the open handle while holding the session lock.
    fn with_device<T>(&self, op: impl FnOnce(&B, &mut B::Device) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        if state.released {
            return Err(Error::Released);
        }
        match state.device.as_mut() {
            Some(device) => op(self.backend.as_ref(), device),
            None => Err(Error::NotOpen),
        }
    }

    // --- Output Reports ---

    /// Writes `data` as an output report with the default report ID (0).
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_report(consts::DEFAULT_REPORT_ID, data)
    }

    /// Writes `data` as an output report prefixed with `report_id`.
    ///
    /// The frame handed to the transport is always `output_len + 1` bytes,
    /// zero-padded. Returns the byte count reported by the transport.
    pub fn write_report(&self, report_id: u8, data: &[u8]) -> Result<usize> {
        self.with_device(|backend, device| {
            let frame = self.shape.build_output_frame(report_id, data)?;
            trace!("Writing output report: {:02X?}", &frame[..]);
            let written = backend.write(device, &frame);
            if written < 0 {
                // Error state belongs to the handle: fetch it before unlocking.
                let message = describe(backend.last_error(device));
                warn!("Write to {} failed: {}", self.identity, message);
                return Err(Error::Write {
                    code: written,
                    message,
                });
            }
            Ok(written as usize)
        })
    }

    // --- Input Reports ---

    /// Reads one input report using the session's read timeout and the
    /// default input length.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        self.read_timeout(buffer, self.read_timeout_ms(), 0)
    }

    /// Reads one input report, waiting at most `timeout_ms` (negative blocks
    /// until data arrives).
    ///
    /// `length` of 0 selects the default input length. When the device uses
    /// report IDs, byte 0 of `buffer` receives the report ID and `length` must
    /// account for it. Returns the number of bytes read (0 on timeout).
    pub fn read_timeout(&self, buffer: &mut [u8], timeout_ms: i32, length: usize) -> Result<usize> {
        let length = self.shape.read_len(length);
        self.with_device(|backend, device| {
            if buffer.len() < length {
                return Err(Error::BufferTooSmall {
                    expected: length,
                    actual: buffer.len(),
                });
            }
            let read = backend.read_timeout(device, &mut buffer[..length], timeout_ms);
            if read < 0 {
                let message = describe(backend.last_error(device));
                warn!("Read from {} failed: {}", self.identity, message);
                return Err(Error::Read {
                    code: read,
                    message,
                });
            }
            let read = read as usize;
            trace!("Read input report: {:02X?}", &buffer[..read]);
            Ok(read)
        })
    }

    // --- Control ---

    /// Switches reads between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.with_device(|backend, device| {
            let status = backend.set_nonblocking(device, nonblocking);
            if status < 0 {
                return Err(Error::Control {
                    operation: "set_nonblocking",
                    code: status,
                    message: describe(backend.last_error(device)),
                });
            }
            debug!("{}: non-blocking mode = {}", self.identity, nonblocking);
            Ok(())
        })
    }

    /// Discards pending input reports. Returns whether the transport reported success.
    pub fn flush_input(&self) -> Result<bool> {
        self.with_device(|backend, device| {
            let status = backend.flush_input(device);
            if status != 0 {
                debug!("{}: flush_input returned {}", self.identity, status);
            }
            Ok(status == 0)
        })
    }

    /// Last-error text of the handle, if the transport recorded one.
    pub fn last_error(&self) -> Result<Option<String>> {
        self.with_device(|backend, device| Ok(backend.last_error(device)))
    }

    // --- String Descriptors ---

    pub fn manufacturer(&self) -> Result<String> {
        self.string_descriptor(StringDescriptor::Manufacturer)
    }

    pub fn product(&self) -> Result<String> {
        self.string_descriptor(StringDescriptor::Product)
    }

    pub fn serial_number(&self) -> Result<String> {
        self.string_descriptor(StringDescriptor::SerialNumber)
    }

    pub fn indexed_string(&self, index: i32) -> Result<String> {
        self.string_descriptor(StringDescriptor::Indexed(index))
    }

    fn string_descriptor(&self, descriptor: StringDescriptor) -> Result<String> {
        self.with_device(|backend, device| {
            backend
                .get_string(device, descriptor, consts::STRING_BUFFER_CHARS)
                .ok_or_else(|| Error::StringQuery {
                    descriptor,
                    message: describe(backend.last_error(device)),
                })
        })
    }

    /// Human-readable summary of the device's string descriptors.
    pub fn description(&self) -> Result<String> {
        Ok(format!(
            "Manufacturer: {}\nProduct: {}\nSerial number: {}\n",
            self.manufacturer()?,
            self.product()?,
            self.serial_number()?
        ))
    }

    // --- Lifecycle ---

    /// Closes the device handle. Idempotent and safe to call from any thread;
    /// waits for an in-flight operation to finish first. Every later
    /// operation returns [`Error::Released`].
    pub fn release(&self) {
        let mut state = self.lock();
        if state.released {
            return;
        }
        if let Some(device) = state.device.take() {
            self.backend.close(device);
            debug!("Session for {} closed", self.identity);
        }
        state.released = true;
        self.open.store(false, Ordering::Release);
    }
}

impl<B: HidBackend> Drop for DeviceSession<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: HidBackend> std::fmt::Debug for DeviceSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identity", &self.identity)
            .field("shape", &self.shape)
            .field("open", &self.is_open())
            .finish()
    }
}
