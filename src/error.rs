use crate::backend::StringDescriptor;
use thiserror::Error;

/// Errors that can occur when monitoring or talking to a HID device.
///
/// Transport failures carry the backend's numeric status and its last-error
/// text. Opening a session never fails with an error; a session that could not
/// be opened reports [`Error::NotOpen`] on first use instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the underlying HID API layer (context creation).
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// General I/O error (e.g. failure to spawn the scan thread).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The bus enumeration used for presence probing failed.
    #[error("Device enumeration failed: {message}")]
    Enumeration {
        /// Description reported by the backend.
        message: String,
    },
    /// The session never obtained a device handle.
    #[error("Device is not open (open failed at session construction)")]
    NotOpen,
    /// The session was released; its handle is gone.
    #[error("Session has been released; the device handle is closed")]
    Released,
    /// Writing an output report failed.
    #[error("Failed to write output report (code {code}): {message}")]
    Write {
        /// Negative status returned by the backend.
        code: i32,
        /// Last-error text of the handle, queried under the session lock.
        message: String,
    },
    /// Reading an input report failed.
    #[error("Failed to read input report (code {code}): {message}")]
    Read {
        /// Negative status returned by the backend.
        code: i32,
        /// Last-error text of the handle, queried under the session lock.
        message: String,
    },
    /// Provided buffer is smaller than required for the operation.
    #[error("Provided buffer is too small (expected at least {expected}, got {actual})")]
    BufferTooSmall {
        /// Minimum required buffer size.
        expected: usize,
        /// Actual buffer size provided.
        actual: usize,
    },
    /// Requested operation exceeds the configured report size.
    #[error("Requested operation size is too large (max {max}, got {actual})")]
    OperationTooLarge {
        /// Maximum allowed size for this operation.
        max: usize,
        /// Actual size requested.
        actual: usize,
    },
    /// A control call (blocking mode, flush) returned a failure status.
    #[error("{operation} failed (code {code}): {message}")]
    Control {
        /// Name of the failed control operation.
        operation: &'static str,
        /// Status returned by the backend.
        code: i32,
        /// Last-error text of the handle.
        message: String,
    },
    /// Reading a string descriptor failed.
    #[error("Failed to get {descriptor} string: {message}")]
    StringQuery {
        /// The descriptor that was requested.
        descriptor: StringDescriptor,
        /// Last-error text of the handle.
        message: String,
    },
}

/// Result type alias for HID session and monitor operations.
pub type Result<T> = std::result::Result<T, Error>;

// Fallback text when the backend has no error message for a handle.
pub(crate) const UNKNOWN_ERROR: &str = "unknown error";

pub(crate) fn describe(last_error: Option<String>) -> String {
    last_error.unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
