//! Internal constants: default timings, report sizes and buffer limits.

// --- Report Sizes ---
/// Largest input report length accepted for a session (64 data bytes + report ID).
pub const MAX_INPUT_REPORT_LEN: u8 = 65;
/// Default input report length, fits the common case of a device without report IDs.
pub const DEFAULT_INPUT_REPORT_LEN: u8 = 65;
/// Default output report length (data bytes, excluding the report ID prefix).
pub const DEFAULT_OUTPUT_REPORT_LEN: u8 = 65;
/// Report ID used by `write` when the device does not use report IDs.
pub const DEFAULT_REPORT_ID: u8 = 0x00;

// --- Session Timeouts ---
/// Timeout applied by `DeviceSession::read` when no explicit timeout is given.
pub const DEFAULT_READ_TIMEOUT_MS: i32 = 100;

// String descriptors are requested with a generous buffer; devices may return
// less than asked for.
pub const STRING_BUFFER_CHARS: usize = 256;

// --- Monitor Timings ---
/// Interval between two polls of the background scan loop.
pub const DEFAULT_SCAN_INTERVAL_MS: u32 = 500;
/// How long `stop_background_scan` waits for the loop thread before detaching it.
pub const STOP_GRACE_PERIOD_MS: u64 = 200;
/// Default overall timeout for `wait_for_device`.
pub const DEFAULT_WAIT_TIMEOUT_MS: u32 = 5000;
/// Default poll interval for `wait_for_device`.
pub const DEFAULT_WAIT_INTERVAL_MS: u32 = 500;
/// Granularity of the join poll while waiting out the stop grace period.
pub(crate) const JOIN_POLL_MS: u64 = 5;

/// Name given to the background scan thread.
pub(crate) const SCAN_THREAD_NAME: &str = "hid-device-scan";
