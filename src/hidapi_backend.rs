//! [`HidBackend`] implementation over the `hidapi` crate.

use crate::backend::{HidBackend, StringDescriptor};
use crate::consts;
use crate::error::{Error, Result};
use hidapi::{HidApi, HidDevice, HidError, HidResult};
use log::{debug, trace, warn};
use std::ffi::CString;
use std::sync::{Mutex, MutexGuard, PoisonError};

// Upper bound on reports discarded by one flush, so a device that streams
// continuously cannot keep the flush spinning.
const MAX_FLUSH_REPORTS: usize = 1024;

/// Device paths matched by one enumeration.
#[derive(Debug, Clone)]
pub struct HidEnumeration {
    pub paths: Vec<CString>,
}

/// A device opened through [`HidApiBackend`].
pub struct HidApiDevice {
    device: HidDevice,
    nonblocking: bool,
    last_error: Option<String>,
}

impl HidApiDevice {
    fn record<T>(&mut self, result: HidResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                trace!("hidapi call failed: {}", e);
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    fn count(&mut self, result: HidResult<usize>) -> i32 {
        match self.record(result) {
            Some(n) => i32::try_from(n).unwrap_or(i32::MAX),
            None => -1,
        }
    }

    fn status(&mut self, result: HidResult<()>) -> i32 {
        match self.record(result) {
            Some(()) => 0,
            None => -1,
        }
    }
}

/// The production backend: a shared `hidapi` context.
///
/// `shutdown` drops the context; afterwards enumeration fails and opening
/// returns `None`.
pub struct HidApiBackend {
    api: Mutex<Option<HidApi>>,
}

impl HidApiBackend {
    /// Creates the hidapi context.
    pub fn new() -> Result<Self> {
        let api = HidApi::new()?;
        debug!("hidapi context initialised");
        Ok(Self {
            api: Mutex::new(Some(api)),
        })
    }

    /// Wraps an existing hidapi context.
    pub fn from_api(api: HidApi) -> Self {
        Self {
            api: Mutex::new(Some(api)),
        }
    }

    fn api(&self) -> MutexGuard<'_, Option<HidApi>> {
        self.api.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HidBackend for HidApiBackend {
    type Enumeration = HidEnumeration;
    type Device = HidApiDevice;

    fn enumerate(&self, vid: u16, pid: u16) -> Result<Option<HidEnumeration>> {
        let mut guard = self.api();
        let api = guard.as_mut().ok_or_else(|| Error::Enumeration {
            message: "hidapi context has been shut down".to_string(),
        })?;
        api.refresh_devices().map_err(|e: HidError| Error::Enumeration {
            message: e.to_string(),
        })?;

        let paths: Vec<CString> = api
            .device_list()
            .filter(|info| info.vendor_id() == vid && info.product_id() == pid)
            .map(|info| info.path().to_owned())
            .collect();
        trace!(
            "Enumerated VID={:04X}, PID={:04X}: {} match(es)",
            vid,
            pid,
            paths.len()
        );
        if paths.is_empty() {
            Ok(None)
        } else {
            Ok(Some(HidEnumeration { paths }))
        }
    }

    fn free_enumeration(&self, enumeration: HidEnumeration) {
        drop(enumeration);
    }

    fn open(&self, vid: u16, pid: u16, serial: Option<&str>) -> Option<HidApiDevice> {
        let guard = self.api();
        let api = guard.as_ref()?;
        let result = match serial {
            Some(sn) => api.open_serial(vid, pid, sn),
            None => api.open(vid, pid),
        };
        match result {
            Ok(device) => {
                debug!(
                    "Opened HID device: VID={:04X}, PID={:04X}, SN={:?}",
                    vid, pid, serial
                );
                Some(HidApiDevice {
                    device,
                    nonblocking: false,
                    last_error: None,
                })
            }
            Err(e) => {
                debug!(
                    "Failed to open HID device VID={:04X}, PID={:04X}, SN={:?}: {}",
                    vid, pid, serial, e
                );
                None
            }
        }
    }

    fn read_timeout(&self, device: &mut HidApiDevice, buf: &mut [u8], timeout_ms: i32) -> i32 {
        let result = device.device.read_timeout(buf, timeout_ms);
        device.count(result)
    }

    fn write(&self, device: &mut HidApiDevice, frame: &[u8]) -> i32 {
        let result = device.device.write(frame);
        device.count(result)
    }

    fn set_nonblocking(&self, device: &mut HidApiDevice, nonblocking: bool) -> i32 {
        let result = device.device.set_blocking_mode(!nonblocking);
        let status = device.status(result);
        if status == 0 {
            device.nonblocking = nonblocking;
        }
        status
    }

    fn flush_input(&self, device: &mut HidApiDevice) -> i32 {
        // hidapi-rs has no flush call; drain pending reports in non-blocking mode.
        let result = device.device.set_blocking_mode(false);
        if device.status(result) < 0 {
            return -1;
        }

        let mut scratch = [0u8; consts::MAX_INPUT_REPORT_LEN as usize];
        let mut status = 0;
        for _ in 0..MAX_FLUSH_REPORTS {
            let result = device.device.read(&mut scratch);
            match device.count(result) {
                0 => break,
                n if n < 0 => {
                    status = n;
                    break;
                }
                n => trace!("Flushed {} byte input report", n),
            }
        }

        let restore = !device.nonblocking;
        let result = device.device.set_blocking_mode(restore);
        if device.status(result) < 0 {
            warn!("Failed to restore blocking mode after flush");
            return -1;
        }
        status
    }

    fn get_string(
        &self,
        device: &mut HidApiDevice,
        descriptor: StringDescriptor,
        max_chars: usize,
    ) -> Option<String> {
        let result = match descriptor {
            StringDescriptor::Manufacturer => device.device.get_manufacturer_string(),
            StringDescriptor::Product => device.device.get_product_string(),
            StringDescriptor::SerialNumber => device.device.get_serial_number_string(),
            StringDescriptor::Indexed(index) => device.device.get_indexed_string(index),
        };
        let value = device.record(result)?;
        Some(value.unwrap_or_default().chars().take(max_chars).collect())
    }

    fn last_error(&self, device: &HidApiDevice) -> Option<String> {
        device.last_error.clone()
    }

    fn close(&self, device: HidApiDevice) {
        // HidDevice closes its native handle on drop.
        drop(device);
    }

    fn shutdown(&self) {
        if self.api().take().is_some() {
            debug!("hidapi context shut down");
        }
    }
}
