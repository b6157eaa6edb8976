//! Scriptable in-memory backend shared by the integration tests.

#![allow(dead_code)]

use hid_session::{HidBackend, Result, StringDescriptor};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What one enumeration call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Present,
    Absent,
    Fail,
}

pub struct MockEnumeration;

#[derive(Debug)]
pub struct MockDevice {
    pub serial: Option<String>,
}

pub struct MockBackend {
    script: Mutex<VecDeque<Scan>>,
    fallback: Mutex<Scan>,
    pub enumerate_calls: AtomicUsize,
    pub free_calls: AtomicUsize,

    pub openable: AtomicBool,
    pub open_calls: Mutex<Vec<(u16, u16, Option<String>)>>,
    pub close_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,

    pub io_delay: Mutex<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,

    pub read_calls: AtomicUsize,
    pub read_result: AtomicI32,
    pub read_fill: Mutex<Vec<u8>>,
    pub read_lengths: Mutex<Vec<usize>>,
    pub read_timeouts: Mutex<Vec<i32>>,

    pub write_calls: AtomicUsize,
    pub write_result: Mutex<Option<i32>>,
    pub written_frames: Mutex<Vec<Vec<u8>>>,

    pub nonblocking_status: AtomicI32,
    pub nonblocking_state: Mutex<Option<bool>>,
    pub flush_status: AtomicI32,
    pub strings_fail: AtomicBool,
    pub last_error: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Scan::Absent),
            enumerate_calls: AtomicUsize::new(0),
            free_calls: AtomicUsize::new(0),
            openable: AtomicBool::new(true),
            open_calls: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            io_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            read_result: AtomicI32::new(0),
            read_fill: Mutex::new(Vec::new()),
            read_lengths: Mutex::new(Vec::new()),
            read_timeouts: Mutex::new(Vec::new()),
            write_calls: AtomicUsize::new(0),
            write_result: Mutex::new(None),
            written_frames: Mutex::new(Vec::new()),
            nonblocking_status: AtomicI32::new(0),
            nonblocking_state: Mutex::new(None),
            flush_status: AtomicI32::new(0),
            strings_fail: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// Scans return `script` in order, then `fallback` forever.
    pub fn with_script(script: &[Scan], fallback: Scan) -> Self {
        let backend = Self::new();
        *backend.script.lock().unwrap() = script.iter().copied().collect();
        *backend.fallback.lock().unwrap() = fallback;
        backend
    }

    pub fn unopenable() -> Self {
        let backend = Self::new();
        backend.openable.store(false, Ordering::SeqCst);
        backend
    }

    pub fn set_fallback(&self, scan: Scan) {
        *self.fallback.lock().unwrap() = scan;
    }

    pub fn set_io_delay(&self, delay: Duration) {
        *self.io_delay.lock().unwrap() = delay;
    }

    pub fn set_last_error(&self, message: &str) {
        *self.last_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn scans(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    /// Blocks until at least `count` scans happened, or panics after `limit`.
    pub fn wait_for_scans(&self, count: usize, limit: Duration) {
        let started = Instant::now();
        while self.scans() < count {
            assert!(
                started.elapsed() < limit,
                "only {} of {} scans after {:?}",
                self.scans(),
                count,
                limit
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    // Tracks concurrency of I/O calls for non-reentrancy checks.
    fn enter_io(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.io_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    fn exit_io(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HidBackend for MockBackend {
    type Enumeration = MockEnumeration;
    type Device = MockDevice;

    fn enumerate(&self, _vid: u16, _pid: u16) -> Result<Option<MockEnumeration>> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.fallback.lock().unwrap());
        match next {
            Scan::Present => Ok(Some(MockEnumeration)),
            Scan::Absent => Ok(None),
            Scan::Fail => Err(hid_session::Error::Enumeration {
                message: "mock bus failure".to_string(),
            }),
        }
    }

    fn free_enumeration(&self, _enumeration: MockEnumeration) {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn open(&self, vid: u16, pid: u16, serial: Option<&str>) -> Option<MockDevice> {
        self.open_calls
            .lock()
            .unwrap()
            .push((vid, pid, serial.map(String::from)));
        if self.openable.load(Ordering::SeqCst) {
            Some(MockDevice {
                serial: serial.map(String::from),
            })
        } else {
            None
        }
    }

    fn read_timeout(&self, _device: &mut MockDevice, buf: &mut [u8], timeout_ms: i32) -> i32 {
        self.enter_io();
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.read_lengths.lock().unwrap().push(buf.len());
        self.read_timeouts.lock().unwrap().push(timeout_ms);
        let result = self.read_result.load(Ordering::SeqCst);
        if result > 0 {
            let fill = self.read_fill.lock().unwrap();
            let n = (result as usize).min(buf.len()).min(fill.len());
            buf[..n].copy_from_slice(&fill[..n]);
        }
        self.exit_io();
        result
    }

    fn write(&self, _device: &mut MockDevice, frame: &[u8]) -> i32 {
        self.enter_io();
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.written_frames.lock().unwrap().push(frame.to_vec());
        let result = self.write_result.lock().unwrap().unwrap_or(frame.len() as i32);
        self.exit_io();
        result
    }

    fn set_nonblocking(&self, _device: &mut MockDevice, nonblocking: bool) -> i32 {
        self.enter_io();
        let status = self.nonblocking_status.load(Ordering::SeqCst);
        if status == 0 {
            *self.nonblocking_state.lock().unwrap() = Some(nonblocking);
        }
        self.exit_io();
        status
    }

    fn flush_input(&self, _device: &mut MockDevice) -> i32 {
        self.enter_io();
        let status = self.flush_status.load(Ordering::SeqCst);
        self.exit_io();
        status
    }

    fn get_string(
        &self,
        device: &mut MockDevice,
        descriptor: StringDescriptor,
        max_chars: usize,
    ) -> Option<String> {
        self.enter_io();
        let value = if self.strings_fail.load(Ordering::SeqCst) {
            None
        } else {
            let text = match descriptor {
                StringDescriptor::Manufacturer => "Acme Corp".to_string(),
                StringDescriptor::Product => "Widget HID".to_string(),
                StringDescriptor::SerialNumber => {
                    device.serial.clone().unwrap_or_else(|| "SN0001".to_string())
                }
                StringDescriptor::Indexed(index) => format!("string #{}", index),
            };
            Some(text.chars().take(max_chars).collect())
        };
        self.exit_io();
        value
    }

    fn last_error(&self, _device: &MockDevice) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    fn close(&self, _device: MockDevice) {
        self.enter_io();
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.exit_io();
    }

    fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }
}
