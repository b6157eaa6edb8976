//! Presence monitoring: detects when a device with a given identity appears on
//! or disappears from the bus, without opening it.
//!
//! Presence is probed by enumeration rather than by opening the device, and
//! each enumeration is freed as soon as the answer is known so the probe never
//! holds the device away from other processes. Note that a device currently
//! opened exclusively by another process may not enumerate and is then
//! reported as absent.

use crate::backend::HidBackend;
use crate::consts;
use crate::error::{Error, Result};
use crate::DeviceIdentity;
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A presence transition observed by a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Arrived(DeviceIdentity),
    Removed(DeviceIdentity),
}

impl MonitorEvent {
    pub fn identity(&self) -> DeviceIdentity {
        match self {
            MonitorEvent::Arrived(id) | MonitorEvent::Removed(id) => *id,
        }
    }
}

/// Observed presence of a device, as seen by a monitor's polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    #[default]
    Absent,
    Present,
}

/// Edge detector for presence observations.
///
/// Feeding it the result of each scan yields an event only when the observed
/// presence changes; repeated identical observations yield nothing.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    state: Presence,
}

/// Direction of a presence edge reported by [`PresenceTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Arrived,
    Removed,
}

impl PresenceTracker {
    /// A tracker starting in [`Presence::Absent`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Presence {
        self.state
    }

    /// Records one scan result and returns the edge it produced, if any.
    pub fn observe(&mut self, present: bool) -> Option<Transition> {
        match (self.state, present) {
            (Presence::Absent, true) => {
                self.state = Presence::Present;
                Some(Transition::Arrived)
            }
            (Presence::Present, false) => {
                self.state = Presence::Absent;
                Some(Transition::Removed)
            }
            _ => None,
        }
    }
}

/// Timing parameters for a [`DeviceMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Pause between two polls of the background loop.
    pub scan_interval: Duration,
    /// How long `stop_background_scan` waits for the loop before detaching it.
    pub stop_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(consts::DEFAULT_SCAN_INTERVAL_MS as u64),
            stop_grace: Duration::from_millis(consts::STOP_GRACE_PERIOD_MS),
        }
    }
}

/// Timeout actually used by `wait_for_device`: a timeout shorter than one
/// poll interval is stretched to three intervals.
pub(crate) fn effective_wait_timeout(timeout_ms: u32, poll_interval_ms: u32) -> Duration {
    let timeout_ms = if timeout_ms < poll_interval_ms {
        3 * poll_interval_ms as u64
    } else {
        timeout_ms as u64
    };
    Duration::from_millis(timeout_ms)
}

// Cooperative cancellation for one run of the background loop. Waiting on it
// doubles as the inter-poll sleep, so cancelling wakes the loop immediately.
struct CancelToken {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        *self.lock() = true;
        self.wakeup.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Sleeps for `timeout` or until cancelled. Returns true if cancelled.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wakeup
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

type Handler = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

// Run id of the background loop that owns `scanning`; 0 when idle.
const IDLE: u64 = 0;

struct Shared<B: HidBackend> {
    backend: Arc<B>,
    identity: DeviceIdentity,
    connected: AtomicBool,
    scanning: AtomicU64,
    next_run: AtomicU64,
    interval_ms: AtomicU32,
    // One edge detector per monitor, fed by every poll whichever loop runs it.
    tracker: Mutex<PresenceTracker>,
    handlers: Mutex<Vec<Handler>>,
}

impl<B: HidBackend> Shared<B> {
    fn new(backend: Arc<B>, identity: DeviceIdentity, interval_ms: u32) -> Self {
        Self {
            backend,
            identity,
            connected: AtomicBool::new(false),
            scanning: AtomicU64::new(IDLE),
            next_run: AtomicU64::new(IDLE),
            interval_ms: AtomicU32::new(interval_ms),
            tracker: Mutex::new(PresenceTracker::new()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    fn scan_once(&self, identity: DeviceIdentity) -> Result<bool> {
        let enumeration = self
            .backend
            .enumerate(identity.vendor_id, identity.product_id)?;
        let present = enumeration.is_some();
        if let Some(enumeration) = enumeration {
            self.backend.free_enumeration(enumeration);
        }
        self.connected.store(present, Ordering::SeqCst);
        trace!("Scan {}: present={}", identity, present);
        Ok(present)
    }

    fn poll(&self) -> Result<bool> {
        // Scan and observe under the tracker lock so concurrent polls cannot
        // feed it out of order. Handlers run after it is released.
        let (present, transition) = {
            let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            let present = self.scan_once(self.identity)?;
            (present, tracker.observe(present))
        };
        match transition {
            Some(Transition::Arrived) => {
                info!("Device {} arrived", self.identity);
                self.dispatch(MonitorEvent::Arrived(self.identity));
            }
            Some(Transition::Removed) => {
                info!("Device {} removed", self.identity);
                self.dispatch(MonitorEvent::Removed(self.identity));
            }
            None => {}
        }
        Ok(present)
    }

    fn dispatch(&self, event: MonitorEvent) {
        // Snapshot so handlers may register further handlers without deadlocking.
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(&event);
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed) as u64)
    }
}

fn run_scan_loop<B: HidBackend>(shared: Arc<Shared<B>>, cancel: Arc<CancelToken>, run: u64) {
    debug!("Background scan #{} for {} started", run, shared.identity);
    while !cancel.is_cancelled() {
        if let Err(e) = shared.poll() {
            // Stop; the caller restarts with start_background_scan().
            error!(
                "Background scan for {} stopped on transport error: {}",
                shared.identity, e
            );
            // Only clear the flag if no stop/restart has replaced this run.
            let _ = shared
                .scanning
                .compare_exchange(run, IDLE, Ordering::SeqCst, Ordering::SeqCst);
            break;
        }
        if cancel.wait(shared.interval()) {
            break;
        }
    }
    debug!("Background scan #{} for {} exited", run, shared.identity);
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: Arc<CancelToken>,
}

/// Watches the bus for a device identity.
///
/// Presence can be probed once ([`scan_once`](Self::scan_once)), waited for
/// synchronously ([`wait_for_device`](Self::wait_for_device)) or tracked by a
/// background thread ([`start_background_scan`](Self::start_background_scan)).
/// Arrival and removal are edge-triggered per monitor: a device that stays
/// present is announced once, however many waits or background runs observe
/// it. Events are delivered on whichever thread runs the poll; handlers that need another execution context must hand the
/// event off themselves.
pub struct DeviceMonitor<B: HidBackend> {
    shared: Arc<Shared<B>>,
    worker: Mutex<Option<Worker>>,
    stop_grace: Duration,
}

impl<B: HidBackend> DeviceMonitor<B> {
    pub fn new(backend: Arc<B>, identity: DeviceIdentity) -> Self {
        Self::with_config(backend, identity, MonitorConfig::default())
    }

    pub fn with_config(backend: Arc<B>, identity: DeviceIdentity, config: MonitorConfig) -> Self {
        let interval_ms = u32::try_from(config.scan_interval.as_millis()).unwrap_or(u32::MAX);
        Self {
            shared: Arc::new(Shared::new(backend, identity, interval_ms)),
            worker: Mutex::new(None),
            stop_grace: config.stop_grace,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.shared.identity
    }

    /// Last observed presence.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// True while the background loop is meant to be running.
    pub fn is_scanning(&self) -> bool {
        self.shared.scanning.load(Ordering::SeqCst) != IDLE
    }

    pub fn scan_interval(&self) -> Duration {
        self.shared.interval()
    }

    /// Changes the background poll interval; takes effect after the current sleep.
    pub fn set_scan_interval(&self, interval: Duration) {
        let ms = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
        self.shared.interval_ms.store(ms, Ordering::Relaxed);
    }

    // --- Events ---

    /// Registers a handler for every presence event.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    pub fn on_arrival<F>(&self, handler: F)
    where
        F: Fn(DeviceIdentity) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let MonitorEvent::Arrived(id) = event {
                handler(*id);
            }
        });
    }

    pub fn on_removed<F>(&self, handler: F)
    where
        F: Fn(DeviceIdentity) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let MonitorEvent::Removed(id) = event {
                handler(*id);
            }
        });
    }

    /// Returns a channel receiving every presence event from now on.
    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::channel();
        let tx: Mutex<Sender<MonitorEvent>> = Mutex::new(tx);
        self.on_event(move |event| {
            // A dropped receiver just stops listening.
            let _ = tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(*event);
        });
        rx
    }

    // --- Scanning ---

    /// Probes once for the monitored identity and updates `is_connected`.
    /// Fires no events.
    pub fn scan_once(&self) -> Result<bool> {
        self.shared.scan_once(self.shared.identity)
    }

    /// Probes once for an arbitrary identity. The result is also stored as the
    /// monitor's last observed presence.
    pub fn scan_once_for(&self, identity: DeviceIdentity) -> Result<bool> {
        self.shared.scan_once(identity)
    }

    /// Runs one iteration of the poll loop body: scans, feeds the monitor's
    /// presence tracker and fires the resulting event, if any.
    pub fn poll(&self) -> Result<bool> {
        self.shared.poll()
    }

    /// Presence as last seen by the monitor's edge detector.
    pub fn presence(&self) -> Presence {
        self.shared
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// Starts the background poll loop. Does nothing if it is already running.
    pub fn start_background_scan(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let run = self.shared.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .shared
            .scanning
            .compare_exchange(IDLE, run, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            trace!("Background scan for {} already running", self.shared.identity);
            return Ok(());
        }

        // A previous loop may have stopped itself on an error.
        if let Some(previous) = worker.take() {
            previous.cancel.cancel();
            if previous.handle.is_finished() && previous.handle.join().is_err() {
                warn!("Previous scan thread for {} panicked", self.shared.identity);
            }
        }

        let cancel = Arc::new(CancelToken::new());
        let shared = Arc::clone(&self.shared);
        let loop_cancel = Arc::clone(&cancel);
        let spawned = thread::Builder::new()
            .name(consts::SCAN_THREAD_NAME.into())
            .spawn(move || run_scan_loop(shared, loop_cancel, run));
        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { handle, cancel });
                Ok(())
            }
            Err(e) => {
                self.shared.scanning.store(IDLE, Ordering::SeqCst);
                Err(Error::Io(e))
            }
        }
    }

    /// Stops the background loop and waits up to the grace period for it to
    /// exit. A loop still busy after that is left to finish on its own; it
    /// exits at its next poll boundary.
    pub fn stop_background_scan(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.scanning.store(IDLE, Ordering::SeqCst);
        let Some(worker) = worker.take() else {
            return;
        };
        worker.cancel.cancel();

        let deadline = Instant::now() + self.stop_grace;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(consts::JOIN_POLL_MS));
        }
        if worker.handle.is_finished() {
            if worker.handle.join().is_err() {
                warn!("Scan thread for {} panicked", self.shared.identity);
            }
        } else {
            warn!(
                "Scan thread for {} still busy after {:?}; detaching",
                self.shared.identity, self.stop_grace
            );
        }
    }

    /// Blocks until the device is present or the timeout elapses, polling every
    /// `poll_interval_ms`. Returns the last observed presence.
    ///
    /// Transport errors are logged and polling continues until the timeout.
    pub fn wait_for_device(&self, timeout_ms: u32, poll_interval_ms: u32) -> bool {
        let timeout = effective_wait_timeout(timeout_ms, poll_interval_ms);
        let interval = Duration::from_millis(poll_interval_ms as u64);
        let started = Instant::now();

        loop {
            if started.elapsed() > timeout {
                debug!("Waiting for {} timed out after {:?}", self.shared.identity, timeout);
                break;
            }
            match self.shared.poll() {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!(
                    "Scan for {} failed while waiting, continuing: {}",
                    self.shared.identity, e
                ),
            }
            thread::sleep(interval);
        }
        self.is_connected()
    }

    /// [`wait_for_device`](Self::wait_for_device) with the default 5 s timeout
    /// and 500 ms interval.
    pub fn wait_for_device_default(&self) -> bool {
        self.wait_for_device(consts::DEFAULT_WAIT_TIMEOUT_MS, consts::DEFAULT_WAIT_INTERVAL_MS)
    }
}

impl<B: HidBackend> Drop for DeviceMonitor<B> {
    fn drop(&mut self) {
        self.stop_background_scan();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StringDescriptor;

    // A bus whose enumeration always fails.
    struct BrokenBus;

    impl HidBackend for BrokenBus {
        type Enumeration = ();
        type Device = ();

        fn enumerate(&self, _vid: u16, _pid: u16) -> Result<Option<()>> {
            Err(Error::Enumeration {
                message: "bus unavailable".into(),
            })
        }
        fn free_enumeration(&self, _enumeration: ()) {}
        fn open(&self, _vid: u16, _pid: u16, _serial: Option<&str>) -> Option<()> {
            None
        }
        fn read_timeout(&self, _device: &mut (), _buf: &mut [u8], _timeout_ms: i32) -> i32 {
            -1
        }
        fn write(&self, _device: &mut (), _frame: &[u8]) -> i32 {
            -1
        }
        fn set_nonblocking(&self, _device: &mut (), _nonblocking: bool) -> i32 {
            -1
        }
        fn flush_input(&self, _device: &mut ()) -> i32 {
            -1
        }
        fn get_string(&self, _: &mut (), _: StringDescriptor, _: usize) -> Option<String> {
            None
        }
        fn last_error(&self, _device: &()) -> Option<String> {
            None
        }
        fn close(&self, _device: ()) {}
        fn shutdown(&self) {}
    }

    #[test]
    fn failed_loop_only_clears_scanning_it_owns() {
        let shared = Arc::new(Shared::new(
            Arc::new(BrokenBus),
            DeviceIdentity::new(0x1234, 0x5678),
            1,
        ));

        // Run 1 was stopped and run 2 started before run 1 saw its error.
        shared.scanning.store(2, Ordering::SeqCst);
        run_scan_loop(Arc::clone(&shared), Arc::new(CancelToken::new()), 1);
        assert_eq!(shared.scanning.load(Ordering::SeqCst), 2);

        // The owning run clears it.
        run_scan_loop(Arc::clone(&shared), Arc::new(CancelToken::new()), 2);
        assert_eq!(shared.scanning.load(Ordering::SeqCst), IDLE);
    }

    #[test]
    fn tracker_fires_only_on_edges() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(tracker.observe(false), None);
        assert_eq!(tracker.observe(true), Some(Transition::Arrived));
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.observe(false), Some(Transition::Removed));
        assert_eq!(tracker.observe(false), None);
        assert_eq!(tracker.observe(true), Some(Transition::Arrived));
        assert_eq!(tracker.state(), Presence::Present);
    }

    #[test]
    fn short_timeout_is_stretched_to_three_intervals() {
        assert_eq!(effective_wait_timeout(100, 500), Duration::from_millis(1500));
        assert_eq!(effective_wait_timeout(500, 500), Duration::from_millis(500));
        assert_eq!(effective_wait_timeout(5000, 500), Duration::from_millis(5000));
        assert_eq!(
            effective_wait_timeout(0, u32::MAX),
            Duration::from_millis(3 * u32::MAX as u64)
        );
    }

    #[test]
    fn cancel_token_wakes_waiter() {
        let token = Arc::new(CancelToken::new());
        let waiter = Arc::clone(&token);
        let started = Instant::now();
        let handle = thread::spawn(move || waiter.wait(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }
}
