/// Scan lifecycle: keeps the radio scanning continuously, and pauses it
/// around mailbox drains.
///
/// States: `Active` (callbacks may fire) and `Stopped` (no callbacks fire).
///
/// - `start()`: Stopped → Active, one scan round of `ScanParams::duration_ms`.
/// - `stop()`: Active → Stopped. Only the consumer loop calls this, right
///   before draining the mailbox.
/// - `on_scan_ended()`: called by the radio whenever a round ends. If the
///   controller still believes it is Active, the end was not ours and
///   scanning is restarted before returning. If it is Stopped, the end is the
///   consumer's pause and nothing happens.
///
/// Restarting on every natural end, instead of one unbounded scan, re-applies
/// the scan parameters and bounds how long a silently dead scan can go
/// unnoticed.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::defaults;

/// Radio scan configuration. Treated as fixed once scanning starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    /// Scan round length in ms; 0 scans until stopped
    pub duration_ms: u32,
    pub interval_ms: u16,
    pub window_ms: u16,
    /// Send scan requests (active) or only listen (passive)
    pub active: bool,
    /// Let the controller drop repeated advertisements
    pub duplicate_filter: bool,
    /// Clear the radio's duplicate cache when a round starts
    pub restart_filters: bool,
    /// Radio-side result limit, 0 = unlimited
    pub max_results: u8,
}

impl ScanParams {
    pub const fn new() -> Self {
        Self {
            duration_ms: defaults::SCAN_DURATION_MS,
            interval_ms: defaults::SCAN_INTERVAL_MS,
            window_ms: defaults::SCAN_WINDOW_MS,
            active: defaults::SCAN_ACTIVE,
            duplicate_filter: defaults::SCAN_DUPLICATE_FILTER,
            restart_filters: true,
            max_results: defaults::SCAN_MAX_RESULTS,
        }
    }
}

impl Default for ScanParams {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ScanParams {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} scan, round={}ms interval={}ms window={}ms dup_filter={} restart_filters={} max_results=",
            if self.active { "active" } else { "passive" },
            self.duration_ms,
            self.interval_ms,
            self.window_ms,
            if self.duplicate_filter { "on" } else { "off" },
            if self.restart_filters { "on" } else { "off" },
        )?;
        match self.max_results {
            0 => f.write_str("unlimited"),
            n => write!(f, "{}", n),
        }
    }
}

/// Whether the radio is listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Active,
    Stopped,
}

/// Why a scan round ended, as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEndReason {
    /// The round's duration elapsed
    Completed,
    /// Stopped on request
    Cancelled,
    /// The radio stack ended the round itself or could not start it
    Failed,
}

/// The radio operations the controller drives.
///
/// After `stop()` returns, no advertisement callback may run until the next
/// `start()`. Implementations must also report every round end (including
/// ones caused by `stop()`) through [`ScanController::on_scan_ended`].
pub trait ScanRadio {
    type Error: core::fmt::Debug;

    fn start(&mut self, params: &ScanParams) -> Result<(), Self::Error>;
    fn stop(&mut self) -> Result<(), Self::Error>;
}

struct Lifecycle<R> {
    radio: R,
    params: ScanParams,
    state: ScanState,
    /// Rounds restarted after ending on their own
    restarts: u32,
}

impl<R: ScanRadio> Lifecycle<R> {
    fn start(&mut self) -> ScanState {
        if self.state == ScanState::Active {
            return self.state;
        }
        match self.radio.start(&self.params) {
            Ok(()) => self.state = ScanState::Active,
            Err(e) => log::warn!("BLE scan failed to start: {:?}", e),
        }
        self.state
    }

    fn stop(&mut self) {
        if self.state == ScanState::Stopped {
            return;
        }
        // Stopped even if the radio complains; a failed stop is logged and
        // the next start re-applies the parameters.
        if let Err(e) = self.radio.stop() {
            log::warn!("BLE scan stop failed: {:?}", e);
        }
        self.state = ScanState::Stopped;
    }
}

/// Owns the scan state and the radio. Shareable between the radio callback
/// context and the consumer loop through `&self`.
pub struct ScanController<M: RawMutex, R: ScanRadio> {
    inner: Mutex<M, RefCell<Lifecycle<R>>>,
}

impl<M: RawMutex, R: ScanRadio> ScanController<M, R> {
    /// Create a controller in the `Stopped` state. `const` so it can back a `static`.
    pub const fn new(radio: R, params: ScanParams) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Lifecycle {
                radio,
                params,
                state: ScanState::Stopped,
                restarts: 0,
            })),
        }
    }

    /// Begin a scan round. No-op when already active.
    ///
    /// Returns the resulting state, `Stopped` if the radio refused.
    pub fn start(&self) -> ScanState {
        self.inner.lock(|l| l.borrow_mut().start())
    }

    /// Stop scanning. Once this returns no advertisement can be published
    /// until the next [`start`](Self::start).
    pub fn stop(&self) {
        self.inner.lock(|l| l.borrow_mut().stop())
    }

    /// Radio notification: a scan round ended.
    pub fn on_scan_ended(&self, reason: ScanEndReason) {
        self.inner.lock(|l| {
            let mut l = l.borrow_mut();
            if l.state == ScanState::Stopped {
                log::debug!("Scan paused ({:?})", reason);
                return;
            }

            log::info!("Scan ended ({:?}), restarting", reason);
            l.state = ScanState::Stopped;
            l.restarts = l.restarts.wrapping_add(1);
            l.start();
        })
    }

    /// Restart scanning if an earlier start failed and left it stopped.
    ///
    /// Only called from the consumer loop outside of a drain.
    pub fn ensure_scanning(&self) -> ScanState {
        self.inner.lock(|l| {
            let mut l = l.borrow_mut();
            if l.state == ScanState::Stopped {
                log::info!("Scan not running, starting");
                l.start();
            }
            l.state
        })
    }

    pub fn state(&self) -> ScanState {
        self.inner.lock(|l| l.borrow().state)
    }

    pub fn params(&self) -> ScanParams {
        self.inner.lock(|l| l.borrow().params)
    }

    /// Number of rounds restarted after ending on their own.
    pub fn restarts(&self) -> u32 {
        self.inner.lock(|l| l.borrow().restarts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum RadioCall {
        Start(u32),
        Stop,
    }

    /// Records calls; can be told to refuse the next start.
    pub(crate) struct FakeRadio {
        pub(crate) calls: Rc<StdRefCell<Vec<RadioCall>>>,
        pub(crate) fail_next_start: Rc<StdRefCell<bool>>,
    }

    impl FakeRadio {
        pub(crate) fn new() -> Self {
            Self {
                calls: Rc::new(StdRefCell::new(Vec::new())),
                fail_next_start: Rc::new(StdRefCell::new(false)),
            }
        }
    }

    impl ScanRadio for FakeRadio {
        type Error = &'static str;

        fn start(&mut self, params: &ScanParams) -> Result<(), Self::Error> {
            if self.fail_next_start.replace(false) {
                return Err("controller busy");
            }
            self.calls.borrow_mut().push(RadioCall::Start(params.duration_ms));
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push(RadioCall::Stop);
            Ok(())
        }
    }

    fn controller() -> (
        ScanController<NoopRawMutex, FakeRadio>,
        Rc<StdRefCell<Vec<RadioCall>>>,
        Rc<StdRefCell<bool>>,
    ) {
        let radio = FakeRadio::new();
        let calls = radio.calls.clone();
        let fail = radio.fail_next_start.clone();
        (ScanController::new(radio, ScanParams::new()), calls, fail)
    }

    #[test]
    fn starts_stopped() {
        let (ctl, calls, _) = controller();
        assert_eq!(ctl.state(), ScanState::Stopped);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn start_uses_configured_duration() {
        let (ctl, calls, _) = controller();
        assert_eq!(ctl.start(), ScanState::Active);
        assert_eq!(*calls.borrow(), [RadioCall::Start(defaults::SCAN_DURATION_MS)]);
    }

    #[test]
    fn start_when_active_is_noop() {
        let (ctl, calls, _) = controller();
        ctl.start();
        ctl.start();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn stop_then_start() {
        let (ctl, calls, _) = controller();
        ctl.start();
        ctl.stop();
        assert_eq!(ctl.state(), ScanState::Stopped);
        ctl.start();
        assert_eq!(ctl.state(), ScanState::Active);
        assert_eq!(
            *calls.borrow(),
            [
                RadioCall::Start(defaults::SCAN_DURATION_MS),
                RadioCall::Stop,
                RadioCall::Start(defaults::SCAN_DURATION_MS)
            ]
        );
    }

    #[test]
    fn natural_end_restarts_exactly_once() {
        for reason in [
            ScanEndReason::Completed,
            ScanEndReason::Cancelled,
            ScanEndReason::Failed,
        ] {
            let (ctl, calls, _) = controller();
            ctl.start();
            calls.borrow_mut().clear();

            ctl.on_scan_ended(reason);

            assert_eq!(ctl.state(), ScanState::Active);
            assert_eq!(*calls.borrow(), [RadioCall::Start(defaults::SCAN_DURATION_MS)]);
            assert_eq!(ctl.restarts(), 1);
        }
    }

    #[test]
    fn end_after_consumer_stop_does_not_restart() {
        let (ctl, calls, _) = controller();
        ctl.start();
        ctl.stop();
        calls.borrow_mut().clear();

        ctl.on_scan_ended(ScanEndReason::Cancelled);

        assert_eq!(ctl.state(), ScanState::Stopped);
        assert!(calls.borrow().is_empty());
        assert_eq!(ctl.restarts(), 0);
    }

    #[test]
    fn failed_restart_leaves_stopped_until_ensured() {
        let (ctl, calls, fail) = controller();
        ctl.start();
        *fail.borrow_mut() = true;

        ctl.on_scan_ended(ScanEndReason::Completed);
        assert_eq!(ctl.state(), ScanState::Stopped);

        assert_eq!(ctl.ensure_scanning(), ScanState::Active);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn ensure_scanning_when_active_is_noop() {
        let (ctl, calls, _) = controller();
        ctl.start();
        assert_eq!(ctl.ensure_scanning(), ScanState::Active);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn default_params() {
        let params = ScanParams::default();
        assert_eq!(params.duration_ms, 5_000);
        assert_eq!(params.interval_ms, 52);
        assert_eq!(params.window_ms, 30);
        assert!(!params.active);
        assert!(!params.duplicate_filter);
        assert!(params.window_ms <= params.interval_ms);
    }

    #[test]
    fn params_render_every_setting() {
        let rendered = std::format!("{}", ScanParams::new());
        assert_eq!(
            rendered,
            "passive scan, round=5000ms interval=52ms window=30ms \
             dup_filter=off restart_filters=on max_results=unlimited"
        );

        let limited = ScanParams {
            active: true,
            duplicate_filter: true,
            max_results: 8,
            ..ScanParams::new()
        };
        let rendered = std::format!("{}", limited);
        assert!(rendered.starts_with("active scan"));
        assert!(rendered.contains("dup_filter=on"));
        assert!(rendered.ends_with("max_results=8"));
    }
}
