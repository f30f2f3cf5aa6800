/// Consumer loop step: drain the mailbox under a scan pause.
///
/// The stop/start bracket around the drain is what keeps the producer off
/// the mailbox while it is read: after `stop()` returns no scan callback can
/// run, so no publish can land between the readiness check and the take.
/// Every drain must go through [`poll_once`] to keep that guarantee.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::comm::ReadingSink;
use crate::lifecycle::{ScanController, ScanRadio};
use crate::mailbox::Mailbox;

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was pending
    Idle,
    /// A reading was handed to the sink
    Delivered,
}

/// Run one consumer tick.
///
/// If a reading is pending: stop scanning, take it, report it, resume
/// scanning. Otherwise make sure scanning is running and return.
pub fn poll_once<MC, MM, R, S>(
    controller: &ScanController<MC, R>,
    mailbox: &Mailbox<MM>,
    sink: &mut S,
) -> PollOutcome
where
    MC: RawMutex,
    MM: RawMutex,
    R: ScanRadio,
    S: ReadingSink + ?Sized,
{
    if !mailbox.is_ready() {
        controller.ensure_scanning();
        return PollOutcome::Idle;
    }

    controller.stop();

    let outcome = match mailbox.try_take_if_ready() {
        Some(reading) => {
            sink.report(&reading);
            PollOutcome::Delivered
        }
        None => {
            // Only this loop takes, so a ready mailbox cannot empty itself
            log::warn!("Mailbox empty after readiness check");
            PollOutcome::Idle
        }
    };

    controller.start();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bthome::BthomeDecoder;
    use crate::decoder::process_advertisement;
    use crate::lifecycle::tests::{FakeRadio, RadioCall};
    use crate::lifecycle::{ScanParams, ScanState};
    use crate::protocol::Reading;
    use crate::scanner::AdvertisementEvent;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::thread;
    use std::vec::Vec;

    const DURATION: u32 = crate::defaults::SCAN_DURATION_MS;

    /// Collects delivered readings.
    #[derive(Default)]
    struct RecordingSink {
        readings: Vec<Reading>,
    }

    impl ReadingSink for RecordingSink {
        fn report(&mut self, reading: &Reading) {
            self.readings.push(reading.clone());
        }
    }

    /// BTHome advertisement carrying a 16-bit count object.
    fn count_ad(count: u16) -> [u8; 8] {
        let [lo, hi] = count.to_le_bytes();
        [0x07, 0x16, 0xD2, 0xFC, 0x40, 0x3D, lo, hi]
    }

    fn count_of(reading: &Reading) -> u16 {
        reading.measurement(0x3D).unwrap().value as u16
    }

    fn publish<M: RawMutex>(mailbox: &Mailbox<M>, mac: [u8; 6], count: u16) {
        let ad = count_ad(count);
        let event = AdvertisementEvent::parse(mac, -60, &ad);
        assert_eq!(process_advertisement(&event, &BthomeDecoder::new(), None, mailbox), 1);
    }

    #[test]
    fn idle_poll_touches_nothing() {
        let radio = FakeRadio::new();
        let calls = radio.calls.clone();
        let controller: ScanController<NoopRawMutex, _> = ScanController::new(radio, ScanParams::new());
        let mailbox: Mailbox<NoopRawMutex> = Mailbox::new();
        let mut sink = RecordingSink::default();

        controller.start();
        assert_eq!(poll_once(&controller, &mailbox, &mut sink), PollOutcome::Idle);
        assert_eq!(*calls.borrow(), [RadioCall::Start(DURATION)]);
        assert!(sink.readings.is_empty());
    }

    #[test]
    fn delivery_is_bracketed_by_stop_and_start() {
        let radio = FakeRadio::new();
        let calls = radio.calls.clone();
        let controller: ScanController<NoopRawMutex, _> = ScanController::new(radio, ScanParams::new());
        let mailbox: Mailbox<NoopRawMutex> = Mailbox::new();
        let mut sink = RecordingSink::default();

        controller.start();
        publish(&mailbox, [0xAA; 6], 7);

        assert_eq!(poll_once(&controller, &mailbox, &mut sink), PollOutcome::Delivered);
        assert_eq!(
            *calls.borrow(),
            [
                RadioCall::Start(DURATION),
                RadioCall::Stop,
                RadioCall::Start(DURATION)
            ]
        );
        assert_eq!(controller.state(), ScanState::Active);
        assert_eq!(sink.readings.len(), 1);
        assert_eq!(count_of(&sink.readings[0]), 7);
        assert!(!mailbox.is_ready());
    }

    #[test]
    fn two_devices_before_poll_deliver_only_latest() {
        let controller: ScanController<NoopRawMutex, _> =
            ScanController::new(FakeRadio::new(), ScanParams::new());
        let mailbox: Mailbox<NoopRawMutex> = Mailbox::new();
        let mut sink = RecordingSink::default();
        controller.start();

        publish(&mailbox, [0xAA; 6], 1);
        publish(&mailbox, [0xBB; 6], 2);

        assert_eq!(poll_once(&controller, &mailbox, &mut sink), PollOutcome::Delivered);
        assert_eq!(poll_once(&controller, &mailbox, &mut sink), PollOutcome::Idle);
        assert_eq!(sink.readings.len(), 1);
        assert_eq!(sink.readings[0].device_id.as_str(), "BB:BB:BB:BB:BB:BB");
        assert_eq!(count_of(&sink.readings[0]), 2);
    }

    #[test]
    fn idle_poll_recovers_failed_start() {
        let radio = FakeRadio::new();
        let fail = radio.fail_next_start.clone();
        let controller: ScanController<NoopRawMutex, _> = ScanController::new(radio, ScanParams::new());
        let mailbox: Mailbox<NoopRawMutex> = Mailbox::new();
        let mut sink = RecordingSink::default();

        *fail.borrow_mut() = true;
        assert_eq!(controller.start(), ScanState::Stopped);

        poll_once(&controller, &mailbox, &mut sink);
        assert_eq!(controller.state(), ScanState::Active);
    }

    // ── Stop/resume safety with a concurrent producer ────────────────

    /// Raw mutex backed by `std::sync::Mutex`, so mailbox and controller can
    /// be shared with a producer thread. Each instance locks independently.
    struct StdRawMutex(StdMutex<()>);

    unsafe impl RawMutex for StdRawMutex {
        #[allow(clippy::declare_interior_mutable_const)]
        const INIT: Self = StdRawMutex(StdMutex::new(()));

        fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
            let _guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
            f()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Started,
        Stopped,
        Published(u16),
        Taken(u16),
    }

    type EventLog = Arc<StdMutex<Vec<Event>>>;

    /// Radio whose callback source is a gate. `stop()` waits for an in-flight
    /// callback to finish, then closes the gate, like a real stack does.
    /// Start/stop are logged while holding the gate so the log order matches
    /// the order the producer observes.
    struct GateRadio {
        gate: Arc<StdMutex<bool>>,
        log: EventLog,
    }

    impl ScanRadio for GateRadio {
        type Error = core::convert::Infallible;

        fn start(&mut self, _params: &ScanParams) -> Result<(), Self::Error> {
            let mut open = self.gate.lock().unwrap();
            *open = true;
            self.log.lock().unwrap().push(Event::Started);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Self::Error> {
            let mut open = self.gate.lock().unwrap();
            *open = false;
            self.log.lock().unwrap().push(Event::Stopped);
            Ok(())
        }
    }

    struct LoggingSink {
        log: EventLog,
    }

    impl ReadingSink for LoggingSink {
        fn report(&mut self, reading: &Reading) {
            self.log.lock().unwrap().push(Event::Taken(count_of(reading)));
        }
    }

    #[test]
    fn no_publish_between_stop_and_start() {
        let log: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let gate = Arc::new(StdMutex::new(false));
        let controller: Arc<ScanController<StdRawMutex, GateRadio>> = Arc::new(ScanController::new(
            GateRadio {
                gate: gate.clone(),
                log: log.clone(),
            },
            ScanParams::new(),
        ));
        let mailbox: Arc<Mailbox<StdRawMutex>> = Arc::new(Mailbox::new());

        controller.start();

        let producer = {
            let gate = gate.clone();
            let log = log.clone();
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                for count in 1..=2000u16 {
                    let ad = count_ad(count);
                    {
                        // Callback runs only while the gate is open
                        let open = gate.lock().unwrap();
                        if *open {
                            let event = AdvertisementEvent::parse([0xCC; 6], -60, &ad);
                            let n = process_advertisement(&event, &BthomeDecoder::new(), None, &*mailbox);
                            assert_eq!(n, 1);
                            log.lock().unwrap().push(Event::Published(count));
                        }
                    }
                    thread::yield_now();
                }
            })
        };

        let mut sink = LoggingSink { log: log.clone() };
        while !producer.is_finished() {
            poll_once(&*controller, &*mailbox, &mut sink);
            thread::yield_now();
        }
        producer.join().unwrap();
        poll_once(&*controller, &*mailbox, &mut sink);

        let log = log.lock().unwrap();
        let mut stopped = false;
        let mut last_published = None;
        let mut drains = 0;
        for event in log.iter() {
            match *event {
                Event::Started => stopped = false,
                Event::Stopped => stopped = true,
                Event::Published(count) => {
                    assert!(!stopped, "publish of {count} while scanning was stopped");
                    last_published = Some(count);
                }
                Event::Taken(count) => {
                    assert!(stopped, "drain of {count} outside a scan pause");
                    assert_eq!(Some(count), last_published, "drain returned a stale reading");
                    drains += 1;
                }
            }
        }
        assert!(drains >= 1);
        assert!(!mailbox.is_ready());
        assert_eq!(controller.state(), ScanState::Active);
    }
}
