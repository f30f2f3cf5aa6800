/// Single-slot mailbox between the radio callback (producer) and the
/// consumer loop.
///
/// Holds at most one [`Reading`]. Each publish replaces the slot wholesale
/// (last write wins, the producer never blocks). The consumer takes the
/// reading out, which empties the slot.
///
/// The inner mutex makes every individual operation atomic; it does not order
/// a publish against a drain. That ordering comes from the scan lifecycle:
/// the consumer stops scanning before it drains and restarts afterwards, so no
/// callback can publish in between (see [`crate::consumer::poll_once`]).
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::protocol::Reading;

struct Slot {
    reading: Option<Reading>,
    /// Successful publishes since startup
    published: u32,
    /// Publishes that replaced a reading nobody took
    replaced: u32,
}

/// Mailbox counters, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub published: u32,
    pub replaced: u32,
}

pub struct Mailbox<M: RawMutex> {
    slot: Mutex<M, RefCell<Slot>>,
}

impl<M: RawMutex> Mailbox<M> {
    /// Create an empty mailbox. `const` so it can back a `static`.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(Slot {
                reading: None,
                published: 0,
                replaced: 0,
            })),
        }
    }

    /// Store a reading, replacing whatever was there. Never blocks on a full slot.
    pub fn publish(&self, reading: Reading) {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.reading.replace(reading).is_some() {
                slot.replaced = slot.replaced.wrapping_add(1);
            }
            slot.published = slot.published.wrapping_add(1);
        });
    }

    /// Non-blocking readiness check.
    pub fn is_ready(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().reading.is_some())
    }

    /// Take the pending reading, if any. The slot is empty afterwards.
    pub fn try_take_if_ready(&self) -> Option<Reading> {
        self.slot.lock(|slot| slot.borrow_mut().reading.take())
    }

    pub fn stats(&self) -> MailboxStats {
        self.slot.lock(|slot| {
            let slot = slot.borrow();
            MailboxStats {
                published: slot.published,
                replaced: slot.replaced,
            }
        })
    }
}

impl<M: RawMutex> Default for Mailbox<M> {
    fn default() -> Self {
        Self::new()
    }
}
