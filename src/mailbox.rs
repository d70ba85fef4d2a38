//! Single-slot mailboxes between interrupt context and the scheduler.
//!
//! Each interrupt source gets exactly one writer (the handler) and one
//! reader (the scheduler, which takes and clears). A second post before
//! the take overwrites the first: latest wins.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;

/// A dirty flag with no payload.
pub struct Flag {
    raised: AtomicBool,
}

impl Flag {
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
        }
    }

    /// Interrupt side. O(1), no allocation.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Scheduler side: returns `true` once per raise burst.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new()
    }
}

/// A flag plus one payload cell.
pub struct Mailbox<T> {
    slot: Mutex<Cell<Option<T>>>,
    dirty: Flag,
}

impl<T> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
            dirty: Flag::new(),
        }
    }

    /// Store `value`, replacing any unread one.
    ///
    /// Returns `true` when an unread value was overwritten.
    pub fn post(&self, value: T) -> bool {
        let previous = critical_section::with(|cs| self.slot.borrow(cs).replace(Some(value)));
        self.dirty.raise();
        previous.is_some()
    }

    /// Atomically take the pending value and clear the slot.
    pub fn take(&self) -> Option<T> {
        if !self.dirty.take() {
            return None;
        }
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    /// Cheap check the scheduler can make without entering a critical section.
    pub fn is_pending(&self) -> bool {
        self.dirty.is_raised()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
