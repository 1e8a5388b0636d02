//! Fair FIFO exclusion over an integer ticket.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backoff::{Backoff, PauseBackoff};
use crate::cache::CacheAligned;

/// A ticket lock: each acquirer draws a ticket from `head` and spins until
/// `tail` serves it, so acquisitions happen strictly in draw order.
///
/// The two counters sit on separate cache lines; waiters hammer `tail`
/// while arrivals bump `head`.
///
/// Not reentrant: a thread that holds the lock and calls [`lock`]
/// (TicketLock::lock) again waits for its own guard and self-deadlocks.
pub struct TicketLock<B: Backoff = PauseBackoff> {
    /// Next ticket to hand out.
    head: CacheAligned<AtomicUsize>,
    /// Ticket currently being served.
    tail: CacheAligned<AtomicUsize>,
    backoff: B,
}

impl<B: Backoff> TicketLock<B> {
    pub fn new() -> Self {
        TicketLock {
            head: CacheAligned::new(AtomicUsize::new(0)),
            tail: CacheAligned::new(AtomicUsize::new(0)),
            backoff: B::default(),
        }
    }

    /// Draw a ticket and spin until it is served. Returns a guard that
    /// serves the next ticket when dropped.
    pub fn lock(&self) -> TicketGuard<'_, B> {
        let ticket = self.head.fetch_add(1, Ordering::Relaxed);

        while self.tail.load(Ordering::Acquire) != ticket {
            self.backoff.wait();
        }
        self.backoff.adjust();

        TicketGuard { lock: self }
    }
}

impl<B: Backoff> Default for TicketLock<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the ticket lock; dropping it admits the next ticket in line.
pub struct TicketGuard<'a, B: Backoff> {
    lock: &'a TicketLock<B>,
}

impl<B: Backoff> Drop for TicketGuard<'_, B> {
    fn drop(&mut self) {
        self.lock.tail.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::NoBackoff;

    #[test]
    fn relocking_after_release_works() {
        let lock: TicketLock<NoBackoff> = TicketLock::new();
        drop(lock.lock());
        drop(lock.lock());
        drop(lock.lock());
    }

    #[test]
    fn tickets_are_served_in_draw_order() {
        let lock: TicketLock<NoBackoff> = TicketLock::new();
        let guard = lock.lock();
        assert_eq!(lock.head.load(Ordering::Relaxed), 1);
        assert_eq!(lock.tail.load(Ordering::Relaxed), 0);
        drop(guard);
        assert_eq!(lock.tail.load(Ordering::Relaxed), 1);
    }
}
