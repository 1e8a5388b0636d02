//! Wait strategies for busy-wait locks.

use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A back-off strategy consulted while a lock is contended.
///
/// `wait` runs between failed acquisition attempts; `adjust` runs once after
/// every successful acquisition as a feedback step. Both are advisory: a
/// lock remains correct under any implementation.
///
/// State is interior and relaxed-atomic so one instance can serve every
/// waiter of a shared lock.
pub trait Backoff: Default {
    fn wait(&self);
    fn adjust(&self);
}

/// No back-off: waiters raw-loop on the lock word.
///
/// Right when critical sections last nanoseconds (an atomic counter bump);
/// maxes out the CPU if held longer.
#[derive(Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn wait(&self) {}

    fn adjust(&self) {}
}

/// Userspace pause back-off: each wait issues a run of architecture pause
/// hints, and the run length adapts to how quickly the lock was won.
///
/// Right for moderate contention with critical sections in the microsecond
/// range (manipulating a container in memory). Entirely user-level.
pub struct PauseBackoff {
    estimate: AtomicUsize,
    waits: AtomicUsize,
}

impl Default for PauseBackoff {
    fn default() -> Self {
        PauseBackoff {
            estimate: AtomicUsize::new(32),
            waits: AtomicUsize::new(0),
        }
    }
}

impl Backoff for PauseBackoff {
    fn wait(&self) {
        let estimate = self.estimate.load(Ordering::Relaxed);
        for _ in 0..estimate {
            hint::spin_loop();
        }

        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    fn adjust(&self) {
        let estimate = self.estimate.load(Ordering::Relaxed);
        if self.waits.load(Ordering::Relaxed) < 8 {
            self.estimate.store(estimate / 2, Ordering::Relaxed);
        } else {
            self.estimate
                .store((1 + ((estimate & 0xFF) + (estimate / 4))) & 0xFF, Ordering::Relaxed);
        }

        self.waits.store(0, Ordering::Relaxed);
    }
}
