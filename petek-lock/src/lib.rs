//! Busy-wait mutual exclusion primitives.
//!
//! Two locks over one pluggable [`Backoff`] policy:
//!
//! - [`TicketLock`]: fair FIFO exclusion; threads acquire strictly in the
//!   order they fetched their ticket.
//! - [`SpinLock`]: exclusive lock that lets the owning thread re-enter;
//!   no ordering guarantee, starvation possible and accepted.
//!
//! Both spin entirely in userspace, with no system call on any path, and stay
//! correct under any `wait` implementation, including one that does nothing.
//! They hold no data; callers pair them with whatever they protect.
//!
//! ```rust
//! use petek_lock::{PauseBackoff, TicketLock};
//!
//! let lock: TicketLock<PauseBackoff> = TicketLock::new();
//! let guard = lock.lock();
//! // critical section
//! drop(guard);
//! ```

mod backoff;
mod cache;
mod spin;
mod ticket;

pub use backoff::{Backoff, NoBackoff, PauseBackoff};
pub use spin::{SpinGuard, SpinLock};
pub use ticket::{TicketGuard, TicketLock};
