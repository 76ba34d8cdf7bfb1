//! Per-session frame numbering.
//!
//! Every frame a render session produces carries a sequence number so that a
//! client can drop frames that arrive after a newer one, and so that several
//! clients watching one session can tell whether they saw the same render.
//!
//! The counter is an `AtomicU64`: renders are serialised per session, but the
//! counter is also read for logging from other tasks without taking the
//! session lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing frame sequence numbers, starting at 1.
///
/// 0 is reserved for frames that were never stamped. The counter skips 0 when
/// it wraps at `u64::MAX`.
///
/// # Examples
///
/// ```rust
/// use gdsview_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next sequence number and advances the counter.
    ///
    /// `Relaxed` is enough: the value orders frames, it does not publish
    /// memory.
    pub fn next(&self) -> u64 {
        loop {
            let value = self.inner.fetch_add(1, Ordering::Relaxed);
            if value != 0 {
                return value;
            }
        }
    }

    /// The most recently issued number, or 0 if none was issued yet.
    pub fn last(&self) -> u64 {
        self.inner.load(Ordering::Relaxed).wrapping_sub(1)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
