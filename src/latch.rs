//! Countdown latch used to join submissions and worker startup.
//!
//! The latch is the only primitive the submitting thread blocks on. Waiters
//! spin on the atomic counter for a bounded budget before falling back to a
//! condition variable, which keeps wake-up latency low for the short
//! per-operator dispatches this pool is built for.

use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A reusable single-shot barrier counting down to zero.
///
/// `reset(n)` arms the latch, `count_down()` is called once per participant,
/// and `wait()` returns once the count reaches zero. The latch may be armed
/// again after `wait()` returns; arming it while a waiter is still blocked is
/// a caller bug.
pub struct CountdownLatch {
    count: AtomicUsize,
    mutex: Mutex<()>,
    cond: Condvar,
    spin_budget: Duration,
}

impl CountdownLatch {
    /// Creates a drained latch. `spin_budget` bounds the busy-wait phase of
    /// `wait()` before it blocks on the condition variable.
    pub fn new(spin_budget: Duration) -> Self {
        CountdownLatch {
            count: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
            spin_budget,
        }
    }

    /// Arms the latch for `n` pending `count_down()` calls.
    ///
    /// Must not be called while a `wait()` is in progress.
    pub fn reset(&self, n: usize) {
        self.count.store(n, Ordering::Release);
    }

    /// Records one completion. The decrement releases the caller's writes to
    /// whichever thread observes the count hit zero.
    pub fn count_down(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Empty critical section: pairs with the waiter that checks the
            // counter under the lock, so the notify cannot be lost between
            // its check and its sleep.
            drop(self.mutex.lock().unwrap());
            self.cond.notify_all();
        }
    }

    /// Blocks until the count reaches zero, spinning first.
    pub fn wait(&self) {
        let backoff = Backoff::new();
        let deadline = Instant::now() + self.spin_budget;
        while self.count.load(Ordering::Acquire) != 0 {
            if Instant::now() >= deadline {
                let mut guard = self.mutex.lock().unwrap();
                while self.count.load(Ordering::Acquire) != 0 {
                    guard = self.cond.wait(guard).unwrap();
                }
                return;
            }
            backoff.spin();
        }
    }

    /// Current remaining count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}
