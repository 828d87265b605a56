//! Event channel carrying state edges from the submitter to all workers.
//!
//! The channel is a single atomic word. The low bits hold the state tag and
//! the high bits hold a generation counter bumped on every publish, so a
//! worker that already served one `Run` still sees the next `Run` as a fresh
//! edge. Workers compare the full word against the last word they handled,
//! never the tag alone.

use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub(crate) const EVENT_NONE: u32 = 0;
pub(crate) const EVENT_INIT: u32 = 1;
pub(crate) const EVENT_RUN: u32 = 2;
pub(crate) const EVENT_SHUTDOWN: u32 = 4;

const TAG_MASK: u32 = 0b111;
// One generation step: the counter lives above the tag bits and is allowed
// to wrap; equality against a worker's last observed word is all that
// matters.
const GENERATION_UNIT: u32 = TAG_MASK + 1;

/// Extracts the state tag from an event word.
pub(crate) fn event_tag(word: u32) -> u32 {
    word & TAG_MASK
}

/// The shared event word plus the mutex/condvar pair guarding its sleep side.
///
/// The word itself is read without the mutex; the mutex only serializes the
/// publish against a waiter going to sleep, closing the missed-wakeup window.
pub(crate) struct EventChannel {
    word: AtomicU32,
    mutex: Mutex<()>,
    cond: Condvar,
}

impl EventChannel {
    pub(crate) fn new() -> Self {
        EventChannel {
            word: AtomicU32::new(EVENT_NONE),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Publishes a new edge with the given state tag, waking all sleepers.
    ///
    /// The release store is what publishes the submitter's preceding writes
    /// (worker ranges, task handles) to the workers.
    pub(crate) fn publish(&self, tag: u32) {
        debug_assert_eq!(tag & !TAG_MASK, 0, "tag must fit in the low bits");
        let guard = self.mutex.lock().unwrap();
        let current = self.word.load(Ordering::Relaxed);
        let next = (current.wrapping_add(GENERATION_UNIT) & !TAG_MASK) | tag;
        self.word.store(next, Ordering::Release);
        drop(guard);
        self.cond.notify_all();
    }

    /// Waits until the event word differs from `last_event` and returns the
    /// new word. Spins up to `spin_budget`, then sleeps on the condvar.
    pub(crate) fn wait_for_change(&self, last_event: u32, spin_budget: Duration) -> u32 {
        let backoff = Backoff::new();
        let deadline = Instant::now() + spin_budget;
        loop {
            let word = self.word.load(Ordering::Acquire);
            if word != last_event {
                return word;
            }
            if Instant::now() >= deadline {
                break;
            }
            backoff.spin();
        }

        let mut guard = self.mutex.lock().unwrap();
        loop {
            let word = self.word.load(Ordering::Acquire);
            if word != last_event {
                return word;
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Current event word, without waiting.
    #[cfg(test)]
    pub(crate) fn current(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SPIN: Duration = Duration::from_millis(2);

    #[test]
    fn publish_changes_the_full_word() {
        let channel = EventChannel::new();
        assert_eq!(channel.current(), EVENT_NONE);

        channel.publish(EVENT_INIT);
        let init = channel.current();
        assert_eq!(event_tag(init), EVENT_INIT);

        channel.publish(EVENT_RUN);
        let first_run = channel.current();
        assert_eq!(event_tag(first_run), EVENT_RUN);

        // A second Run must differ from the first by generation even though
        // the tag is identical.
        channel.publish(EVENT_RUN);
        let second_run = channel.current();
        assert_eq!(event_tag(second_run), EVENT_RUN);
        assert_ne!(first_run, second_run);
    }

    #[test]
    fn wait_returns_immediately_on_stale_last_event() {
        let channel = EventChannel::new();
        channel.publish(EVENT_RUN);
        let word = channel.wait_for_change(EVENT_NONE, SPIN);
        assert_eq!(event_tag(word), EVENT_RUN);
    }

    #[test]
    fn sleeper_is_woken_by_publish() {
        let channel = Arc::new(EventChannel::new());
        let last = channel.current();

        let waiter = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.wait_for_change(last, SPIN))
        };

        // Let the waiter burn through its spin budget and go to sleep.
        thread::sleep(Duration::from_millis(20));
        channel.publish(EVENT_SHUTDOWN);

        let word = waiter.join().unwrap();
        assert_eq!(event_tag(word), EVENT_SHUTDOWN);
    }
}
