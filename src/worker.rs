//! Per-worker state and the work-stealing executor.
//!
//! Each worker owns a contiguous index range `[range_start, range_end)`.
//! `range_len` is the arbitrator: claiming an index means winning a CAS that
//! decrements it. The owner then advances the head, a stealer retreats the
//! tail, so the two sides never touch the same end of the range.

use crate::event::{event_tag, EVENT_INIT, EVENT_NONE, EVENT_RUN, EVENT_SHUTDOWN};
use crate::platform;
use crate::pool::{Shared, SPIN_WAIT_BUDGET};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Type-erased handle to the submission callback.
pub(crate) type Task = dyn Fn(usize) + Sync;

/// Holds the callback handle for the current submission.
///
/// The slot is written by the submitter before it publishes the `Run` event
/// and read by workers after they acquire that event, so the event word is
/// the synchronization point; no atomicity is needed here.
pub(crate) struct TaskSlot {
    cell: UnsafeCell<Option<NonNull<Task>>>,
}

// SAFETY: all writes happen-before all reads through the release/acquire
// edge on the event word, and the pointee outlives every reader because
// `run` does not return until the latch drains.
unsafe impl Send for TaskSlot {}
unsafe impl Sync for TaskSlot {}

impl TaskSlot {
    fn new() -> Self {
        TaskSlot {
            cell: UnsafeCell::new(None),
        }
    }

    fn set(&self, task: &'static Task) {
        unsafe { *self.cell.get() = Some(NonNull::from(task)) }
    }

    /// # Safety
    ///
    /// Callers must have acquired an event edge published after `set`, and
    /// the submission that installed the handle must still be in flight.
    unsafe fn get(&self) -> &Task {
        (*self.cell.get())
            .expect("task slot read before assignment")
            .as_ref()
    }
}

/// One worker's slice of the current submission.
pub(crate) struct WorkerState {
    range_start: AtomicUsize,
    range_end: AtomicUsize,
    range_len: AtomicUsize,
    task: TaskSlot,
    cpu_cores: Vec<usize>,
}

impl WorkerState {
    pub(crate) fn new(cpu_cores: Vec<usize>) -> Self {
        WorkerState {
            range_start: AtomicUsize::new(0),
            range_end: AtomicUsize::new(0),
            range_len: AtomicUsize::new(0),
            task: TaskSlot::new(),
            cpu_cores,
        }
    }

    /// Installs the range and callback for the next submission. Only the
    /// submitter calls this, before publishing the `Run` event.
    pub(crate) fn assign(&self, start: usize, end: usize, task: &'static Task) {
        self.range_start.store(start, Ordering::Relaxed);
        self.range_end.store(end, Ordering::Relaxed);
        self.range_len.store(end - start, Ordering::Relaxed);
        self.task.set(task);
    }

    /// Claims one index from the head of this range. Owner side only.
    fn claim_own(&self) -> Option<usize> {
        let mut len = self.range_len.load(Ordering::Acquire);
        while len > 0 {
            match self.range_len.compare_exchange_weak(
                len,
                len - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // Winning the CAS grants exclusive right to one index; the
                // head is advanced only by the owner.
                Ok(_) => return Some(self.range_start.fetch_add(1, Ordering::Relaxed)),
                Err(observed) => len = observed,
            }
        }
        None
    }

    /// Claims one index from the tail of this range. Stealer side only.
    fn claim_tail(&self) -> Option<usize> {
        let mut len = self.range_len.load(Ordering::Acquire);
        while len > 0 {
            match self.range_len.compare_exchange_weak(
                len,
                len - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(self.range_end.fetch_sub(1, Ordering::Relaxed) - 1),
                Err(observed) => len = observed,
            }
        }
        None
    }

    pub(crate) fn cpu_cores(&self) -> &[usize] {
        &self.cpu_cores
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.range_len.load(Ordering::Acquire)
    }
}

/// Drains the caller's own range, then steals from peers in cyclic order.
pub(crate) fn execute(shared: &Shared, tid: usize) {
    let me = &shared.workers[tid];
    // SAFETY: the Run event that brought us here was published after every
    // slot was assigned, and the submitter blocks on the latch until this
    // function returns on every worker.
    let task = unsafe { me.task.get() };
    while let Some(index) = me.claim_own() {
        task(index);
    }

    let worker_count = shared.workers.len();
    for offset in 1..worker_count {
        let peer = &shared.workers[(tid + offset) % worker_count];
        // SAFETY: as above.
        let peer_task = unsafe { peer.task.get() };
        while let Some(index) = peer.claim_tail() {
            peer_task(index);
        }
    }
}

/// Handle to a spawned worker thread.
pub(crate) struct Worker {
    tid: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns the worker thread running `worker_loop`.
    pub(crate) fn spawn(shared: Arc<Shared>, tid: usize) -> Worker {
        let handle = thread::Builder::new()
            .name(format!("tilepool-worker-{tid}"))
            .spawn(move || worker_loop(&shared, tid))
            .expect("failed to spawn worker thread");
        Worker {
            tid,
            handle: Some(handle),
        }
    }

    /// Waits for the worker thread to exit. A panicked worker is logged
    /// rather than propagated; shutdown keeps going.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("worker {} panicked during shutdown", self.tid);
            }
        }
    }
}

fn worker_loop(shared: &Shared, tid: usize) {
    let cores = shared.workers[tid].cpu_cores();
    if !cores.is_empty() {
        if let Err(err) = platform::bind_current_thread_to_cores(cores) {
            log::error!("worker {tid}: failed to bind cpu affinity: {err}");
        }
    }

    let mut last_event = EVENT_NONE;
    loop {
        let event = shared.event.wait_for_change(last_event, SPIN_WAIT_BUDGET);
        match event_tag(event) {
            EVENT_INIT => shared.latch.count_down(),
            EVENT_RUN => {
                execute(shared, tid);
                shared.latch.count_down();
            }
            EVENT_SHUTDOWN => return,
            _ => {}
        }
        last_event = event;
    }
}
