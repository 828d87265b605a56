//! The thread pool: construction, worker lifecycle, and the submission path.

use crate::affinity::{self, AffinityPolicy};
use crate::event::{EventChannel, EVENT_INIT, EVENT_RUN, EVENT_SHUTDOWN};
use crate::latch::CountdownLatch;
use crate::platform;
use crate::worker::{execute, Task, Worker, WorkerState};
use crossbeam::utils::CachePadded;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Spin budget shared by the event wait and the latch wait. Bounded busy
/// waiting keeps wake-up latency in the sub-microsecond range for the short
/// back-to-back dispatches typical of per-operator kernels.
pub(crate) const SPIN_WAIT_BUDGET: Duration = Duration::from_millis(2);

/// Tiles generated per thread when the selected cores run at different
/// maximum frequencies; oversubscription lets fast cores steal the slack.
const TILE_COUNT_PER_THREAD: usize = 2;

/// State shared between the submitter and the spawned workers.
pub(crate) struct Shared {
    pub(crate) workers: Vec<CachePadded<WorkerState>>,
    pub(crate) event: EventChannel,
    pub(crate) latch: CountdownLatch,
}

/// A CPU-affinity-aware work-stealing pool for bounded index-space loops.
///
/// Worker 0 is the submitting thread itself; workers `1..N` are spawned by
/// [`init`](ThreadPool::init) and live until the pool is destroyed. A
/// submission partitions `[0, iterations)` into one contiguous range per
/// worker; workers drain their own range from the head and steal from peers'
/// tails once it is empty.
pub struct ThreadPool {
    shared: Arc<Shared>,
    spawned: Vec<Worker>,
    run_mutex: Mutex<()>,
    default_tile_count: usize,
    initialized: bool,
}

impl ThreadPool {
    /// Creates the pool, selecting and binding cores under `policy`.
    ///
    /// `thread_count_hint` of 0 means one thread per logical core; the hint
    /// is clamped to the number of cores, and further to the selected core
    /// set when pinning is active. Failure to query frequencies or to bind
    /// affinity is logged and the pool proceeds unpinned.
    pub fn new(thread_count_hint: usize, policy: AffinityPolicy) -> Self {
        let cpu_max_freqs = match platform::query_cpu_max_frequencies() {
            Ok(freqs) => freqs,
            Err(err) => {
                log::error!("failed to query cpu max frequencies: {err}");
                Vec::new()
            }
        };

        let cpu_count = if cpu_max_freqs.is_empty() {
            num_cpus::get()
        } else {
            cpu_max_freqs.len()
        };
        // A hint of 0 means one thread per logical core.
        let hint = if thread_count_hint == 0 {
            cpu_count
        } else {
            thread_count_hint
        };
        let mut thread_count = hint.clamp(1, cpu_count);

        let cores = affinity::cores_to_use(&cpu_max_freqs, policy, thread_count);
        if !cores.is_empty() {
            // The submitter binds itself once; spawned workers repeat the
            // call on their own threads.
            if let Err(err) = platform::bind_current_thread_to_cores(&cores) {
                log::error!("failed to bind submitter thread affinity: {err}");
            }
            if thread_count > cores.len() {
                thread_count = cores.len();
            }
        }
        log::debug!("thread pool uses {thread_count} threads on cores {cores:?}");

        let heterogeneous = cores.len() >= 2
            && cores
                .iter()
                .any(|&core| cpu_max_freqs[core] != cpu_max_freqs[cores[0]]);
        let default_tile_count = if heterogeneous {
            thread_count * TILE_COUNT_PER_THREAD
        } else {
            thread_count
        };
        assert!(default_tile_count >= 1, "default tile count must be >= 1");

        let workers = (0..thread_count)
            .map(|_| CachePadded::new(WorkerState::new(cores.clone())))
            .collect();

        ThreadPool {
            shared: Arc::new(Shared {
                workers,
                event: EventChannel::new(),
                latch: CountdownLatch::new(SPIN_WAIT_BUDGET),
            }),
            spawned: Vec::new(),
            run_mutex: Mutex::new(()),
            default_tile_count,
            initialized: false,
        }
    }

    /// Spawns the `N - 1` worker threads and blocks until every one of them
    /// has pinned itself and acknowledged the `Init` event.
    ///
    /// No-op on a single-thread pool and on repeated calls.
    pub fn init(&mut self) {
        let thread_count = self.thread_count();
        if thread_count <= 1 || self.initialized {
            return;
        }
        log::debug!("spawning {} worker threads", thread_count - 1);

        self.shared.latch.reset(thread_count - 1);
        self.shared.event.publish(EVENT_INIT);
        for tid in 1..thread_count {
            self.spawned.push(Worker::spawn(Arc::clone(&self.shared), tid));
        }
        self.shared.latch.wait();
        self.initialized = true;
    }

    /// Invokes `callback(i)` exactly once for every `i in [0, iterations)`,
    /// in parallel, returning only after all invocations have completed.
    ///
    /// Concurrent submissions are serialized. Within one submission no
    /// ordering is promised between distinct indices.
    pub fn run<F>(&self, callback: F, iterations: usize)
    where
        F: Fn(usize) + Sync,
    {
        let thread_count = self.thread_count();
        assert!(
            thread_count <= 1 || self.initialized,
            "init() must be called before run() on a multi-thread pool"
        );

        let _run_guard = self.run_mutex.lock().unwrap();

        let task: &(dyn Fn(usize) + Sync) = &callback;
        // SAFETY: the erased lifetime never escapes this call. Workers drop
        // their borrow of the callback before counting down the latch, and
        // we do not return until the latch drains.
        let task: &'static Task = unsafe { mem::transmute(task) };

        let base = iterations / thread_count;
        let remainder = iterations % thread_count;
        let mut offset = 0;
        for (index, worker) in self.shared.workers.iter().enumerate() {
            let len = base + usize::from(index < remainder);
            worker.assign(offset, offset + len, task);
            offset += len;
        }

        self.shared.latch.reset(thread_count - 1);
        self.shared.event.publish(EVENT_RUN);

        // The submitter is worker 0.
        execute(&self.shared, 0);
        self.shared.latch.wait();
    }

    /// Signals `Shutdown` and joins all spawned workers.
    ///
    /// Runs implicitly on drop. Must not be called while a `run` is in
    /// progress; the pool may be re-initialized afterwards.
    pub fn destroy(&mut self) {
        if self.spawned.is_empty() {
            return;
        }
        log::debug!("destroying thread pool");

        let _run_guard = self.run_mutex.lock().unwrap();
        // The latch is already drained here unless the caller broke the
        // no-concurrent-run precondition.
        self.shared.latch.wait();
        self.shared.event.publish(EVENT_SHUTDOWN);
        for worker in &mut self.spawned {
            worker.join();
        }
        self.spawned.clear();
        self.initialized = false;
    }

    /// Number of workers participating in a submission, the submitting
    /// thread included.
    pub fn thread_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Target tile count used when a compute call does not fix a tile size.
    pub fn default_tile_count(&self) -> usize {
        self.default_tile_count
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.destroy();
    }
}
