//! # tilepool - Affinity-Aware Work-Stealing Compute Pool
//!
//! A CPU-affinity-aware, work-stealing thread pool that parallelizes
//! bounded 1D/2D/3D index-space loops across pinned worker threads. It is
//! built for per-operator kernels of an inference runtime on heterogeneous
//! (big.LITTLE) mobile CPUs, where dispatch latency and scheduling balance
//! across fast and slow cores dominate end-to-end latency.
//!
//! ## Architecture
//!
//! - **Event channel**: one atomic word (state tag + generation counter)
//!   carries `Init`/`Run`/`Shutdown` edges from the submitter to all workers
//! - **Work stealing**: each worker drains its own contiguous index range
//!   from the head, then steals from peers' tails via a CAS on the range
//!   length
//! - **Countdown latch**: spin-then-block barrier joining every submission
//! - **Affinity**: cores are selected by max-frequency policy (big cluster,
//!   LITTLE cluster, fastest-N, slowest-N) and workers pin themselves on
//!   startup
//! - **Tile planner**: strided N-D loops are cut into cache-friendly tiles,
//!   outermost axis first, and dispatched as a 1D tile-index space
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tilepool::{AffinityPolicy, Axis, ThreadPool};
//!
//! let mut pool = ThreadPool::new(4, AffinityPolicy::HighPerformance);
//! pool.init();
//!
//! let sum = AtomicUsize::new(0);
//! pool.run(|i| { sum.fetch_add(i, Ordering::Relaxed); }, 1000);
//! assert_eq!(sum.load(Ordering::Relaxed), 499_500);
//!
//! // Tiled dispatch of a strided loop; each callback gets one sub-range.
//! pool.compute_1d(
//!     |tile| {
//!         let mut i = tile.start;
//!         while i < tile.end {
//!             // process element i
//!             i += tile.step;
//!         }
//!     },
//!     Axis::new(0, 4096, 1),
//!     0,  // pick the tile size automatically
//!     -1, // never short-circuit to single-threaded
//! );
//! ```

pub mod affinity;
mod event;
pub mod latch;
pub mod platform;
pub mod pool;
pub mod tile;
mod worker;

pub use affinity::AffinityPolicy;
pub use latch::CountdownLatch;
pub use platform::PlatformError;
pub use pool::ThreadPool;
pub use tile::Axis;
