//! Tile planners mapping strided 1D/2D/3D iteration spaces onto [`ThreadPool::run`].
//!
//! The planner always splits the outermost axis first and only subdivides an
//! inner axis when the outer ones are too small to produce enough tiles.
//! Tensor kernels iterate their innermost axes over contiguous memory, so
//! keeping inner axes whole preserves cache locality.

use crate::pool::ThreadPool;

/// Below this total cost the pool overhead dominates and the whole range
/// runs inline on the submitting thread.
const MAX_COST_USING_SINGLE_THREAD: u64 = 100;

/// One strided axis: the half-open range `start..end` visited in steps of
/// `step` (which must be at least 1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Axis {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl Axis {
    pub fn new(start: usize, end: usize, step: usize) -> Self {
        Axis { start, end, step }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Number of iteration points on the axis.
    pub fn items(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            1 + (self.end - self.start - 1) / self.step
        }
    }

    /// The `idx`-th tile of `tile_size` items, clipped to the axis end. The
    /// returned axis keeps the original step.
    fn tile(&self, idx: usize, tile_size: usize) -> Axis {
        let span = self.step * tile_size;
        let start = self.start + idx * span;
        Axis {
            start,
            end: (start + span).min(self.end),
            step: self.step,
        }
    }
}

fn tile_sizes_2d(items0: usize, items1: usize, default_tile_count: usize) -> (usize, usize) {
    if items0 >= default_tile_count {
        (items0 / default_tile_count, items1)
    } else {
        (1, (items0 * items1 / default_tile_count).max(1))
    }
}

fn tile_sizes_3d(
    items0: usize,
    items1: usize,
    items2: usize,
    default_tile_count: usize,
) -> (usize, usize, usize) {
    if items0 >= default_tile_count {
        return (items0 / default_tile_count, items1, items2);
    }
    let items01 = items0 * items1;
    if items01 >= default_tile_count {
        (1, items01 / default_tile_count, items2)
    } else {
        (1, 1, (items01 * items2 / default_tile_count).max(1))
    }
}

impl ThreadPool {
    fn runs_single_threaded(&self, total_items: u64, cost_per_item: i64) -> bool {
        self.thread_count() <= 1
            || (cost_per_item >= 0
                && total_items.saturating_mul(cost_per_item as u64) < MAX_COST_USING_SINGLE_THREAD)
    }

    /// Tiles a 1D iteration space and dispatches the tiles through the pool.
    ///
    /// `tile_size` of 0 picks `max(1, items / default_tile_count)`. A
    /// negative `cost_per_item` disables the single-thread short-circuit;
    /// otherwise ranges whose total cost falls below the amortization
    /// threshold run inline. The callback receives each tile's sub-range
    /// with the original step.
    pub fn compute_1d<F>(&self, callback: F, axis: Axis, tile_size: usize, cost_per_item: i64)
    where
        F: Fn(Axis) + Sync,
    {
        assert!(axis.step >= 1, "axis step must be >= 1");
        if axis.is_empty() {
            return;
        }

        let items = axis.items();
        if self.runs_single_threaded(items as u64, cost_per_item) {
            callback(axis);
            return;
        }

        let tile_size = if tile_size == 0 {
            (items / self.default_tile_count()).max(1)
        } else {
            tile_size
        };
        let tile_count = items.div_ceil(tile_size);

        self.run(
            |tile_idx| callback(axis.tile(tile_idx, tile_size)),
            tile_count,
        );
    }

    /// Tiles a 2D iteration space. Axis 0 is split across tiles first; axis
    /// 1 is only subdivided when axis 0 has fewer items than the default
    /// tile count.
    pub fn compute_2d<F>(
        &self,
        callback: F,
        axis0: Axis,
        axis1: Axis,
        tile_size0: usize,
        tile_size1: usize,
        cost_per_item: i64,
    ) where
        F: Fn(Axis, Axis) + Sync,
    {
        assert!(axis0.step >= 1 && axis1.step >= 1, "axis step must be >= 1");
        if axis0.is_empty() || axis1.is_empty() {
            return;
        }

        let items0 = axis0.items();
        let items1 = axis1.items();
        let total = (items0 as u64).saturating_mul(items1 as u64);
        if self.runs_single_threaded(total, cost_per_item) {
            callback(axis0, axis1);
            return;
        }

        let (tile_size0, tile_size1) = if tile_size0 == 0 || tile_size1 == 0 {
            tile_sizes_2d(items0, items1, self.default_tile_count())
        } else {
            (tile_size0, tile_size1)
        };

        let tile_count0 = items0.div_ceil(tile_size0);
        let tile_count1 = items1.div_ceil(tile_size1);

        self.run(
            |tile_idx| {
                let tile_idx0 = tile_idx / tile_count1;
                let tile_idx1 = tile_idx % tile_count1;
                callback(
                    axis0.tile(tile_idx0, tile_size0),
                    axis1.tile(tile_idx1, tile_size1),
                )
            },
            tile_count0 * tile_count1,
        );
    }

    /// Tiles a 3D iteration space with the axis-0 → axis-1 → axis-2 cascade.
    pub fn compute_3d<F>(
        &self,
        callback: F,
        axis0: Axis,
        axis1: Axis,
        axis2: Axis,
        tile_size0: usize,
        tile_size1: usize,
        tile_size2: usize,
        cost_per_item: i64,
    ) where
        F: Fn(Axis, Axis, Axis) + Sync,
    {
        assert!(
            axis0.step >= 1 && axis1.step >= 1 && axis2.step >= 1,
            "axis step must be >= 1"
        );
        if axis0.is_empty() || axis1.is_empty() || axis2.is_empty() {
            return;
        }

        let items0 = axis0.items();
        let items1 = axis1.items();
        let items2 = axis2.items();
        let total = (items0 as u64)
            .saturating_mul(items1 as u64)
            .saturating_mul(items2 as u64);
        if self.runs_single_threaded(total, cost_per_item) {
            callback(axis0, axis1, axis2);
            return;
        }

        let (tile_size0, tile_size1, tile_size2) =
            if tile_size0 == 0 || tile_size1 == 0 || tile_size2 == 0 {
                tile_sizes_3d(items0, items1, items2, self.default_tile_count())
            } else {
                (tile_size0, tile_size1, tile_size2)
            };

        let tile_count0 = items0.div_ceil(tile_size0);
        let tile_count1 = items1.div_ceil(tile_size1);
        let tile_count2 = items2.div_ceil(tile_size2);
        let tile_count12 = tile_count1 * tile_count2;

        self.run(
            |tile_idx| {
                let tile_idx0 = tile_idx / tile_count12;
                let tile_idx12 = tile_idx % tile_count12;
                let tile_idx1 = tile_idx12 / tile_count2;
                let tile_idx2 = tile_idx12 % tile_count2;
                callback(
                    axis0.tile(tile_idx0, tile_size0),
                    axis1.tile(tile_idx1, tile_size1),
                    axis2.tile(tile_idx2, tile_size2),
                )
            },
            tile_count0 * tile_count12,
        );
    }
}
