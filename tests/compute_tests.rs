//! Tiled dispatch tests: short-circuits, strides, and N-D tile coverage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tilepool::{AffinityPolicy, Axis, ThreadPool};

fn pool(threads: usize) -> ThreadPool {
    let mut pool = ThreadPool::new(threads, AffinityPolicy::None);
    pool.init();
    pool
}

fn counters(n: usize) -> Vec<AtomicUsize> {
    (0..n).map(|_| AtomicUsize::new(0)).collect()
}

fn walk(axis: Axis, mut visit: impl FnMut(usize)) {
    let mut i = axis.start;
    while i < axis.end {
        visit(i);
        i += axis.step;
    }
}

#[test]
fn compute_1d_covers_a_unit_stride_range() {
    let pool = pool(4);
    let values = counters(10);

    pool.compute_1d(
        |tile| walk(tile, |i| values[i].store(i + 1, Ordering::Relaxed)),
        Axis::new(0, 10, 1),
        1,
        -1,
    );

    for (i, value) in values.iter().enumerate() {
        assert_eq!(value.load(Ordering::Relaxed), i + 1);
    }
}

#[test]
fn compute_1d_covers_a_strided_range_exactly_once() {
    let pool = pool(4);
    let hits = counters(100);

    pool.compute_1d(
        |tile| {
            walk(tile, |i| {
                hits[i].fetch_add(1, Ordering::Relaxed);
            })
        },
        Axis::new(3, 100, 7),
        0,
        -1,
    );

    for i in 0..100 {
        let expected = usize::from(i >= 3 && (i - 3) % 7 == 0);
        assert_eq!(hits[i].load(Ordering::Relaxed), expected, "index {i}");
    }
}

#[test]
fn cheap_ranges_run_inline_in_one_invocation() {
    let pool = pool(4);
    let invocations = AtomicUsize::new(0);
    let tiles: Mutex<Vec<Axis>> = Mutex::new(Vec::new());

    // 3 items at cost 0 is far below the amortization threshold.
    pool.compute_1d(
        |tile| {
            invocations.fetch_add(1, Ordering::Relaxed);
            tiles.lock().unwrap().push(tile);
        },
        Axis::new(0, 3, 1),
        0,
        0,
    );

    assert_eq!(invocations.load(Ordering::Relaxed), 1);
    assert_eq!(tiles.lock().unwrap()[0], Axis::new(0, 3, 1));
}

#[test]
fn negative_cost_disables_the_short_circuit() {
    let pool = pool(4);
    if pool.thread_count() <= 1 {
        // Short-circuiting on N == 1 is the intended behavior; nothing to
        // observe on this machine.
        return;
    }
    let invocations = AtomicUsize::new(0);
    let hits = counters(3);

    pool.compute_1d(
        |tile| {
            invocations.fetch_add(1, Ordering::Relaxed);
            walk(tile, |i| {
                hits[i].fetch_add(1, Ordering::Relaxed);
            })
        },
        Axis::new(0, 3, 1),
        1,
        -1,
    );

    assert_eq!(invocations.load(Ordering::Relaxed), 3, "one tile per item");
    assert!(hits.iter().all(|hit| hit.load(Ordering::Relaxed) == 1));
}

#[test]
fn explicit_tile_size_produces_clipped_tiles() {
    let pool = pool(4);
    let tiles: Mutex<Vec<Axis>> = Mutex::new(Vec::new());

    pool.compute_1d(
        |tile| tiles.lock().unwrap().push(tile),
        Axis::new(0, 10, 1),
        4,
        -1,
    );

    let mut tiles = tiles.lock().unwrap();
    tiles.sort_by_key(|tile| tile.start);
    assert_eq!(
        *tiles,
        vec![Axis::new(0, 4, 1), Axis::new(4, 8, 1), Axis::new(8, 10, 1)]
    );
}

#[test]
fn empty_axis_returns_without_invoking() {
    let pool = pool(4);
    let calls = AtomicUsize::new(0);
    let bump = |_: Axis| {
        calls.fetch_add(1, Ordering::Relaxed);
    };

    pool.compute_1d(bump, Axis::new(5, 5, 1), 0, -1);
    pool.compute_1d(bump, Axis::new(9, 2, 1), 0, -1);
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn compute_2d_writes_every_cell_once() {
    let pool = pool(4);
    let (rows, cols) = (4, 8);
    let grid = counters(rows * cols);

    pool.compute_2d(
        |tile0, tile1| {
            walk(tile0, |i| {
                walk(tile1, |j| {
                    grid[i * cols + j].fetch_add(1, Ordering::Relaxed);
                })
            })
        },
        Axis::new(0, rows, 1),
        Axis::new(0, cols, 1),
        0,
        0,
        -1,
    );

    assert!(grid.iter().all(|cell| cell.load(Ordering::Relaxed) == 1));
}

#[test]
fn compute_2d_respects_strides() {
    let pool = pool(4);
    let (rows, cols) = (9, 10);
    let grid = counters(rows * cols);

    pool.compute_2d(
        |tile0, tile1| {
            walk(tile0, |i| {
                walk(tile1, |j| {
                    grid[i * cols + j].fetch_add(1, Ordering::Relaxed);
                })
            })
        },
        Axis::new(1, rows, 2),
        Axis::new(0, cols, 3),
        0,
        0,
        -1,
    );

    for i in 0..rows {
        for j in 0..cols {
            let expected = usize::from(i % 2 == 1 && j % 3 == 0);
            assert_eq!(
                grid[i * cols + j].load(Ordering::Relaxed),
                expected,
                "cell ({i}, {j})"
            );
        }
    }
}

#[test]
fn compute_2d_with_explicit_tile_sizes() {
    let pool = pool(4);
    let (rows, cols) = (6, 6);
    let grid = counters(rows * cols);

    pool.compute_2d(
        |tile0, tile1| {
            walk(tile0, |i| {
                walk(tile1, |j| {
                    grid[i * cols + j].fetch_add(1, Ordering::Relaxed);
                })
            })
        },
        Axis::new(0, rows, 1),
        Axis::new(0, cols, 1),
        2,
        4,
        -1,
    );

    assert!(grid.iter().all(|cell| cell.load(Ordering::Relaxed) == 1));
}

#[test]
fn compute_3d_visits_every_triple_once() {
    let pool = pool(4);
    let (d0, d1, d2) = (2, 3, 5);
    let grid = counters(d0 * d1 * d2);
    let total = AtomicUsize::new(0);

    pool.compute_3d(
        |tile0, tile1, tile2| {
            walk(tile0, |i| {
                walk(tile1, |j| {
                    walk(tile2, |k| {
                        grid[(i * d1 + j) * d2 + k].fetch_add(1, Ordering::Relaxed);
                        total.fetch_add(1, Ordering::Relaxed);
                    })
                })
            })
        },
        Axis::new(0, d0, 1),
        Axis::new(0, d1, 1),
        Axis::new(0, d2, 1),
        0,
        0,
        0,
        -1,
    );

    assert_eq!(total.load(Ordering::Relaxed), d0 * d1 * d2);
    assert!(grid.iter().all(|cell| cell.load(Ordering::Relaxed) == 1));
}

#[test]
fn compute_3d_checks_each_axis_against_its_own_bounds() {
    let pool = pool(4);
    let calls = AtomicUsize::new(0);

    // Axis 2 is empty while axes 0 and 1 are not; nothing may run.
    pool.compute_3d(
        |_, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        },
        Axis::new(0, 4, 1),
        Axis::new(0, 4, 1),
        Axis::new(7, 7, 1),
        0,
        0,
        0,
        -1,
    );

    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn compute_3d_with_strides_and_offsets() {
    let pool = pool(4);
    let (d0, d1, d2) = (7, 5, 11);
    let grid = counters(d0 * d1 * d2);

    pool.compute_3d(
        |tile0, tile1, tile2| {
            walk(tile0, |i| {
                walk(tile1, |j| {
                    walk(tile2, |k| {
                        grid[(i * d1 + j) * d2 + k].fetch_add(1, Ordering::Relaxed);
                    })
                })
            })
        },
        Axis::new(1, d0, 3),
        Axis::new(0, d1, 2),
        Axis::new(4, d2, 1),
        0,
        0,
        0,
        -1,
    );

    for i in 0..d0 {
        for j in 0..d1 {
            for k in 0..d2 {
                let expected = usize::from(
                    i >= 1 && (i - 1) % 3 == 0 && j % 2 == 0 && k >= 4,
                );
                assert_eq!(
                    grid[(i * d1 + j) * d2 + k].load(Ordering::Relaxed),
                    expected,
                    "cell ({i}, {j}, {k})"
                );
            }
        }
    }
}

#[test]
fn single_thread_pool_short_circuits_every_compute() {
    let pool = pool(1);
    let invocations = AtomicUsize::new(0);

    pool.compute_1d(
        |_| {
            invocations.fetch_add(1, Ordering::Relaxed);
        },
        Axis::new(0, 1000, 1),
        0,
        -1,
    );
    pool.compute_2d(
        |_, _| {
            invocations.fetch_add(1, Ordering::Relaxed);
        },
        Axis::new(0, 100, 1),
        Axis::new(0, 100, 1),
        0,
        0,
        -1,
    );
    pool.compute_3d(
        |_, _, _| {
            invocations.fetch_add(1, Ordering::Relaxed);
        },
        Axis::new(0, 10, 1),
        Axis::new(0, 10, 1),
        Axis::new(0, 10, 1),
        0,
        0,
        0,
        -1,
    );

    assert_eq!(invocations.load(Ordering::Relaxed), 3);
}
