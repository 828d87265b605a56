//! Core selection for heterogeneous (big.LITTLE) CPUs.
//!
//! Given the per-core maximum frequencies and a policy, this module decides
//! which logical cores the pool should occupy. Frequency is the only signal:
//! on mobile SoCs the big cluster reports a strictly higher ceiling than the
//! LITTLE cluster, so sorting by frequency separates the clusters without
//! any vendor-specific topology parsing.

/// Which cores the pool binds its threads to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AffinityPolicy {
    /// No pinning; threads float wherever the scheduler puts them.
    None,
    /// Occupy the entire big cluster, however many cores it has.
    BigOnly,
    /// Occupy the entire LITTLE cluster.
    LittleOnly,
    /// Take the `thread_count` fastest cores.
    HighPerformance,
    /// Take the `thread_count` slowest cores.
    PowerSave,
}

#[derive(Copy, Clone, Debug)]
struct CpuFreq {
    core_id: usize,
    freq: f32,
}

/// Selects the cores to pin to under `policy`.
///
/// `thread_count_hint` of 0 means "use all cores"; the hint is clamped to
/// the number of logical cores. Returns an empty set when pinning was not
/// requested or when no frequency data is available (logged as an error).
pub fn cores_to_use(
    cpu_max_freqs: &[f32],
    policy: AffinityPolicy,
    thread_count_hint: usize,
) -> Vec<usize> {
    if cpu_max_freqs.is_empty() {
        log::error!("cpu frequency table is empty; affinity selection disabled");
        return Vec::new();
    }
    if policy == AffinityPolicy::None {
        return Vec::new();
    }

    let cpu_count = cpu_max_freqs.len();
    let thread_count = if thread_count_hint == 0 || thread_count_hint > cpu_count {
        cpu_count
    } else {
        thread_count_hint
    };

    let mut cpu_freqs: Vec<CpuFreq> = cpu_max_freqs
        .iter()
        .enumerate()
        .map(|(core_id, &freq)| CpuFreq { core_id, freq })
        .collect();

    match policy {
        AffinityPolicy::PowerSave | AffinityPolicy::LittleOnly => {
            cpu_freqs.sort_by(|a, b| a.freq.total_cmp(&b.freq));
        }
        AffinityPolicy::HighPerformance | AffinityPolicy::BigOnly => {
            cpu_freqs.sort_by(|a, b| b.freq.total_cmp(&a.freq));
        }
        AffinityPolicy::None => unreachable!(),
    }

    let take = match policy {
        // A cluster is the maximal prefix running at the same ceiling.
        AffinityPolicy::BigOnly | AffinityPolicy::LittleOnly => cpu_freqs
            .iter()
            .take_while(|cpu| cpu.freq == cpu_freqs[0].freq)
            .count(),
        _ => thread_count,
    };
    assert!(take > 0, "core selection produced an empty set");

    cpu_freqs[..take]
        .iter()
        .map(|cpu| {
            log::debug!("selected core {} (max freq {})", cpu.core_id, cpu.freq);
            cpu.core_id
        })
        .collect()
}
