//! Platform layer: per-core max frequencies and thread-to-core binding.
//!
//! This is the only module that talks to the OS. The pool consumes exactly
//! two operations from it and treats every failure as environmental: logged
//! by the caller, never fatal.

use std::io;
use thiserror::Error;

/// Errors surfaced by the platform layer. All of them are recoverable from
/// the pool's point of view; it simply runs unpinned.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no per-core cpu frequency information available")]
    NoFrequencyInfo,
    #[error("binding thread affinity is not supported on this platform")]
    AffinityUnsupported,
    #[error("sched_setaffinity failed: {0}")]
    AffinityBind(#[source] io::Error),
}

/// Returns the maximum frequency of every logical core, index-aligned with
/// the OS core numbering.
///
/// On Linux and Android this reads the cpufreq sysfs entries, which report
/// the true per-core ceiling and therefore distinguish big from LITTLE
/// clusters. When cpufreq is unavailable (containers, exotic kernels, other
/// operating systems) the current frequencies reported by `sysinfo` are used
/// instead; those still order clusters correctly in practice.
pub fn query_cpu_max_frequencies() -> Result<Vec<f32>, PlatformError> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    if let Some(freqs) = cpufreq_max_frequencies() {
        return Ok(freqs);
    }
    sysinfo_frequencies()
}

/// Binds the calling thread to the given set of logical cores.
///
/// An empty set is a no-op. On Linux and Android the whole set is installed
/// with `sched_setaffinity`, letting the kernel migrate the thread freely
/// within the set. Other platforms fall back to pinning to the first core of
/// the set, the closest available approximation.
pub fn bind_current_thread_to_cores(cores: &[usize]) -> Result<(), PlatformError> {
    if cores.is_empty() {
        return Ok(());
    }
    bind_impl(cores)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn cpufreq_max_frequencies() -> Option<Vec<f32>> {
    let cpu_count = num_cpus::get();
    let mut freqs = Vec::with_capacity(cpu_count);
    for cpu in 0..cpu_count {
        let path = format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/cpuinfo_max_freq");
        let raw = std::fs::read_to_string(&path).ok()?;
        let khz: f32 = raw.trim().parse().ok()?;
        freqs.push(khz);
    }
    if freqs.is_empty() {
        None
    } else {
        Some(freqs)
    }
}

fn sysinfo_frequencies() -> Result<Vec<f32>, PlatformError> {
    use sysinfo::{CpuRefreshKind, System};

    let mut system = System::new();
    system.refresh_cpu_specifics(CpuRefreshKind::everything());
    let freqs: Vec<f32> = system.cpus().iter().map(|cpu| cpu.frequency() as f32).collect();
    if freqs.is_empty() {
        return Err(PlatformError::NoFrequencyInfo);
    }
    Ok(freqs)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_impl(cores: &[usize]) -> Result<(), PlatformError> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        let mut installed = 0;
        for &core in cores {
            if core < libc::CPU_SETSIZE as usize {
                libc::CPU_SET(core, &mut set);
                installed += 1;
            }
        }
        if installed == 0 {
            return Err(PlatformError::AffinityUnsupported);
        }
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(PlatformError::AffinityBind(io::Error::last_os_error()));
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_impl(cores: &[usize]) -> Result<(), PlatformError> {
    let core = core_affinity::CoreId { id: cores[0] };
    if core_affinity::set_for_current(core) {
        Ok(())
    } else {
        Err(PlatformError::AffinityUnsupported)
    }
}
