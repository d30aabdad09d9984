//! System Tuning
//!
//! Opt-in host preparation before a run. Every step is best effort: a step
//! that cannot be applied (not root, knob absent) is logged and skipped.

use hostbench_core::{Environment, Invocation, ProcessRunner};
use std::io;
use std::path::Path;

/// Open file limit applied to this process and its children
pub const NOFILE_LIMIT: u64 = 1_048_576;

/// Outcome of [`apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuningReport {
    /// CPUs switched to the performance governor
    pub governors: usize,
    /// Transparent hugepages disabled
    pub hugepages_off: bool,
    /// Swap disabled
    pub swap_off: bool,
    /// Resource limits raised
    pub limits_raised: bool,
}

/// Set `performance` on every `cpu*/cpufreq/scaling_governor` below `cpu_root`
pub fn performance_governor(cpu_root: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(cpu_root) else {
        return 0;
    };

    let mut set = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let is_cpu = name
            .to_str()
            .and_then(|n| n.strip_prefix("cpu"))
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if !is_cpu {
            continue;
        }
        let governor = entry.path().join("cpufreq/scaling_governor");
        if !governor.exists() {
            continue;
        }
        match std::fs::write(&governor, "performance") {
            Ok(()) => set += 1,
            Err(e) => tracing::debug!(path = %governor.display(), "cannot set governor: {e}"),
        }
    }
    set
}

/// Write `never` to the transparent hugepage knob
pub fn disable_hugepages(knob: &Path) -> bool {
    if !knob.exists() {
        return false;
    }
    match std::fs::write(knob, "never") {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(path = %knob.display(), "cannot disable hugepages: {e}");
            false
        }
    }
}

/// Run `swapoff -a`
pub fn disable_swap(runner: &dyn ProcessRunner, env: &Environment) -> bool {
    let invocation = Invocation::new("swapoff -a", "/", env.clone());
    match runner.run(&invocation) {
        Ok(output) if output.success => true,
        Ok(output) => {
            tracing::debug!(output = %output.stdout, "swapoff failed");
            false
        }
        Err(e) => {
            tracing::debug!("cannot run swapoff: {e}");
            false
        }
    }
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn limit(value: libc::rlim_t) -> libc::rlimit {
    libc::rlimit {
        rlim_cur: value,
        rlim_max: value,
    }
}

/// Unlimited stack and processes, [`NOFILE_LIMIT`] open files
pub fn raise_limits() -> io::Result<()> {
    check(unsafe { libc::setrlimit(libc::RLIMIT_STACK, &limit(libc::RLIM_INFINITY)) })?;
    check(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit(NOFILE_LIMIT as libc::rlim_t)) })?;
    check(unsafe { libc::setrlimit(libc::RLIMIT_NPROC, &limit(libc::RLIM_INFINITY)) })
}

/// Apply every tuning step
pub fn apply(runner: &dyn ProcessRunner, env: &Environment) -> TuningReport {
    let report = TuningReport {
        governors: performance_governor(Path::new("/sys/devices/system/cpu")),
        hugepages_off: disable_hugepages(Path::new("/sys/kernel/mm/transparent_hugepage/enabled")),
        swap_off: disable_swap(runner, env),
        limits_raised: match raise_limits() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("cannot raise resource limits: {e}");
                false
            }
        },
    };
    tracing::info!(?report, "system tuning applied");
    report
}
