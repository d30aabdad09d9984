//! Measurement Protocol
//!
//! Fixed-count sampling: before every repetition the system is quiesced
//! (caches flushed, a settle pause), then one sample is taken. Samples that
//! fail to produce a number are dropped, never replaced with zero. A run in
//! which every repetition failed is a [`DriverError::Measurement`].
//!
//! The concurrent variant launches every instance before collecting any and
//! keeps whatever numeric outputs come back.

use crate::error::DriverError;
use crate::exec::{Invocation, ProcessRunner, RunningProcess};
use crate::result::Sample;
use std::path::PathBuf;
use std::time::Duration;

/// Pre-sample hook reducing interference from earlier activity
pub trait Quiesce: Send + Sync {
    /// Bring the system to a quiet state
    fn quiesce(&self);
}

/// Flush dirty pages, drop the page cache, then pause
#[derive(Debug, Clone)]
pub struct SystemQuiesce {
    /// Pause after flushing
    pub settle: Duration,
    /// Kernel knob written with `3` to drop caches
    pub drop_caches: PathBuf,
}

impl SystemQuiesce {
    /// Quiesce with the given settle pause
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            drop_caches: PathBuf::from("/proc/sys/vm/drop_caches"),
        }
    }
}

impl Default for SystemQuiesce {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Quiesce for SystemQuiesce {
    fn quiesce(&self) {
        unsafe { libc::sync() };
        if self.drop_caches.exists() {
            if let Err(e) = std::fs::write(&self.drop_caches, "3") {
                tracing::debug!(path = %self.drop_caches.display(), "cannot drop caches: {e}");
            }
        }
        std::thread::sleep(self.settle);
    }
}

/// Does nothing; for tests and `--no-quiesce`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQuiesce;

impl Quiesce for NoQuiesce {
    fn quiesce(&self) {}
}

/// Take `repetitions` samples, quiescing before each
pub fn measure(
    repetitions: u32,
    quiesce: &dyn Quiesce,
    sample: impl FnMut(u32) -> Option<Sample>,
) -> Result<Vec<Sample>, DriverError> {
    measure_prepared(repetitions, quiesce, |_| {}, sample)
}

/// Like [`measure`], running `prepare` before the quiesce of each repetition
///
/// `prepare` resets state the sample depends on, e.g. `make clean` before a
/// timed build, so its cost is flushed before timing starts.
pub fn measure_prepared(
    repetitions: u32,
    quiesce: &dyn Quiesce,
    mut prepare: impl FnMut(u32),
    mut sample: impl FnMut(u32) -> Option<Sample>,
) -> Result<Vec<Sample>, DriverError> {
    let mut samples = Vec::with_capacity(repetitions as usize);

    for rep in 0..repetitions {
        prepare(rep);
        quiesce.quiesce();
        match sample(rep) {
            Some(s) if s.is_finite() => {
                tracing::info!(repetition = rep + 1, sample = ?s, "sample");
                samples.push(s);
            }
            Some(s) => tracing::warn!(repetition = rep + 1, sample = ?s, "non-finite sample dropped"),
            None => tracing::warn!(repetition = rep + 1, "no parseable sample, dropped"),
        }
    }

    if samples.is_empty() {
        return Err(DriverError::Measurement(format!(
            "no parseable samples in {repetitions} repetitions"
        )));
    }
    Ok(samples)
}

/// Launch every invocation, then join them all and keep the numeric outputs
///
/// The result may hold fewer samples than invocations.
pub fn measure_concurrent(
    runner: &dyn ProcessRunner,
    invocations: &[Invocation],
    quiesce: &dyn Quiesce,
    parse: impl Fn(&str) -> Option<f64>,
) -> Result<Vec<Sample>, DriverError> {
    quiesce.quiesce();

    let mut running: Vec<Box<dyn RunningProcess>> = Vec::with_capacity(invocations.len());
    for invocation in invocations {
        match runner.spawn(invocation) {
            Ok(process) => running.push(process),
            Err(e) => tracing::warn!(command = %invocation.command, "spawn failed: {e}"),
        }
    }
    tracing::info!(launched = running.len(), requested = invocations.len(), "instances running");

    let mut samples = Vec::with_capacity(running.len());
    for process in running {
        let pid = process.id();
        match process.wait() {
            Ok(output) => match parse(&output.stdout).filter(|x| x.is_finite()) {
                Some(x) => samples.push(Sample::Scalar(x)),
                None => tracing::debug!(pid, output = %output.stdout.trim(), "non-numeric output dropped"),
            },
            Err(e) => tracing::warn!(pid, "wait failed: {e}"),
        }
    }

    if samples.is_empty() {
        return Err(DriverError::Measurement(format!(
            "none of {} concurrent instances produced a number",
            invocations.len()
        )));
    }
    tracing::info!(collected = samples.len(), "concurrent samples");
    Ok(samples)
}

/// Parse the whole trimmed output as a number
pub fn parse_number(output: &str) -> Option<f64> {
    output.trim().parse().ok()
}
