//! LMbench memory read latency
//!
//! `lat_mem_rd` walks arrays of growing size; each cache level's latency is
//! the one recorded at the largest size not exceeding that level's capacity.

use crate::{Layout, SuiteOptions};
use hostbench_core::driver::{
    Benchmark, ConfigStep, HostContext, MeasureContext, Measurement, Package,
};
use hostbench_core::env::Override;
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure;
use hostbench_core::sizing::{closest_latency, lmbench_cpu, parse_latency_table};
use hostbench_core::{DriverError, Sample, Source};
use std::path::PathBuf;

const MAX_SIZE_MB: u32 = 512;
const STRIDE: u32 = 1024;

/// Cache latencies for L1d, L2 and L3
pub struct Lmbench {
    layout: Layout,
    version: String,
    arch: String,
}

impl Lmbench {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.lmbench.clone(),
            arch: opts.arch.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("lmbench")
    }
}

/// Latency per cache level, `None` if any level has no sample at or below its size
pub(crate) fn level_latencies(output: &str, levels: &[u64]) -> Option<Vec<f64>> {
    let table = parse_latency_table(output);
    levels
        .iter()
        .map(|&bytes| closest_latency(&table, bytes as f64 / 1024.0 / 1024.0))
        .collect()
}

impl Package for Lmbench {
    fn id(&self) -> &'static str {
        "lmbench"
    }

    fn name(&self) -> &'static str {
        "LMbench"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "http://www.bitmover.com/lmbench/lmbench{}.tar.gz",
                self.version
            )),
            archive: self.layout.src_join(format!("lmbench{}.tar.gz", self.version)),
            extracted: Some(format!("lmbench{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn configure(&self, _host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        // the build scripts fail without a change set file
        Ok(vec![ConfigStep::File {
            path: self.dir().join("SCCS/s.ChangeSet"),
            contents: String::new(),
        }])
    }

    fn binary(&self) -> PathBuf {
        self.dir()
            .join("bin")
            .join(format!("{}-linux-gnu", self.arch))
            .join("lat_mem_rd")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(vec![Invocation::new(
            format!("make -s -j {}", host.cores()),
            self.dir(),
            host.env_with(&[Override::replace("CFLAGS", host.cflags())]),
        )])
    }
}

impl Benchmark for Lmbench {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let facts = cx.host.facts;
        let mut labels = Vec::new();
        let mut levels = Vec::new();
        for (label, size) in [("L1", facts.l1d_bytes), ("L2", facts.l2_bytes), ("L3", facts.l3_bytes)] {
            if let Some(size) = size {
                labels.push(label);
                levels.push(size.get());
            }
        }
        if levels.is_empty() {
            return Err(DriverError::Measurement("no cache sizes known".into()));
        }

        let invocation = Invocation::new(
            format!(
                "taskset -c {} {} {MAX_SIZE_MB} {STRIDE}",
                lmbench_cpu(cx.host.threads()),
                self.binary().display()
            ),
            self.dir(),
            cx.env(&[]),
        );

        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let output = cx.runner.run(&invocation).ok()?;
            cx.save_raw(&format!("lmbench_run{}.txt", rep + 1), &output.stdout);
            level_latencies(&output.stdout, &levels).map(Sample::Vector)
        })?;
        Ok(Measurement::vector("ns", &labels, samples))
    }
}
