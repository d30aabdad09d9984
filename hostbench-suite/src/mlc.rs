//! Intel Memory Latency Checker
//!
//! MLC ships as a prebuilt binary that cannot be redistributed; the archive
//! is downloaded from a configured URL or placed under `src/` by hand.

use crate::{Layout, SuiteOptions};
use hostbench_core::driver::{Benchmark, HostContext, MeasureContext, Measurement, Package};
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure;
use hostbench_core::{DriverError, Sample, Source};
use std::path::PathBuf;

const DOWNLOAD_PAGE: &str =
    "https://software.intel.com/en-us/articles/intelr-memory-latency-checker";

/// Idle latency from node 0 to every NUMA node
pub struct Mlc {
    layout: Layout,
    version: String,
    url: Option<String>,
}

impl Mlc {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.mlc.clone(),
            url: opts.mlc_url.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("mlc")
    }
}

/// Latencies on the node 0 row of the latency matrix
pub(crate) fn parse_node_latencies(output: &str) -> Option<Vec<f64>> {
    let row = output
        .lines()
        .find(|line| line.trim_start().starts_with('0'))?;
    let latencies = row
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<Vec<f64>, _>>()
        .ok()?;
    (!latencies.is_empty()).then_some(latencies)
}

impl Package for Mlc {
    fn id(&self) -> &'static str {
        "mlc"
    }

    fn name(&self) -> &'static str {
        "MLC"
    }

    fn source(&self) -> Source {
        let archive = self.layout.src_join(format!("mlc_v{}.tgz", self.version));
        Source::Archive {
            url: self.url.clone(),
            hint: Some(format!(
                "download MLC from {DOWNLOAD_PAGE} and place it at {}",
                archive.display()
            )),
            archive,
            extracted: None,
            target: self.dir(),
        }
    }

    fn binary(&self) -> PathBuf {
        self.dir().join("Linux/mlc_avx512")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

impl Benchmark for Mlc {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let invocation = Invocation::new(
            format!("modprobe msr; {} --latency_matrix", self.binary().display()),
            self.dir(),
            cx.env(&[]),
        );

        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let output = cx.runner.run(&invocation).ok()?;
            cx.save_raw(&format!("mlc_run{}.txt", rep + 1), &output.stdout);
            parse_node_latencies(&output.stdout).map(Sample::Vector)
        })?;

        let nodes: Vec<String> = (0..samples[0].arity()).map(|n| format!("node{n}")).collect();
        let labels: Vec<&str> = nodes.iter().map(String::as_str).collect();
        Ok(Measurement::vector("ns", &labels, samples))
    }
}
