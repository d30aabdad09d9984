//! STREAM memory bandwidth

use crate::{Layout, SuiteOptions};
use hostbench_core::driver::{Benchmark, HostContext, MeasureContext, Measurement, Package};
use hostbench_core::env::Override;
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure;
use hostbench_core::sizing::{needs_medium_code_model, stream_array_size, stream_cache};
use hostbench_core::{DriverError, Sample, Source};
use std::path::PathBuf;

const NTIMES: u32 = 1000;

/// STREAM Triad bandwidth
pub struct Stream {
    layout: Layout,
}

impl Stream {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("stream")
    }
}

/// Compiler command line for a given array size
pub(crate) fn compile_command(mpicc: &str, cflags: &str, elements: u64) -> String {
    let mut command = format!("{mpicc} {cflags}");
    if needs_medium_code_model(elements) {
        command.push_str(" -mcmodel=medium");
    }
    command.push_str(&format!(
        " -fopenmp -D_OPENMP -DSTREAM_ARRAY_SIZE={elements} -DNTIMES={NTIMES} stream.c -o stream"
    ));
    command
}

/// Triad bandwidth in MB/s
pub(crate) fn parse_triad(output: &str) -> Option<f64> {
    output
        .lines()
        .find(|line| line.contains("Triad"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

impl Package for Stream {
    fn id(&self) -> &'static str {
        "stream"
    }

    fn name(&self) -> &'static str {
        "STREAM"
    }

    fn source(&self) -> Source {
        Source::File {
            url: "https://www.cs.virginia.edu/stream/FTP/Code/stream.c".into(),
            dest: self.dir().join("stream.c"),
        }
    }

    fn binary(&self) -> PathBuf {
        self.dir().join("stream")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let cache = stream_cache(host.facts)
            .ok_or_else(|| DriverError::Build("no cache size known to size the arrays".into()))?;
        let elements = stream_array_size(cache.get(), host.facts.sockets_or_one())?;
        tracing::info!(elements, "STREAM array size");

        let mpicc = self.layout.openmpi_build().join("bin/mpicc");
        Ok(vec![Invocation::new(
            compile_command(&mpicc.display().to_string(), &host.cflags(), elements),
            self.dir(),
            host.env_with(&self.layout.mpi_overrides()),
        )])
    }
}

impl Benchmark for Stream {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let mut own = self.layout.mpi_overrides();
        own.push(Override::replace("OMP_NUM_THREADS", cx.host.threads().to_string()));
        own.push(Override::replace("OMP_PROC_BIND", "true"));
        let invocation = Invocation::new("./stream", self.dir(), cx.env(&own));

        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let output = cx.runner.run(&invocation).ok()?;
            cx.save_raw(&format!("stream_run{}.txt", rep + 1), &output.stdout);
            parse_triad(&output.stdout).map(Sample::Scalar)
        })?;
        Ok(Measurement::scalar("MB/s", samples))
    }
}
