//! Timed Linux kernel compilation

use crate::{Layout, SuiteOptions, kernel_url};
use hostbench_core::driver::{
    Benchmark, ConfigStep, HostContext, MeasureContext, Measurement, Package,
};
use hostbench_core::env::Override;
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure_prepared;
use hostbench_core::{DriverError, Sample, Source};
use std::path::PathBuf;

/// `make` of a `defconfig` kernel, `make clean` between repetitions
pub struct KernelCompile {
    layout: Layout,
    version: String,
}

impl KernelCompile {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.linux.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("linux")
    }
}

impl Package for KernelCompile {
    fn id(&self) -> &'static str {
        "compilation"
    }

    fn name(&self) -> &'static str {
        "Timed Kernel Compilation"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(kernel_url(&self.version)),
            archive: self.layout.src_join(format!("linux-{}.tar.gz", self.version)),
            extracted: Some(format!("linux-{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn configure(&self, host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        let cores = host.cores();
        Ok(vec![ConfigStep::Command {
            invocation: Invocation::new(
                format!("make -s -j {cores} defconfig && make -s -j {cores} clean"),
                self.dir(),
                host.env_with(&[Override::replace("CFLAGS", host.cflags())]),
            ),
            produces: self.dir().join(".config"),
        }])
    }

    /// The tree is compiled during measurement; a configured tree is ready
    fn binary(&self) -> PathBuf {
        self.dir().join(".config")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

impl Benchmark for KernelCompile {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let cores = cx.host.cores();
        let env = cx.env(&[Override::replace("CFLAGS", cx.host.cflags())]);
        let clean = Invocation::new(format!("make -s -j {cores} clean"), self.dir(), env.clone());
        let compile = Invocation::new(format!("make -s -j {cores}"), self.dir(), env);
        let vmlinux = self.dir().join("vmlinux");

        let samples = measure_prepared(
            cx.repetitions,
            cx.quiesce,
            |_| {
                if let Err(e) = cx.runner.run(&clean) {
                    tracing::warn!("make clean failed: {e}");
                }
            },
            |rep| {
                let elapsed = cx.runner.run_timed(&compile).ok()??;
                if !vmlinux.exists() {
                    tracing::warn!(repetition = rep + 1, "vmlinux missing after compilation");
                    return None;
                }
                cx.save_raw("compilation.txt", &format!("run{}: {elapsed}\n", rep + 1));
                Some(Sample::Scalar(elapsed))
            },
        )?;
        Ok(Measurement::scalar("s", samples))
    }
}
