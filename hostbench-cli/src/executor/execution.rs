//! Benchmark Execution
//!
//! Drives every benchmark through its lifecycle, one at a time, on the
//! calling thread. Each benchmark needs the whole machine, so there is no
//! parallelism between drivers.
//!
//! ## Data Flow
//!
//! ```text
//! prerequisites (OpenMPI, OpenBLAS, Maven, ...)
//!        │  fetch → unpack → configure → build
//!        ▼
//! ExecutionPlan (registry order, exclusions marked)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │     Executor     │  prepare → run, per benchmark
//! └────────┬─────────┘
//!          │
//!          ▼
//!  BenchmarkEntry (ResultRecord, commands, duration)
//! ```
//!
//! A failure in one benchmark, including a panic, becomes that benchmark's
//! `Error` record; the suite always continues with the next one.

use crate::planner::ExecutionPlan;
use hostbench_core::{
    Benchmark, Driver, Fetcher, HostContext, Override, Package, ProcessRunner, Quiesce,
    ResultRecord, RunOptions, Unpacker,
};
use hostbench_report::BenchmarkEntry;
use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Configuration for benchmark execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Repetitions per benchmark
    pub repetitions: u32,
    /// Instances for the concurrent-load benchmark
    pub concurrency: u32,
    /// Environment overrides applied after every benchmark's own
    pub overrides: Vec<Override>,
    /// Directory receiving raw tool output
    pub raw_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            repetitions: hostbench_core::DEFAULT_REPETITIONS,
            concurrency: hostbench_core::DEFAULT_CONCURRENCY,
            overrides: Vec::new(),
            raw_dir: None,
        }
    }
}

/// Runs prerequisites and benchmarks with failure isolation
pub struct Executor {
    config: ExecutionConfig,
    fetcher: Arc<dyn Fetcher>,
    unpacker: Arc<dyn Unpacker>,
    runner: Arc<dyn ProcessRunner>,
    quiesce: Box<dyn Quiesce>,
    progress: bool,
}

impl Executor {
    /// Executor with the given collaborators
    pub fn new(
        config: ExecutionConfig,
        fetcher: Arc<dyn Fetcher>,
        unpacker: Arc<dyn Unpacker>,
        runner: Arc<dyn ProcessRunner>,
        quiesce: Box<dyn Quiesce>,
    ) -> Self {
        Self {
            config,
            fetcher,
            unpacker,
            runner,
            quiesce,
            progress: true,
        }
    }

    /// Show or hide the progress bar
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// Build prerequisites in order
    ///
    /// Returns the ids of the packages that could not be built. Benchmarks
    /// depending on them still run and report their own failure.
    pub fn prepare_prerequisites(
        &self,
        host: &HostContext<'_>,
        packages: Vec<Box<dyn Package>>,
    ) -> Vec<&'static str> {
        let pb = self.progress_bar(packages.len());
        let mut failed = Vec::new();

        for package in packages {
            let id = package.id();
            pb.set_message(format!("prerequisite {}", package.name()));
            let mut driver: Driver<dyn Package> = Driver::new(
                package,
                self.fetcher.clone(),
                self.unpacker.clone(),
                self.runner.clone(),
            );
            let outcome = catch_unwind(AssertUnwindSafe(|| driver.prepare(host)));
            match outcome {
                Ok(Ok(())) => tracing::info!(package = id, "prerequisite ready"),
                Ok(Err(e)) => {
                    tracing::warn!(package = id, "prerequisite failed: {e}");
                    failed.push(id);
                }
                Err(panic) => {
                    tracing::error!(package = id, "prerequisite panicked: {}", panic_message(&panic));
                    failed.push(id);
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        failed
    }

    /// Execute every planned benchmark, in plan order
    pub fn execute(&self, host: &HostContext<'_>, plan: ExecutionPlan) -> Vec<BenchmarkEntry> {
        let pb = self.progress_bar(plan.selected_count());
        let mut entries = Vec::with_capacity(plan.benchmarks.len());

        for planned in plan.benchmarks {
            if planned.skip {
                tracing::info!(benchmark = planned.benchmark.id(), "excluded");
                entries.push(BenchmarkEntry {
                    id: planned.benchmark.id().to_string(),
                    name: planned.benchmark.name().to_string(),
                    result: ResultRecord::Skipped,
                    commands: Vec::new(),
                    duration_ms: 0.0,
                });
                continue;
            }

            pb.set_message(planned.benchmark.name());
            let entry = self.execute_single(host, planned.benchmark);
            pb.println(format!("{}: {}", entry.name, status_word(&entry.result)));
            entries.push(entry);
            pb.inc(1);
        }

        pb.finish_with_message("Complete");
        entries
    }

    /// Execute a single benchmark
    fn execute_single(&self, host: &HostContext<'_>, benchmark: Box<dyn Benchmark>) -> BenchmarkEntry {
        let start = Instant::now();
        let id = benchmark.id();
        let name = benchmark.name();
        tracing::info!(benchmark = id, "starting");

        let mut driver = Driver::new(
            benchmark,
            self.fetcher.clone(),
            self.unpacker.clone(),
            self.runner.clone(),
        );
        let opts = RunOptions {
            host: *host,
            repetitions: self.config.repetitions,
            quiesce: self.quiesce.as_ref(),
            overrides: &self.config.overrides,
            concurrency: self.config.concurrency,
            raw_dir: self.config.raw_dir.as_deref(),
        };

        // Run with panic catching
        let outcome = catch_unwind(AssertUnwindSafe(|| match driver.prepare(host) {
            Ok(()) => driver.run(&opts),
            Err(e) => ResultRecord::error(e.to_string()),
        }));
        let result = outcome.unwrap_or_else(|panic| {
            let message = format!("{name} panicked: {}", panic_message(&panic));
            tracing::error!(benchmark = id, "{message}");
            ResultRecord::error(message)
        });

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Some(message) = result.error_message() {
            tracing::warn!(benchmark = id, state = %driver.state(), "{message}");
        }

        BenchmarkEntry {
            id: id.to_string(),
            name: name.to_string(),
            result,
            commands: driver.commands(),
            duration_ms,
        }
    }
}

fn status_word(result: &ResultRecord) -> &'static str {
    match result {
        ResultRecord::Ok { .. } => "ok",
        ResultRecord::Error { .. } => "error",
        ResultRecord::Skipped => "skipped",
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::build_plan;
    use hostbench_core::{
        AcquireError, DriverError, Environment, Invocation, MeasureContext, Measurement, NoQuiesce,
        ProcessOutput, RunningProcess, Sample, Source, SystemFacts,
    };
    use std::io;
    use std::path::Path;

    struct NoFetch;

    impl Fetcher for NoFetch {
        fn fetch(&self, url: &str, _dest: &Path) -> Result<(), AcquireError> {
            panic!("unexpected download of {url}");
        }
    }

    impl Unpacker for NoFetch {
        fn unpack(&self, archive: &Path, _into: &Path) -> Result<(), AcquireError> {
            panic!("unexpected extraction of {}", archive.display());
        }
    }

    /// Every command succeeds without doing anything
    struct NoopRunner;

    impl ProcessRunner for NoopRunner {
        fn run(&self, _invocation: &Invocation) -> io::Result<ProcessOutput> {
            Ok(ProcessOutput {
                stdout: String::new(),
                success: true,
            })
        }

        fn spawn(&self, _invocation: &Invocation) -> io::Result<Box<dyn RunningProcess>> {
            Err(io::Error::other("not supported"))
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Samples,
        NoBinary,
        Panics,
    }

    struct Fake {
        id: &'static str,
        binary: PathBuf,
        behaviour: Behaviour,
    }

    impl Package for Fake {
        fn id(&self) -> &'static str {
            self.id
        }
        fn name(&self) -> &'static str {
            self.id
        }
        fn source(&self) -> Source {
            Source::None
        }
        fn binary(&self) -> PathBuf {
            self.binary.clone()
        }
        fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
            Ok(vec![Invocation::new("make", "/", host.env.clone())])
        }
    }

    impl Benchmark for Fake {
        fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
            match self.behaviour {
                Behaviour::Panics => panic!("parser blew up"),
                _ => {
                    let samples = (0..cx.repetitions).map(|i| Sample::Scalar(f64::from(i + 1)));
                    Ok(Measurement::scalar("s", samples.collect()))
                }
            }
        }
    }

    fn executor() -> Executor {
        let fetch = Arc::new(NoFetch);
        Executor::new(
            ExecutionConfig::default(),
            fetch.clone(),
            fetch,
            Arc::new(NoopRunner),
            Box::new(NoQuiesce),
        )
        .with_progress(false)
    }

    #[test]
    fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        std::fs::write(&present, b"").unwrap();

        let fake = |id, behaviour| -> Box<dyn Benchmark> {
            let binary = match behaviour {
                Behaviour::NoBinary => dir.path().join("never-built"),
                _ => present.clone(),
            };
            Box::new(Fake {
                id,
                binary,
                behaviour,
            })
        };
        let registry = vec![
            fake("broken", Behaviour::NoBinary),
            fake("crashy", Behaviour::Panics),
            fake("excluded", Behaviour::Samples),
            fake("fine", Behaviour::Samples),
        ];
        let plan = build_plan(registry, &["excluded".to_string()]);

        let facts = SystemFacts::new().with_cores(2);
        let env = Environment::new();
        let host = HostContext {
            facts: &facts,
            env: &env,
            avx512: false,
        };
        let entries = executor().execute(&host, plan);

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["broken", "crashy", "excluded", "fine"]);

        let broken = entries[0].result.error_message().unwrap();
        assert!(broken.contains("could not be found"), "{broken}");
        assert_eq!(entries[0].commands, ["make"]);

        let crashy = entries[1].result.error_message().unwrap();
        assert!(crashy.contains("parser blew up"), "{crashy}");

        assert!(entries[2].result.is_skipped());
        assert!(entries[2].commands.is_empty());

        let aggregates = entries[3].result.aggregates().unwrap();
        assert_eq!(aggregates.means(), [2.0]);
        // Binary already present: nothing was built
        assert!(entries[3].commands.is_empty());
    }

    #[test]
    fn test_prerequisite_failures_reported() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("lib.so");
        std::fs::write(&present, b"").unwrap();

        let packages: Vec<Box<dyn Package>> = vec![
            Box::new(Fake {
                id: "openmpi",
                binary: dir.path().join("mpicc"),
                behaviour: Behaviour::NoBinary,
            }),
            Box::new(Fake {
                id: "openblas",
                binary: present,
                behaviour: Behaviour::Samples,
            }),
        ];

        let facts = SystemFacts::new();
        let env = Environment::new();
        let host = HostContext {
            facts: &facts,
            env: &env,
            avx512: false,
        };
        assert_eq!(executor().prepare_prerequisites(&host, packages), ["openmpi"]);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&boxed), "unknown panic");
    }
}
