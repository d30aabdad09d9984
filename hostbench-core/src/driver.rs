//! Benchmark Driver
//!
//! One [`Driver`] per benchmark walks the lifecycle
//!
//! ```text
//! Uninitialized -> Fetched -> Unpacked -> Configured -> Built -> Measuring -> Done
//! ```
//!
//! Every step is guarded by an existence check of the artifact it produces,
//! so invoking it again, in this process or after a restart, is a no-op
//! success. A failed step records `Failed(stage)`, which ranks with the
//! preceding state: the step may be retried. Drivers share nothing but the
//! filesystem and can be advanced independently.

use crate::acquire::{Fetcher, Source, Unpacker};
use crate::daemon::{DaemonGuard, DaemonSpec};
use crate::env::{Environment, Override, build as build_env};
use crate::error::{AcquireError, DriverError};
use crate::exec::{Invocation, ProcessOutput, ProcessRunner, RunningProcess};
use crate::facts::SystemFacts;
use crate::measure::Quiesce;
use crate::result::{ResultRecord, Sample, Unit};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Lifecycle stage that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailStage {
    /// `fetch`
    Download,
    /// `unpack`
    Extract,
    /// `configure`
    Configure,
    /// `build`
    Build,
    /// `run`
    Measure,
}

/// Position of a driver in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Nothing done yet
    Uninitialized,
    /// Sources downloaded
    Fetched,
    /// Sources extracted
    Unpacked,
    /// Configuration artifacts written
    Configured,
    /// Binary present
    Built,
    /// Sampling in progress
    Measuring,
    /// Result produced
    Done,
    /// A step failed
    Failed(FailStage),
}

impl DriverState {
    /// Lifecycle rank; a failed stage ranks with the state before it
    pub fn rank(self) -> u8 {
        match self {
            DriverState::Uninitialized | DriverState::Failed(FailStage::Download) => 0,
            DriverState::Fetched | DriverState::Failed(FailStage::Extract) => 1,
            DriverState::Unpacked | DriverState::Failed(FailStage::Configure) => 2,
            DriverState::Configured | DriverState::Failed(FailStage::Build) => 3,
            DriverState::Built | DriverState::Failed(FailStage::Measure) => 4,
            DriverState::Measuring => 5,
            DriverState::Done => 6,
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Uninitialized => write!(f, "uninitialized"),
            DriverState::Fetched => write!(f, "fetched"),
            DriverState::Unpacked => write!(f, "unpacked"),
            DriverState::Configured => write!(f, "configured"),
            DriverState::Built => write!(f, "built"),
            DriverState::Measuring => write!(f, "measuring"),
            DriverState::Done => write!(f, "done"),
            DriverState::Failed(FailStage::Download) => write!(f, "failed(download)"),
            DriverState::Failed(FailStage::Extract) => write!(f, "failed(extract)"),
            DriverState::Failed(FailStage::Configure) => write!(f, "failed(configure)"),
            DriverState::Failed(FailStage::Build) => write!(f, "failed(build)"),
            DriverState::Failed(FailStage::Measure) => write!(f, "failed(measure)"),
        }
    }
}

/// A configuration artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStep {
    /// Write `contents` to `path` unless it already holds exactly that
    File {
        /// Destination
        path: PathBuf,
        /// Expected contents
        contents: String,
    },
    /// Run `invocation` unless `produces` already exists
    Command {
        /// Generator command
        invocation: Invocation,
        /// File the command creates
        produces: PathBuf,
    },
}

/// Host inputs shared by configure, build and run
#[derive(Debug, Clone, Copy)]
pub struct HostContext<'a> {
    /// System facts
    pub facts: &'a SystemFacts,
    /// Base environment every command starts from
    pub env: &'a Environment,
    /// Enable AVX-512 code paths where a package supports them
    pub avx512: bool,
}

impl HostContext<'_> {
    /// Normalised compiler flags
    pub fn cflags(&self) -> String {
        crate::env::normalize_cflags(self.facts.cflags.as_deref())
    }

    /// Physical cores, at least 1
    pub fn cores(&self) -> u32 {
        self.facts.cores_or_one()
    }

    /// Hardware threads, at least 1
    pub fn threads(&self) -> u32 {
        self.facts.threads_or_cores()
    }

    /// Base environment with `overrides` applied
    pub fn env_with(&self, overrides: &[Override]) -> Environment {
        build_env(self.env, overrides)
    }
}

/// Inputs to a benchmark's measurement
pub struct MeasureContext<'a> {
    /// Host inputs
    pub host: HostContext<'a>,
    /// Process runner; every command is recorded
    pub runner: &'a dyn ProcessRunner,
    /// Number of repetitions
    pub repetitions: u32,
    /// Pre-sample hook
    pub quiesce: &'a dyn Quiesce,
    /// Caller overrides applied after the benchmark's own
    pub overrides: &'a [Override],
    /// Instance count for concurrent-load benchmarks
    pub concurrency: u32,
    /// Directory for raw tool output, if kept
    pub raw_dir: Option<&'a Path>,
}

impl MeasureContext<'_> {
    /// Environment: base, then `own`, then caller overrides
    pub fn env(&self, own: &[Override]) -> Environment {
        build_env(&self.host.env_with(own), self.overrides)
    }

    /// Keep a copy of raw tool output next to the results
    pub fn save_raw(&self, name: &str, contents: &str) {
        let Some(dir) = self.raw_dir else {
            return;
        };
        let path = dir.join(name);
        let written = std::fs::create_dir_all(dir).and_then(|_| {
            use std::io::Write;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?
                .write_all(contents.as_bytes())
        });
        if let Err(e) = written {
            tracing::warn!(path = %path.display(), "cannot save raw output: {e}");
        }
    }
}

/// Samples produced by one run
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Unit of every sample, shared or one per vector position
    pub unit: Unit,
    /// Vector position names, empty for scalars
    pub labels: Vec<String>,
    /// Samples in repetition order
    pub samples: Vec<Sample>,
}

impl Measurement {
    /// Scalar measurement
    pub fn scalar(unit: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            unit: Unit::Shared(unit.into()),
            labels: Vec::new(),
            samples,
        }
    }

    /// Vector measurement with named positions
    pub fn vector(unit: impl Into<String>, labels: &[&str], samples: Vec<Sample>) -> Self {
        Self {
            unit: Unit::Shared(unit.into()),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            samples,
        }
    }

    /// Vector measurement whose positions carry their own `(label, unit)`
    pub fn per_position(positions: &[(&str, &str)], samples: Vec<Sample>) -> Self {
        Self {
            unit: Unit::PerPosition(positions.iter().map(|(_, u)| u.to_string()).collect()),
            labels: positions.iter().map(|(l, _)| l.to_string()).collect(),
            samples,
        }
    }
}

/// Something built from source
pub trait Package: Send {
    /// Stable identifier used for exclusion and reports
    fn id(&self) -> &'static str;

    /// Display name
    fn name(&self) -> &'static str;

    /// Where the sources come from
    fn source(&self) -> Source;

    /// Configuration artifacts, derived from host facts
    fn configure(&self, _host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        Ok(Vec::new())
    }

    /// File whose presence means the build is done
    fn binary(&self) -> PathBuf;

    /// Build commands, run in order until one fails
    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError>;

    /// Daemon that must be running while configuration or build commands execute
    fn service(&self, _host: &HostContext<'_>) -> Option<DaemonSpec> {
        None
    }
}

/// A package that can be measured
pub trait Benchmark: Package {
    /// Sample the benchmark
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError>;
}

/// Inputs to [`Driver::run`]
pub struct RunOptions<'a> {
    /// Host inputs
    pub host: HostContext<'a>,
    /// Number of repetitions
    pub repetitions: u32,
    /// Pre-sample hook
    pub quiesce: &'a dyn Quiesce,
    /// Caller environment overrides
    pub overrides: &'a [Override],
    /// Instance count for concurrent-load benchmarks
    pub concurrency: u32,
    /// Directory for raw tool output
    pub raw_dir: Option<&'a Path>,
}

/// Lifecycle state machine for one package or benchmark
pub struct Driver<P: ?Sized + Package = dyn Benchmark> {
    package: Box<P>,
    state: DriverState,
    fetcher: Arc<dyn Fetcher>,
    unpacker: Arc<dyn Unpacker>,
    runner: RecordingRunner,
}

impl<P: ?Sized + Package> Driver<P> {
    /// New driver in the `Uninitialized` state
    pub fn new(
        package: Box<P>,
        fetcher: Arc<dyn Fetcher>,
        unpacker: Arc<dyn Unpacker>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            package,
            state: DriverState::Uninitialized,
            fetcher,
            unpacker,
            runner: RecordingRunner::new(runner),
        }
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The driven package
    pub fn package(&self) -> &P {
        &self.package
    }

    /// Commands executed so far
    pub fn commands(&self) -> Vec<String> {
        self.runner.commands()
    }

    fn require(&self, step: &'static str, rank: u8) -> Result<(), DriverError> {
        if self.state.rank() < rank {
            Err(DriverError::OutOfOrder {
                step,
                state: self.state,
            })
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, to: DriverState) {
        if to.rank() > self.state.rank() {
            tracing::debug!(package = self.package.id(), from = %self.state, to = %to, "state");
            self.state = to;
        }
    }

    fn fail(&mut self, stage: FailStage, err: DriverError) -> DriverError {
        tracing::error!(package = self.package.id(), "{err}");
        self.state = DriverState::Failed(stage);
        err
    }

    /// Download sources unless already present
    pub fn fetch(&mut self) -> Result<(), DriverError> {
        if self.state.rank() >= DriverState::Fetched.rank() {
            return Ok(());
        }

        let source = self.package.source();
        let present = source.fetched_artifact().is_some_and(Path::exists)
            || source.unpacked_artifact().is_some_and(Path::exists);
        if present {
            tracing::debug!(package = self.package.id(), "sources already present");
            self.advance(DriverState::Fetched);
            return Ok(());
        }

        let result = match &source {
            Source::Archive {
                url: Some(url),
                archive,
                ..
            } => self.fetcher.fetch(url, archive),
            Source::Archive {
                url: None,
                archive,
                hint,
                ..
            } => Err(AcquireError::MissingArchive {
                archive: archive.clone(),
                hint: hint
                    .clone()
                    .unwrap_or_else(|| "place the archive there manually".to_string()),
            }),
            Source::File { url, dest } => self.fetcher.fetch(url, dest),
            Source::None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.advance(DriverState::Fetched);
                Ok(())
            }
            Err(e) => Err(self.fail(FailStage::Download, e.into())),
        }
    }

    /// Extract sources unless the target directory exists
    pub fn unpack(&mut self) -> Result<(), DriverError> {
        self.require("unpack", DriverState::Fetched.rank())?;
        if self.state.rank() >= DriverState::Unpacked.rank() {
            return Ok(());
        }

        let source = self.package.source();
        if source.unpacked_artifact().is_none_or(Path::exists) {
            self.advance(DriverState::Unpacked);
            return Ok(());
        }

        let result = match &source {
            Source::Archive {
                archive,
                extracted,
                target,
                ..
            } => self.extract(archive, extracted.as_deref(), target),
            Source::File { .. } | Source::None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.advance(DriverState::Unpacked);
                Ok(())
            }
            Err(e) => Err(self.fail(FailStage::Extract, e.into())),
        }
    }

    fn extract(
        &self,
        archive: &Path,
        extracted: Option<&str>,
        target: &Path,
    ) -> Result<(), AcquireError> {
        let Some(top) = extracted else {
            return self.unpacker.unpack(archive, target);
        };

        let parent = target.parent().unwrap_or(Path::new("."));
        self.unpacker.unpack(archive, parent)?;
        let unpacked = parent.join(top);
        std::fs::rename(&unpacked, target).map_err(|e| AcquireError::Extract {
            archive: archive.to_path_buf(),
            message: format!(
                "cannot rename {} to {}: {e}",
                unpacked.display(),
                target.display()
            ),
        })
    }

    /// Write configuration artifacts that are missing or differ
    pub fn configure(&mut self, host: &HostContext<'_>) -> Result<(), DriverError> {
        self.require("configure", DriverState::Unpacked.rank())?;
        if self.state.rank() >= DriverState::Configured.rank() {
            return Ok(());
        }

        match self.apply_config(host) {
            Ok(()) => {
                self.advance(DriverState::Configured);
                Ok(())
            }
            Err(e) => Err(self.fail(FailStage::Configure, e)),
        }
    }

    fn start_service(&self, host: &HostContext<'_>) -> Result<Option<DaemonGuard>, DriverError> {
        self.package
            .service(host)
            .map(|spec| DaemonGuard::start(&self.runner, &spec))
            .transpose()
    }

    fn apply_config(&self, host: &HostContext<'_>) -> Result<(), DriverError> {
        let mut service: Option<Option<DaemonGuard>> = None;
        for step in self.package.configure(host)? {
            match step {
                ConfigStep::File { path, contents } => {
                    if std::fs::read_to_string(&path).is_ok_and(|current| current == contents) {
                        tracing::debug!(path = %path.display(), "configuration up to date");
                        continue;
                    }
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, contents)?;
                    tracing::info!(path = %path.display(), "configuration written");
                }
                ConfigStep::Command {
                    invocation,
                    produces,
                } => {
                    if produces.exists() {
                        continue;
                    }
                    if service.is_none() {
                        service = Some(self.start_service(host)?);
                    }
                    let output = self.runner.run(&invocation)?;
                    if !output.success || !produces.exists() {
                        return Err(DriverError::Configuration(format!(
                            "`{}` did not produce {}",
                            invocation.command,
                            produces.display()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Build unless the binary exists
    pub fn build(&mut self, host: &HostContext<'_>) -> Result<(), DriverError> {
        self.require("build", DriverState::Configured.rank())?;
        if self.state.rank() >= DriverState::Built.rank() {
            return Ok(());
        }

        let binary = self.package.binary();
        if binary.exists() {
            self.advance(DriverState::Built);
            return Ok(());
        }

        match self.run_build(host, &binary) {
            Ok(()) => {
                tracing::info!(package = self.package.id(), binary = %binary.display(), "built");
                self.advance(DriverState::Built);
                Ok(())
            }
            Err(e) => Err(self.fail(FailStage::Build, e)),
        }
    }

    fn run_build(&self, host: &HostContext<'_>, binary: &Path) -> Result<(), DriverError> {
        let steps = self.package.build(host)?;
        let _service = if steps.is_empty() {
            None
        } else {
            self.start_service(host)?
        };
        for invocation in steps {
            let output = self.runner.run(&invocation)?;
            if !output.success {
                let tail: Vec<&str> = output.stdout.lines().rev().take(20).collect();
                tracing::debug!(command = %invocation.command, "build output tail:\n{}", tail.into_iter().rev().collect::<Vec<_>>().join("\n"));
                return Err(DriverError::Build(format!(
                    "`{}` failed",
                    invocation.command
                )));
            }
        }
        if binary.exists() {
            Ok(())
        } else {
            Err(DriverError::Build(format!(
                "{} could not be found after build",
                binary.display()
            )))
        }
    }

    /// Fetch, unpack, configure and build in order
    pub fn prepare(&mut self, host: &HostContext<'_>) -> Result<(), DriverError> {
        self.fetch()?;
        self.unpack()?;
        self.configure(host)?;
        self.build(host)
    }
}

impl<B: ?Sized + Benchmark> Driver<B> {
    /// Sample the benchmark and aggregate the result
    ///
    /// A missing binary yields an `Error` record and leaves the state alone.
    pub fn run(&mut self, opts: &RunOptions<'_>) -> ResultRecord {
        let binary = self.package.binary();
        if !binary.exists() {
            let message = format!(
                "{} binary {} could not be found",
                self.package.name(),
                binary.display()
            );
            tracing::error!(package = self.package.id(), "{message}");
            return ResultRecord::error(message);
        }

        // A finished driver re-measures without leaving `Done`
        let rerun = self.state == DriverState::Done;
        if !rerun {
            self.state = DriverState::Measuring;
        }
        tracing::info!(package = self.package.id(), repetitions = opts.repetitions, rerun, "measuring");

        let cx = MeasureContext {
            host: opts.host,
            runner: &self.runner,
            repetitions: opts.repetitions,
            quiesce: opts.quiesce,
            overrides: opts.overrides,
            concurrency: opts.concurrency,
            raw_dir: opts.raw_dir,
        };

        let measured = self.package.measure(&cx);
        match measured {
            Ok(m) => {
                let record = ResultRecord::from_samples(m.unit, m.labels, m.samples);
                if let Some(message) = record.error_message() {
                    let err = DriverError::Measurement(message.to_string());
                    self.fail_measure(rerun, err);
                } else {
                    self.state = DriverState::Done;
                }
                record
            }
            Err(e) => {
                let message = e.to_string();
                self.fail_measure(rerun, e);
                ResultRecord::error(message)
            }
        }
    }

    fn fail_measure(&mut self, rerun: bool, err: DriverError) {
        if rerun {
            tracing::error!(package = self.package.id(), "{err}");
        } else {
            self.fail(FailStage::Measure, err);
        }
    }
}

/// Runner wrapper that records every command line
#[derive(Clone)]
struct RecordingRunner {
    inner: Arc<dyn ProcessRunner>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingRunner {
    fn new(inner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            inner,
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, invocation: &Invocation) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(invocation.command.clone());
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        self.record(invocation);
        self.inner.run(invocation)
    }

    fn run_timed(&self, invocation: &Invocation) -> io::Result<Option<f64>> {
        self.record(invocation);
        self.inner.run_timed(invocation)
    }

    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn RunningProcess>> {
        self.record(invocation);
        self.inner.spawn(invocation)
    }
}
