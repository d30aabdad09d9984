#![warn(missing_docs)]
//! Hostbench Core - Driver Runtime
//!
//! This crate provides the lifecycle every host benchmark follows:
//! - `Driver` state machine: fetch, unpack, configure, build, run
//! - Sizing heuristics for LINPACK, STREAM and LMbench parameters
//! - Immutable environment construction with idempotent path overrides
//! - Repeated-measurement protocol with a quiesce hook, plus a concurrent variant
//! - Scoped daemon processes released on every exit path
//! - Narrow interfaces to process execution and source acquisition

pub mod acquire;
pub mod daemon;
pub mod driver;
pub mod env;
mod error;
pub mod exec;
pub mod facts;
pub mod measure;
mod result;
pub mod sizing;

pub use acquire::{Fetcher, HttpFetcher, Source, TarUnpacker, Unpacker};
pub use daemon::{DaemonGuard, DaemonSpec};
pub use driver::{
    Benchmark, ConfigStep, Driver, DriverState, FailStage, HostContext, MeasureContext,
    Measurement, Package, RunOptions,
};
pub use env::{Environment, Mode, Override};
pub use error::{AcquireError, DriverError, SizingError};
pub use exec::{Invocation, ProcessOutput, ProcessRunner, RunningProcess, ShellRunner};
pub use facts::{Probe, ProbeChain, SystemFacts, Vendor};
pub use measure::{NoQuiesce, Quiesce, SystemQuiesce};
pub use result::{AggregateSet, ResultRecord, Sample, Unit};

/// Default number of repetitions per benchmark
pub const DEFAULT_REPETITIONS: u32 = 3;

/// Default instance count for the concurrent-load benchmark
pub const DEFAULT_CONCURRENCY: u32 = 100;
