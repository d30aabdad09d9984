#![warn(missing_docs)]
//! # Hostbench
//!
//! Repeatable host performance evaluation driving third-party benchmarks.
//!
//! Hostbench builds and runs established tools on the machine under test
//! and turns their output into comparable numbers:
//! - **Uniform lifecycle**: every benchmark is fetched, unpacked, configured,
//!   built and run by the same resumable state machine
//! - **Sizing heuristics**: LINPACK problem sizes and process grids, STREAM
//!   array sizes and cache-latency lookup derived from the host's facts
//! - **Fixed-count sampling**: caches are dropped and the system settles
//!   before every repetition
//! - **Canonical results**: every benchmark yields `Ok` with mean, median,
//!   variance and range over the raw samples, `Error`, or `Skipped`
//! - **Failure isolation**: one failing benchmark never stops the suite
//!
//! ## Quick Start
//!
//! ```ignore
//! use hostbench::prelude::*;
//!
//! let facts = SystemFacts::new().with_cores(16).with_threads(32).with_memory(64 << 30);
//! let env = Environment::inherit();
//! let host = HostContext { facts: &facts, env: &env, avx512: false };
//!
//! let opts = SuiteOptions::new("/opt/hostbench");
//! for benchmark in hostbench::suite::benchmarks(&opts) {
//!     let mut driver = Driver::new(
//!         benchmark,
//!         Arc::new(HttpFetcher::new()?),
//!         Arc::new(TarUnpacker),
//!         Arc::new(ShellRunner),
//!     );
//!     driver.prepare(&host)?;
//! }
//! ```

// Re-export core types
pub use hostbench_core::{
    AcquireError, AggregateSet, Benchmark, ConfigStep, DaemonGuard, DaemonSpec, Driver,
    DriverError, DriverState, Environment, FailStage, Fetcher, HostContext, HttpFetcher,
    Invocation, MeasureContext, Measurement, Mode, NoQuiesce, Override, Package, ProcessOutput,
    ProcessRunner, Quiesce, ResultRecord, RunOptions, Sample, ShellRunner, SizingError, Source,
    SystemFacts, SystemQuiesce, TarUnpacker, Unpacker, Unit, Vendor,
};

// Re-export modules with free functions
pub use hostbench_core::{measure, sizing};

// Re-export stats
pub use hostbench_stats::{Aggregates, StatsError, aggregate, aggregate_vectors};

// Re-export report
pub use hostbench_report::{
    BenchmarkEntry, OutputFormat, Report, ReportConfig, ReportMeta, ReportSummary,
    format_human_output, generate_json_report,
};

/// Concrete benchmark definitions
pub mod suite {
    pub use hostbench_suite::*;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Benchmark, Driver, Environment, HostContext, HttpFetcher, Override, Package,
        ResultRecord, RunOptions, Sample, ShellRunner, SystemFacts, TarUnpacker,
    };
    pub use hostbench_suite::SuiteOptions;
    pub use std::sync::Arc;
}

/// Run the Hostbench CLI.
///
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     hostbench::run()
/// }
/// ```
pub use hostbench_cli::run;
