//! Benchmark Executor
//!
//! Runs the suite and collects results.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ┌─────────────┐
//! │  metadata   │  Probe the host into SystemFacts
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │  execution  │  Prerequisites, then every planned benchmark
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  Report with metadata and summary
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Lifecycle driving with per-benchmark failure isolation
//! - [`metadata`] - System facts probing
//! - [`report`] - Report assembly

mod execution;
mod metadata;
mod report;

// Re-export public API
pub use execution::{ExecutionConfig, Executor};
pub use metadata::{
    CacheSizes, CpuInfo, ProbeSources, parse_cache_size, parse_cpuinfo, parse_meminfo,
    probe_facts, read_caches,
};
pub use report::build_report;
