//! Report Data Structures

use chrono::{DateTime, Utc};
use hostbench_core::{ResultRecord, SystemFacts};
use serde::{Deserialize, Serialize};

/// Current report schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Complete run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Run metadata
    pub meta: ReportMeta,
    /// One entry per benchmark, in run order
    pub results: Vec<BenchmarkEntry>,
    /// Status counts
    pub summary: ReportSummary,
}

impl Report {
    /// Report over `results`, with the summary derived from them
    pub fn new(meta: ReportMeta, results: Vec<BenchmarkEntry>) -> Self {
        let summary = ReportSummary::from_entries(&results);
        Self {
            meta,
            results,
            summary,
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Report schema version
    pub schema_version: u32,
    /// hostbench version
    pub version: String,
    /// Run start
    pub timestamp: DateTime<Utc>,
    /// Persistent run number
    pub run_number: Option<u32>,
    /// Host description every benchmark was sized from
    pub system: SystemFacts,
    /// Runner settings
    pub config: ReportConfig,
}

/// Runner settings captured in report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Repetitions per benchmark
    pub repetitions: u32,
    /// Instances for the concurrent-load benchmark
    pub concurrency: u32,
    /// Pause after each quiesce
    pub settle_ms: u64,
    /// Whether caches were dropped before every sample
    pub quiesce: bool,
    /// Normalised compiler flags
    pub cflags: String,
    /// AVX-512 code paths enabled
    pub avx512: bool,
    /// Excluded benchmark ids
    pub excluded: Vec<String>,
}

/// One benchmark in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Outcome
    pub result: ResultRecord,
    /// Commands executed, prerequisites excluded
    pub commands: Vec<String>,
    /// Wall time spent on this benchmark, all lifecycle steps included
    pub duration_ms: f64,
}

/// Report summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Benchmarks in the report
    pub total: usize,
    /// `Ok` records
    pub ok: usize,
    /// `Error` records
    pub error: usize,
    /// `Skipped` records
    pub skipped: usize,
    /// Sum of entry durations
    pub total_duration_ms: f64,
}

impl ReportSummary {
    /// Count statuses over entries
    pub fn from_entries(entries: &[BenchmarkEntry]) -> Self {
        entries.iter().fold(
            ReportSummary {
                total: entries.len(),
                ..Default::default()
            },
            |mut summary, entry| {
                match entry.result {
                    ResultRecord::Ok { .. } => summary.ok += 1,
                    ResultRecord::Error { .. } => summary.error += 1,
                    ResultRecord::Skipped => summary.skipped += 1,
                }
                summary.total_duration_ms += entry.duration_ms;
                summary
            },
        )
    }
}
