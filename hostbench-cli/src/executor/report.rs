//! Report Building
//!
//! Wraps the benchmark entries of one run with its metadata.

use chrono::{DateTime, Utc};
use hostbench_core::SystemFacts;
use hostbench_report::{BenchmarkEntry, Report, ReportConfig, ReportMeta, SCHEMA_VERSION};

/// Build a complete Report from execution results
pub fn build_report(
    entries: Vec<BenchmarkEntry>,
    system: SystemFacts,
    config: ReportConfig,
    started: DateTime<Utc>,
    run_number: Option<u32>,
) -> Report {
    let meta = ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: started,
        run_number,
        system,
        config,
    };
    Report::new(meta, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbench_core::ResultRecord;

    #[test]
    fn test_build_report() {
        let entries = vec![
            BenchmarkEntry {
                id: "zlib".into(),
                name: "zlib".into(),
                result: ResultRecord::error("corpus missing"),
                commands: Vec::new(),
                duration_ms: 12.5,
            },
            BenchmarkEntry {
                id: "docker".into(),
                name: "Docker".into(),
                result: ResultRecord::Skipped,
                commands: Vec::new(),
                duration_ms: 0.0,
            },
        ];
        let config = ReportConfig {
            repetitions: 3,
            concurrency: 100,
            settle_ms: 0,
            quiesce: false,
            cflags: "-O3".into(),
            avx512: false,
            excluded: vec!["docker".into()],
        };

        let report = build_report(entries, SystemFacts::new(), config, Utc::now(), Some(4));
        assert_eq!(report.meta.schema_version, SCHEMA_VERSION);
        assert_eq!(report.meta.run_number, Some(4));
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.error, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.total_duration_ms, 12.5);
    }
}
