//! Human Output
//!
//! Terminal-friendly rendering of a report:
//! - Host facts and runner settings
//! - One block per benchmark with a status icon (✓/✗/⊘)
//! - Mean, median, standard deviation and range per position
//! - Status counts and total wall time

use crate::report::{BenchmarkEntry, Report};
use hostbench_core::{AggregateSet, ResultRecord, Unit};
use hostbench_stats::Aggregates;

/// Format a report for terminal display
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    output.push('\n');
    match report.meta.run_number {
        Some(n) => output.push_str(&format!("Hostbench Results (run {n:03})\n")),
        None => output.push_str("Hostbench Results\n"),
    }
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&report.meta.system.to_string());
    output.push('\n');

    let config = &report.meta.config;
    output.push_str(&format!(
        "Runner:   {} repetitions, quiesce {}, avx512 {}\n",
        config.repetitions,
        if config.quiesce { "on" } else { "off" },
        if config.avx512 { "on" } else { "off" }
    ));
    output.push_str(&"-".repeat(60));
    output.push('\n');

    for entry in &report.results {
        format_entry(&mut output, entry);
    }

    output.push('\n');
    output.push_str(&"-".repeat(60));
    output.push('\n');
    let summary = &report.summary;
    output.push_str(&format!(
        "Summary: {} ok, {} error, {} skipped ({} total) in {:.1}s\n",
        summary.ok,
        summary.error,
        summary.skipped,
        summary.total,
        summary.total_duration_ms / 1000.0
    ));

    output
}

fn format_entry(output: &mut String, entry: &BenchmarkEntry) {
    match &entry.result {
        ResultRecord::Ok {
            unit,
            labels,
            samples,
            aggregates,
        } => {
            output.push_str(&format!(
                "  ✓ {} ({}, {} samples)\n",
                entry.name,
                unit,
                samples.len()
            ));
            match aggregates {
                AggregateSet::Scalar(agg) => {
                    output.push_str(&format!("      {}\n", format_aggregates(agg)));
                }
                AggregateSet::Vector(aggs) => {
                    let labels: Vec<String> = (0..aggs.len())
                        .map(|i| {
                            let label = labels.get(i).cloned().unwrap_or_else(|| format!("#{i}"));
                            match (unit, unit.at(i)) {
                                (Unit::PerPosition(_), Some(u)) => format!("{label} ({u})"),
                                _ => label,
                            }
                        })
                        .collect();
                    let width = labels.iter().map(String::len).max().unwrap_or(0);
                    for (label, agg) in labels.iter().zip(aggs) {
                        output.push_str(&format!(
                            "      {label:<width$}  {}\n",
                            format_aggregates(agg)
                        ));
                    }
                }
            }
        }
        ResultRecord::Error { message } => {
            output.push_str(&format!("  ✗ {}\n", entry.name));
            output.push_str(&format!("      error: {message}\n"));
        }
        ResultRecord::Skipped => {
            output.push_str(&format!("  ⊘ {} (skipped)\n", entry.name));
        }
    }
}

fn format_aggregates(agg: &Aggregates) -> String {
    let std_dev = agg
        .std_dev()
        .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
    format!(
        "mean: {:.2}  median: {:.2}  stddev: {}  range: {:.2}",
        agg.mean, agg.median, std_dev, agg.range
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn test_human_output() {
        let text = format_human_output(&sample_report());

        assert!(text.contains("Hostbench Results (run 007)"));
        assert!(text.contains("✓ STREAM (MB/s, 3 samples)"));
        assert!(text.contains("mean: 4.00  median: 4.00  stddev: 2.00  range: 4.00"));
        assert!(text.contains("compress    mean: 1.00"));
        assert!(text.contains("decompress  mean: 0.50  median: 0.50  stddev: -"));
        assert!(text.contains("error: MLC binary could not be found"));
        assert!(text.contains("⊘ DOCKER (skipped)"));
        assert!(text.contains("Summary: 2 ok, 1 error, 1 skipped (4 total) in 4.0s"));
    }

    #[test]
    fn test_per_position_units() {
        let mut report = sample_report();
        report.results.push(BenchmarkEntry {
            id: "nosql".into(),
            name: "YCSB NoSQL".into(),
            result: ResultRecord::from_samples(
                Unit::PerPosition(vec!["ops/sec".into(), "us".into()]),
                vec!["throughput".into(), "read p95".into()],
                vec![vec![12000.0, 700.0].into(), vec![12400.0, 720.0].into()],
            ),
            commands: Vec::new(),
            duration_ms: 0.0,
        });

        let text = format_human_output(&report);
        assert!(text.contains("✓ YCSB NoSQL (ops/sec, us, 2 samples)"));
        assert!(text.contains("throughput (ops/sec)  mean: 12200.00"));
        assert!(text.contains("read p95 (us)         mean: 710.00"));
    }
}
