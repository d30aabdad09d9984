//! JSON Output

use crate::report::Report;

/// Generate a prettified JSON report
pub fn generate_json_report(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Parse a report written by [`generate_json_report`]
pub fn parse_json_report(json: &str) -> Result<Report, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn test_status_tags() {
        let json = generate_json_report(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let statuses: Vec<&str> = value["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["result"]["status"].as_str().unwrap())
            .collect();
        assert_eq!(statuses, ["ok", "ok", "error", "skipped"]);
        assert_eq!(value["results"][0]["result"]["aggregates"]["variance"], 4.0);
        assert!(value["results"][1]["result"]["aggregates"][0]["variance"].is_null());
    }

    #[test]
    fn test_reads_back() {
        let report = sample_report();
        let parsed = parse_json_report(&generate_json_report(&report).unwrap()).unwrap();
        assert_eq!(parsed.summary, report.summary);
        assert_eq!(parsed.results[2].result, report.results[2].result);
    }
}
