//! Samples and Result Records
//!
//! A [`ResultRecord`] is the only thing a benchmark run hands back to its
//! caller. Report writers branch on its three variants.

use hostbench_stats::{Aggregates, StatsError, aggregate, aggregate_vectors};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw measurement from one repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    /// Seconds, bytes/sec, ops/sec, GFLOPS, ...
    Scalar(f64),
    /// Fixed-length vector: one value per NUMA node, per cache level, per operation
    Vector(Vec<f64>),
}

impl Sample {
    /// Number of values in the sample
    pub fn arity(&self) -> usize {
        match self {
            Sample::Scalar(_) => 1,
            Sample::Vector(v) => v.len(),
        }
    }

    /// `"scalar"` or `"vector"`
    pub fn shape(&self) -> &'static str {
        match self {
            Sample::Scalar(_) => "scalar",
            Sample::Vector(_) => "vector",
        }
    }

    /// Whether every value is finite
    pub fn is_finite(&self) -> bool {
        match self {
            Sample::Scalar(x) => x.is_finite(),
            Sample::Vector(v) => v.iter().all(|x| x.is_finite()),
        }
    }
}

impl From<f64> for Sample {
    fn from(x: f64) -> Self {
        Sample::Scalar(x)
    }
}

impl From<Vec<f64>> for Sample {
    fn from(v: Vec<f64>) -> Self {
        Sample::Vector(v)
    }
}

/// Unit of a result
///
/// Vector samples whose positions measure different quantities carry one
/// unit per position; every sample shares the same units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Unit {
    /// One unit for every value
    Shared(String),
    /// One unit per vector position
    PerPosition(Vec<String>),
}

impl Unit {
    /// Unit of the value at `position`
    pub fn at(&self, position: usize) -> Option<&str> {
        match self {
            Unit::Shared(unit) => Some(unit),
            Unit::PerPosition(units) => units.get(position).map(String::as_str),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Shared(unit) => f.write_str(unit),
            Unit::PerPosition(units) => f.write_str(&units.join(", ")),
        }
    }
}

impl From<&str> for Unit {
    fn from(unit: &str) -> Self {
        Unit::Shared(unit.to_string())
    }
}

impl From<String> for Unit {
    fn from(unit: String) -> Self {
        Unit::Shared(unit)
    }
}

/// Aggregates matching the sample shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateSet {
    /// Scalar samples
    Scalar(Aggregates),
    /// Per-position aggregates of vector samples
    Vector(Vec<Aggregates>),
}

impl AggregateSet {
    /// Aggregate a non-empty, uniformly shaped sample sequence
    pub fn from_samples(samples: &[Sample]) -> Result<Self, StatsError> {
        let first = samples.first().ok_or(StatsError::Empty)?;
        let mismatch = samples
            .iter()
            .position(|s| s.shape() != first.shape())
            .map(|index| StatsError::ShapeMismatch {
                index,
                expected: first.shape(),
                found: samples[index].shape(),
            });
        if let Some(err) = mismatch {
            return Err(err);
        }

        match first {
            Sample::Scalar(_) => {
                let values: Vec<f64> = samples
                    .iter()
                    .filter_map(|s| match s {
                        Sample::Scalar(x) => Some(*x),
                        Sample::Vector(_) => None,
                    })
                    .collect();
                aggregate(&values).map(AggregateSet::Scalar)
            }
            Sample::Vector(_) => {
                let vectors: Vec<&[f64]> = samples
                    .iter()
                    .filter_map(|s| match s {
                        Sample::Vector(v) => Some(v.as_slice()),
                        Sample::Scalar(_) => None,
                    })
                    .collect();
                aggregate_vectors(&vectors).map(AggregateSet::Vector)
            }
        }
    }

    /// Means in position order
    pub fn means(&self) -> Vec<f64> {
        match self {
            AggregateSet::Scalar(a) => vec![a.mean],
            AggregateSet::Vector(v) => v.iter().map(|a| a.mean).collect(),
        }
    }
}

/// Outcome of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultRecord {
    /// Measured successfully
    Ok {
        /// Unit shared by every sample
        unit: Unit,
        /// Names of vector positions, empty for scalar samples
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        labels: Vec<String>,
        /// Raw samples in repetition order
        samples: Vec<Sample>,
        /// Aggregates over the raw samples
        aggregates: AggregateSet,
    },
    /// Failed at some lifecycle step
    Error {
        /// Human-readable reason
        message: String,
    },
    /// Excluded by the caller
    Skipped,
}

impl ResultRecord {
    /// Build a record from raw samples
    ///
    /// An empty sample sequence, mismatched shapes, or per-position units
    /// that do not match the vector arity yield [`ResultRecord::Error`].
    pub fn from_samples(unit: impl Into<Unit>, labels: Vec<String>, samples: Vec<Sample>) -> Self {
        let unit = unit.into();
        let aggregates = match AggregateSet::from_samples(&samples) {
            Ok(aggregates) => aggregates,
            Err(e) => return ResultRecord::error(e.to_string()),
        };
        if let Unit::PerPosition(units) = &unit {
            let positions = match &aggregates {
                AggregateSet::Scalar(_) => 1,
                AggregateSet::Vector(v) => v.len(),
            };
            if units.len() != positions {
                return ResultRecord::error(format!(
                    "{} units given for {positions} positions",
                    units.len()
                ));
            }
        }
        ResultRecord::Ok {
            unit,
            labels,
            samples,
            aggregates,
        }
    }

    /// Error record
    pub fn error(message: impl Into<String>) -> Self {
        ResultRecord::Error {
            message: message.into(),
        }
    }

    /// Whether this is an `Ok` record
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultRecord::Ok { .. })
    }

    /// Whether this is an `Error` record
    pub fn is_error(&self) -> bool {
        matches!(self, ResultRecord::Error { .. })
    }

    /// Whether this is a `Skipped` record
    pub fn is_skipped(&self) -> bool {
        matches!(self, ResultRecord::Skipped)
    }

    /// Error message, if any
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResultRecord::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Aggregates, if any
    pub fn aggregates(&self) -> Option<&AggregateSet> {
        match self {
            ResultRecord::Ok { aggregates, .. } => Some(aggregates),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_record() {
        let record = ResultRecord::from_samples(
            "s",
            Vec::new(),
            vec![Sample::Scalar(2.0), Sample::Scalar(4.0), Sample::Scalar(6.0)],
        );

        let Some(AggregateSet::Scalar(agg)) = record.aggregates() else {
            panic!("expected scalar aggregates, got {record:?}");
        };
        assert_eq!(agg.mean, 4.0);
        assert_eq!(agg.variance, Some(4.0));
    }

    #[test]
    fn test_empty_samples_are_an_error() {
        let record = ResultRecord::from_samples("s", Vec::new(), Vec::new());
        assert!(record.is_error());
        assert!(record.aggregates().is_none());
    }

    #[test]
    fn test_vector_record() {
        let record = ResultRecord::from_samples(
            "ns",
            vec!["node0".into(), "node1".into()],
            vec![vec![80.0, 130.0].into(), vec![82.0, 134.0].into()],
        );
        assert_eq!(record.aggregates().map(|a| a.means()), Some(vec![81.0, 132.0]));
    }

    #[test]
    fn test_mixed_shapes_are_an_error() {
        let scalar_first = ResultRecord::from_samples(
            "s",
            Vec::new(),
            vec![Sample::Scalar(1.0), Sample::Vector(vec![1.0, 2.0])],
        );
        assert_eq!(
            scalar_first.error_message(),
            Some("sample 1 is a vector, expected a scalar")
        );

        let vector_first = ResultRecord::from_samples(
            "s",
            Vec::new(),
            vec![Sample::Vector(vec![1.0]), Sample::Scalar(3.0)],
        );
        assert_eq!(
            vector_first.error_message(),
            Some("sample 1 is a scalar, expected a vector")
        );
    }

    #[test]
    fn test_per_position_units() {
        let units = Unit::PerPosition(vec!["ops/sec".into(), "us".into()]);
        let record = ResultRecord::from_samples(
            units.clone(),
            vec!["throughput".into(), "read p95".into()],
            vec![vec![1000.0, 700.0].into(), vec![1200.0, 710.0].into()],
        );
        let ResultRecord::Ok { unit, .. } = &record else {
            panic!("expected Ok, got {record:?}");
        };
        assert_eq!(unit.at(0), Some("ops/sec"));
        assert_eq!(unit.at(1), Some("us"));
        assert_eq!(unit.to_string(), "ops/sec, us");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["unit"], serde_json::json!(["ops/sec", "us"]));
        let back: ResultRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);

        let short = ResultRecord::from_samples(
            Unit::PerPosition(vec!["ops/sec".into()]),
            Vec::new(),
            vec![vec![1000.0, 700.0].into()],
        );
        assert_eq!(short.error_message(), Some("1 units given for 2 positions"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ResultRecord::Skipped).unwrap();
        assert_eq!(json, serde_json::json!({"status": "skipped"}));

        let json = serde_json::to_value(ResultRecord::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "error", "message": "boom"}));

        let record = ResultRecord::from_samples("s", Vec::new(), vec![Sample::Scalar(5.0)]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["samples"], serde_json::json!([5.0]));
        assert_eq!(json["aggregates"]["variance"], serde_json::Value::Null);
    }
}
