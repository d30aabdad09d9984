//! Sample Aggregation
//!
//! Computes the canonical aggregates of a benchmark run:
//! - Mean and median require at least one sample
//! - Variance (divisor N-1) requires at least two samples and is absent otherwise
//! - Range is `max - min`, zero for a single sample
//!
//! Vector samples (one value per NUMA node, per cipher operation, ...) are
//! aggregated independently per position. Every sample must have the same
//! arity; a mismatch is reported instead of truncating.

use crate::MIN_VARIANCE_SAMPLES;
use crate::median::median;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aggregation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// No samples were supplied
    #[error("cannot aggregate an empty sample set")]
    Empty,

    /// Vector samples of zero length were supplied
    #[error("cannot aggregate zero-length vector samples")]
    EmptyVector,

    /// A sample is a scalar where the first is a vector, or the reverse
    #[error("sample {index} is a {found}, expected a {expected}")]
    ShapeMismatch {
        /// Index of the offending sample
        index: usize,
        /// Shape of the first sample
        expected: &'static str,
        /// Shape of the offending sample
        found: &'static str,
    },

    /// A vector sample does not match the arity of the first sample
    #[error("sample {index} has {found} values, expected {expected}")]
    ArityMismatch {
        /// Index of the offending sample
        index: usize,
        /// Arity of the first sample
        expected: usize,
        /// Arity of the offending sample
        found: usize,
    },
}

/// Aggregates of one scalar series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    /// Arithmetic mean
    pub mean: f64,
    /// Median (mean of the two middle values for an even count)
    pub median: f64,
    /// Sample variance, `None` for a single sample
    pub variance: Option<f64>,
    /// `max - min`
    pub range: f64,
}

impl Aggregates {
    /// Sample standard deviation, when the variance is defined
    pub fn std_dev(&self) -> Option<f64> {
        self.variance.map(f64::sqrt)
    }

    /// Coefficient of variation in percent
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        let std_dev = self.std_dev()?;
        if self.mean == 0.0 {
            None
        } else {
            Some((std_dev / self.mean) * 100.0)
        }
    }
}

/// Aggregate a scalar sample series
///
/// # Examples
///
/// ```
/// # use hostbench_stats::aggregate;
/// let agg = aggregate(&[2.0, 4.0, 6.0]).unwrap();
/// assert_eq!(agg.mean, 4.0);
/// assert_eq!(agg.median, 4.0);
/// assert_eq!(agg.variance, Some(4.0));
/// assert_eq!(agg.range, 4.0);
/// ```
pub fn aggregate(samples: &[f64]) -> Result<Aggregates, StatsError> {
    let median = median(samples).ok_or(StatsError::Empty)?;

    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n as f64;

    let variance = if n < MIN_VARIANCE_SAMPLES {
        None
    } else {
        Some(samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64)
    };

    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(Aggregates {
        mean,
        median,
        variance,
        range: max - min,
    })
}

/// Aggregate vector samples position by position
///
/// Returns one [`Aggregates`] per vector position, in position order.
pub fn aggregate_vectors<S: AsRef<[f64]>>(samples: &[S]) -> Result<Vec<Aggregates>, StatsError> {
    let first = samples.first().ok_or(StatsError::Empty)?;
    let arity = first.as_ref().len();
    if arity == 0 {
        return Err(StatsError::EmptyVector);
    }

    for (index, sample) in samples.iter().enumerate() {
        let found = sample.as_ref().len();
        if found != arity {
            return Err(StatsError::ArityMismatch {
                index,
                expected: arity,
                found,
            });
        }
    }

    (0..arity)
        .map(|position| {
            let column: Vec<f64> = samples.iter().map(|s| s.as_ref()[position]).collect();
            aggregate(&column)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_sample_has_no_variance() {
        let agg = aggregate(&[5.0]).unwrap();

        assert_eq!(agg.mean, 5.0);
        assert_eq!(agg.median, 5.0);
        assert_eq!(agg.range, 0.0);
        assert_eq!(agg.variance, None);
        assert_eq!(agg.std_dev(), None);
    }

    #[test]
    fn test_three_samples() {
        let agg = aggregate(&[2.0, 4.0, 6.0]).unwrap();

        assert_eq!(agg.mean, 4.0);
        assert_eq!(agg.median, 4.0);
        assert_eq!(agg.variance, Some(4.0));
        assert_eq!(agg.range, 4.0);
        assert_eq!(agg.std_dev(), Some(2.0));
    }

    #[test]
    fn test_empty_is_an_error() {
        assert_eq!(aggregate(&[]), Err(StatsError::Empty));
    }

    #[test]
    fn test_no_outlier_rejection() {
        // 100.0 would be an IQR outlier; it must still drive mean and range
        let agg = aggregate(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]).unwrap();

        assert!((agg.mean - 115.0 / 6.0).abs() < 1e-9);
        assert_eq!(agg.range, 99.0);
        assert_eq!(agg.median, 3.5);
    }

    #[test]
    fn test_coefficient_of_variation() {
        let agg = aggregate(&[100.0, 100.0, 100.0]).unwrap();
        assert_eq!(agg.coefficient_of_variation(), Some(0.0));

        let single = aggregate(&[100.0]).unwrap();
        assert_eq!(single.coefficient_of_variation(), None);
    }

    #[test]
    fn test_vectors_per_position() {
        let samples = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let aggs = aggregate_vectors(&samples).unwrap();

        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs[0].mean, 2.0);
        assert_eq!(aggs[0].variance, Some(1.0));
        assert_eq!(aggs[1].mean, 20.0);
        assert_eq!(aggs[1].range, 20.0);
    }

    #[test]
    fn test_vectors_arity_mismatch() {
        let samples = vec![vec![1.0, 2.0], vec![1.0], vec![1.0, 2.0]];
        assert_eq!(
            aggregate_vectors(&samples),
            Err(StatsError::ArityMismatch {
                index: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_vectors_empty_inputs() {
        let none: Vec<Vec<f64>> = Vec::new();
        assert_eq!(aggregate_vectors(&none), Err(StatsError::Empty));

        let zero_arity = vec![Vec::<f64>::new()];
        assert_eq!(aggregate_vectors(&zero_arity), Err(StatsError::EmptyVector));
    }

    proptest! {
        #[test]
        fn range_and_mean_are_bounded(samples in prop::collection::vec(-1.0e6f64..1.0e6, 1..40)) {
            let agg = aggregate(&samples).unwrap();
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            prop_assert!(agg.range >= 0.0);
            prop_assert!(agg.mean >= min - 1e-6 && agg.mean <= max + 1e-6);
            prop_assert!(agg.median >= min && agg.median <= max);
            prop_assert_eq!(agg.variance.is_some(), samples.len() >= 2);
        }
    }
}
