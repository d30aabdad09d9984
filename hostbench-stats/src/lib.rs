#![warn(missing_docs)]
//! Hostbench Statistical Aggregation
//!
//! Turns the raw samples of one benchmark run into its canonical
//! aggregates:
//! - Mean and median (central tendency)
//! - Sample variance with an N-1 divisor (dispersion, two or more samples)
//! - Range (max - min)
//!
//! Aggregates are always computed over the raw samples. No outlier
//! rejection is applied: a run with one slow repetition reports that
//! repetition's effect on the mean and the range.

mod median;
mod summary;

pub use median::median;
pub use summary::{Aggregates, StatsError, aggregate, aggregate_vectors};

/// Minimum number of samples for which a sample variance is defined
pub const MIN_VARIANCE_SAMPLES: usize = 2;
