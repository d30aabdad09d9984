//! Error taxonomy for the driver lifecycle.

use crate::driver::DriverState;
use hostbench_stats::StatsError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while obtaining benchmark sources
#[derive(Debug, Error)]
pub enum AcquireError {
    /// HTTP download failed
    #[error("download of {url} failed: {message}")]
    Download {
        /// Source URL
        url: String,
        /// Underlying failure
        message: String,
    },

    /// Archive could not be unpacked or renamed into place
    #[error("extraction of {} failed: {message}", .archive.display())]
    Extract {
        /// Archive path
        archive: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// Manually placed archive is missing
    #[error("{} is not present and no download URL is configured; {hint}", .archive.display())]
    MissingArchive {
        /// Expected archive path
        archive: PathBuf,
        /// Where to obtain the archive
        hint: String,
    },

    /// Archive extension not recognised
    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected input to a sizing heuristic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    /// Zero or negative value passed where a positive one is required
    #[error("{name} must be positive")]
    NonPositive {
        /// Parameter name
        name: &'static str,
    },
}

/// Errors raised by a driver step
#[derive(Debug, Error)]
pub enum DriverError {
    /// Download or extraction failed
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),

    /// Config template missing or config artifact could not be produced
    #[error("configuration failed: {0}")]
    Configuration(String),

    /// Build tool failed or the binary is absent afterwards
    #[error("build failed: {0}")]
    Build(String),

    /// No parseable samples obtained
    #[error("measurement failed: {0}")]
    Measurement(String),

    /// Aggregation over the collected samples failed
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] StatsError),

    /// A sizing heuristic rejected its input
    #[error("invalid sizing input: {0}")]
    Sizing(#[from] SizingError),

    /// Step invoked before its predecessor completed
    #[error("cannot {step} from state {state}")]
    OutOfOrder {
        /// Requested step
        step: &'static str,
        /// State the driver was in
        state: DriverState,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
