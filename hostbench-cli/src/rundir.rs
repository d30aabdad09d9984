//! Run Bookkeeping
//!
//! Every invocation takes the next persistent run number from
//! `<results>/.hostbench.lock` and writes into its own directory,
//! `<results>/HB.<nnn>.<cpu-slug>/`.

use std::io;
use std::path::{Path, PathBuf};

/// File holding the last run number
pub const LOCK_FILE: &str = ".hostbench.lock";

/// Increment and return the run number stored in `lock`
///
/// A missing or unreadable number starts the count at 1.
pub fn next_run_number(lock: &Path) -> io::Result<u32> {
    let current = match std::fs::read_to_string(lock) {
        Ok(text) => text.trim().parse::<u32>().unwrap_or_else(|_| {
            tracing::warn!(path = %lock.display(), "run number unreadable, restarting at 1");
            0
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e),
    };
    let next = current.saturating_add(1);
    std::fs::write(lock, next.to_string())?;
    Ok(next)
}

/// Directory of one run
#[derive(Debug, Clone)]
pub struct RunDir {
    /// Run number
    pub number: u32,
    /// `HB.<nnn>.<cpu-slug>`
    pub name: String,
    /// Absolute directory
    pub path: PathBuf,
}

impl RunDir {
    /// Allocate the next run number and create its directory
    pub fn create(results: &Path, cpu_slug: &str) -> io::Result<Self> {
        std::fs::create_dir_all(results)?;
        let number = next_run_number(&results.join(LOCK_FILE))?;
        let name = format!("HB.{number:03}.{cpu_slug}");
        let path = results.join(&name);
        std::fs::create_dir_all(&path)?;
        Ok(Self { number, name, path })
    }

    /// Machine-readable results
    pub fn results_json(&self) -> PathBuf {
        self.path.join("results.json")
    }

    /// Human-readable results
    pub fn results_txt(&self) -> PathBuf {
        self.path.join("results.txt")
    }

    /// Debug log
    pub fn debug_log(&self) -> PathBuf {
        self.path.join("debug.log")
    }

    /// Raw benchmark output
    pub fn raw_dir(&self) -> PathBuf {
        self.path.join("raw")
    }
}
