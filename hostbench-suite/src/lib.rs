#![warn(missing_docs)]
//! Hostbench Suite
//!
//! Concrete packages plugged into the `hostbench_core` driver:
//! - Benchmarks: LMbench, MLC, OpenSSL, kernel compilation, zlib, HPL,
//!   STREAM, YCSB over Cassandra and MySQL, concurrent Docker builds
//! - Prerequisites: OpenMPI, OpenBLAS and glibc built from source; Intel
//!   MKL or AMD BLIS by CPU vendor; Maven, Cassandra, MySQL and Connector/J
//!   unpacked from binary releases
//!
//! Every package lives under `<root>/src`; templates shipped with the
//! suite live under `<root>/src/provided`.

mod docker;
mod kernel;
mod linpack;
mod lmbench;
mod mlc;
mod openssl;
mod prereq;
mod stream;
mod ycsb;
mod zlib;

pub use docker::Docker;
pub use kernel::KernelCompile;
pub use linpack::Linpack;
pub use lmbench::Lmbench;
pub use mlc::Mlc;
pub use openssl::OpenSsl;
pub use prereq::{Blis, Cassandra, ConnectorJ, Glibc, Maven, Mkl, MySql, OpenBlas, OpenMpi};
pub use stream::Stream;
pub use ycsb::Ycsb;
pub use zlib::Zlib;

use hostbench_core::driver::{Benchmark, Package};
use hostbench_core::env::Override;
use hostbench_core::facts::Vendor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// MKL release matching the default version
pub const DEFAULT_MKL_URL: &str =
    "http://registrationcenter-download.intel.com/akdlm/irc_nas/tec/12070/l_mkl_2018.0.128.tgz";

/// Benchmark identifiers in run order
pub const BENCHMARK_IDS: &[&str] = &[
    "lmbench",
    "mlc",
    "openssl",
    "compilation",
    "zlib",
    "linpack",
    "stream",
    "nosql",
    "sql",
    "docker",
];

/// Directory layout under the working root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Working root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package sources and archives
    pub fn src(&self) -> PathBuf {
        self.root.join("src")
    }

    /// `<src>/<name>`
    pub fn src_join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.src().join(name)
    }

    /// Templates shipped with the suite
    pub fn provided(&self) -> PathBuf {
        self.src_join("provided")
    }

    /// OpenMPI install prefix
    pub fn openmpi_build(&self) -> PathBuf {
        self.src_join("openmpi/build")
    }

    /// Overrides putting the OpenMPI toolchain on `PATH` and its libraries on `LD_LIBRARY_PATH`
    pub fn mpi_overrides(&self) -> Vec<Override> {
        let prefix = self.openmpi_build();
        vec![
            Override::append("PATH", prefix.join("bin").display().to_string()),
            Override::append("LD_LIBRARY_PATH", prefix.join("lib").display().to_string()),
        ]
    }
}

/// Package versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Versions {
    /// High-Performance Linpack
    pub linpack: String,
    /// STREAM (single source file)
    pub stream: String,
    /// LMbench
    pub lmbench: String,
    /// zlib
    pub zlib: String,
    /// OpenSSL
    pub openssl: String,
    /// Linux kernel compiled by the compilation benchmarks
    pub linux: String,
    /// Intel Memory Latency Checker
    pub mlc: String,
    /// YCSB
    pub ycsb: String,
    /// Docker static binaries
    pub docker: String,
    /// OpenMPI
    pub openmpi: String,
    /// OpenBLAS
    pub openblas: String,
    /// Intel MKL
    pub mkl: String,
    /// AMD BLIS
    pub blis: String,
    /// glibc OpenSSL is linked against, when installed under /usr/local/glibc
    pub glibc: String,
    /// MySQL Connector/J
    pub jconnect: String,
    /// Cassandra
    pub cassandra: String,
    /// Maven
    pub maven: String,
    /// MySQL
    pub mysql: String,
    /// glibc flavour of the MySQL binary tarball
    pub mysql_glibc: String,
}

impl Default for Versions {
    fn default() -> Self {
        Self {
            linpack: "2.2".into(),
            stream: "5.10".into(),
            lmbench: "3".into(),
            zlib: "1.2.11".into(),
            openssl: "1.1.0g".into(),
            linux: "4.14.4".into(),
            mlc: "3.4".into(),
            ycsb: "0.12.0".into(),
            docker: "17.09.1".into(),
            openmpi: "3.0.0".into(),
            openblas: "0.2.20".into(),
            mkl: "2018.0.128".into(),
            blis: "0.9-11-Beta".into(),
            glibc: "2.26".into(),
            jconnect: "5.1.44".into(),
            cassandra: "3.11.1".into(),
            maven: "3.5.2".into(),
            mysql: "5.7.20".into(),
            mysql_glibc: "2.12".into(),
        }
    }
}

/// Daemon timing shared by daemon-backed benchmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonTiming {
    /// Maximum wait for the PID file
    pub pid_timeout: Duration,
    /// Pause after startup before clients connect
    pub warmup: Duration,
    /// Wait between termination signals and a forced kill
    pub grace: Duration,
}

impl Default for DaemonTiming {
    fn default() -> Self {
        Self {
            pid_timeout: Duration::from_secs(60),
            warmup: Duration::from_secs(20),
            grace: Duration::from_secs(5),
        }
    }
}

/// Everything needed to construct the suite
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// Directory layout
    pub layout: Layout,
    /// Package versions
    pub versions: Versions,
    /// Architecture tag used in build output paths, e.g. `x86_64`
    pub arch: String,
    /// Download URL for the MLC archive, which is not publicly mirrored
    pub mlc_url: Option<String>,
    /// Download URL for the MKL archive
    pub mkl_url: Option<String>,
    /// Download URL for the BLIS archive, which is not publicly mirrored
    pub blis_url: Option<String>,
    /// Daemon timing
    pub daemons: DaemonTiming,
}

impl SuiteOptions {
    /// Options with default versions and timing
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::new(root),
            versions: Versions::default(),
            arch: std::env::consts::ARCH.to_string(),
            mlc_url: None,
            mkl_url: Some(DEFAULT_MKL_URL.to_string()),
            blis_url: None,
            daemons: DaemonTiming::default(),
        }
    }
}

/// Every benchmark, in run order
pub fn benchmarks(opts: &SuiteOptions) -> Vec<Box<dyn Benchmark>> {
    vec![
        Box::new(Lmbench::new(opts)),
        Box::new(Mlc::new(opts)),
        Box::new(OpenSsl::new(opts)),
        Box::new(KernelCompile::new(opts)),
        Box::new(Zlib::new(opts)),
        Box::new(Linpack::new(opts)),
        Box::new(Stream::new(opts)),
        Box::new(Ycsb::nosql(opts)),
        Box::new(Ycsb::sql(opts)),
        Box::new(Docker::new(opts)),
    ]
}

/// Prerequisites needed by the selected benchmarks, in build order.
///
/// HPL links against MKL on Intel hosts, BLIS on AMD hosts and OpenBLAS
/// everywhere else.
pub fn prerequisites(
    opts: &SuiteOptions,
    selected: &[&str],
    vendor: Option<Vendor>,
) -> Vec<Box<dyn Package>> {
    let wants = |ids: &[&str]| ids.iter().any(|id| selected.contains(id));
    let mut packages: Vec<Box<dyn Package>> = Vec::new();

    if wants(&["linpack", "stream"]) {
        packages.push(Box::new(OpenMpi::new(opts)));
    }
    if wants(&["linpack"]) {
        match vendor {
            Some(Vendor::Intel) => packages.push(Box::new(Mkl::new(opts))),
            Some(Vendor::Amd) => packages.push(Box::new(Blis::new(opts))),
            _ => packages.push(Box::new(OpenBlas::new(opts))),
        }
    }
    if wants(&["openssl"]) {
        packages.push(Box::new(Glibc::new(opts)));
    }
    if wants(&["nosql", "sql"]) {
        packages.push(Box::new(Maven::new(opts)));
    }
    if wants(&["nosql"]) {
        packages.push(Box::new(Cassandra::new(opts)));
    }
    if wants(&["sql"]) {
        packages.push(Box::new(MySql::new(opts)));
        packages.push(Box::new(ConnectorJ::new(opts)));
    }
    packages
}

/// Major version component, e.g. `4` for `4.14.4`
pub(crate) fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Kernel tarball URL for a version
pub(crate) fn kernel_url(version: &str) -> String {
    format!(
        "https://www.kernel.org/pub/linux/kernel/v{}.x/linux-{version}.tar.gz",
        major(version)
    )
}

/// Last line of `output` containing `marker`, split on commas, third field as a number
pub(crate) fn csv_metric(output: &str, marker: &str) -> Option<f64> {
    output
        .lines()
        .rev()
        .find(|line| line.contains(marker))
        .and_then(|line| line.split(',').nth(2))
        .and_then(|field| field.trim().parse().ok())
}
