//! Configuration loading from hostbench.toml
//!
//! Hostbench configuration can be specified in a `hostbench.toml` file in the
//! working root. The configuration is automatically discovered by walking up
//! from the current directory, or passed explicitly with `--config`.

use hostbench_suite::Versions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up during discovery
pub const CONFIG_FILE: &str = "hostbench.toml";

/// Hostbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostbenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Directory configuration
    #[serde(default)]
    pub paths: PathsConfig,
    /// Compiler configuration
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Package versions
    #[serde(default)]
    pub versions: Versions,
    /// Benchmark selection
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// Runner configuration for benchmark execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Repetitions per benchmark
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    /// Pause after each quiesce (e.g., "10s")
    #[serde(default = "default_settle")]
    pub settle: String,
    /// Containers launched by the concurrent-load benchmark
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Pause after a daemon starts before clients connect
    #[serde(default = "default_daemon_startup")]
    pub daemon_startup: String,
    /// Wait between termination signals sent to a daemon
    #[serde(default = "default_daemon_grace")]
    pub daemon_grace: String,
    /// Drop caches and settle before every sample
    #[serde(default = "default_true")]
    pub quiesce: bool,
    /// Apply system tuning before the run (requires root)
    #[serde(default)]
    pub tune_system: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            settle: default_settle(),
            concurrency: default_concurrency(),
            daemon_startup: default_daemon_startup(),
            daemon_grace: default_daemon_grace(),
            quiesce: true,
            tune_system: false,
        }
    }
}

fn default_repetitions() -> u32 {
    hostbench_core::DEFAULT_REPETITIONS
}
fn default_settle() -> String {
    "10s".to_string()
}
fn default_concurrency() -> u32 {
    hostbench_core::DEFAULT_CONCURRENCY
}
fn default_daemon_startup() -> String {
    "20s".to_string()
}
fn default_daemon_grace() -> String {
    "5s".to_string()
}
fn default_true() -> bool {
    true
}

/// Directory configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Working root holding `src/`; defaults to the current directory
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Results directory; defaults to `~/hostbench_results`
    #[serde(default)]
    pub results: Option<PathBuf>,
}

/// Compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Compiler flags for every build
    #[serde(default = "default_cflags")]
    pub cflags: String,
    /// Enable AVX-512 code paths in LINPACK and OpenBLAS
    #[serde(default)]
    pub avx512: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cflags: default_cflags(),
            avx512: false,
        }
    }
}

fn default_cflags() -> String {
    hostbench_core::env::DEFAULT_CFLAGS.to_string()
}

/// Benchmark selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Benchmark ids never run
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Download URL of the MLC archive
    #[serde(default)]
    pub mlc_url: Option<String>,
    /// Download URL of the MKL archive, replacing the default release
    #[serde(default)]
    pub mkl_url: Option<String>,
    /// Download URL of the AMD BLIS archive
    #[serde(default)]
    pub blis_url: Option<String>,
}

impl HostbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        eprintln!("Warning: ignoring {}: {}", config_path.display(), e);
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        let versions = Versions::default();
        format!(
            r#"# Hostbench Configuration

[runner]
# Repetitions per benchmark
repetitions = 3
# Pause after dropping caches, before every sample
settle = "10s"
# Containers launched by the docker benchmark
concurrency = 100
# Pause after a database or container daemon starts
daemon_startup = "20s"
# Wait between termination signals sent to a daemon
daemon_grace = "5s"
# Drop caches and settle before every sample
quiesce = true
# Performance governor, no hugepages, no swap, raised limits (requires root)
tune_system = false

[paths]
# Working root holding src/ (uncomment to override the current directory)
# root = "/opt/hostbench"
# Results directory (uncomment to override ~/hostbench_results)
# results = "/var/lib/hostbench"

[toolchain]
# Compiler flags for every build; -O3 is added when no -O level is given
cflags = "{cflags}"
# Enable AVX-512 code paths in LINPACK and OpenBLAS
avx512 = false

[suite]
# Benchmark ids to skip: {ids}
exclude = []
# Download URL of the Intel MLC archive (uncomment to enable)
# mlc_url = "https://example.com/mlc_v3.4.tgz"
# Download URL of the AMD BLIS archive (uncomment to enable)
# blis_url = "https://example.com/AMD-BLIS-Linux-0.9-11-Beta.tar.gz"

[versions]
linpack = "{linpack}"
stream = "{stream}"
lmbench = "{lmbench}"
zlib = "{zlib}"
openssl = "{openssl}"
linux = "{linux}"
mlc = "{mlc}"
ycsb = "{ycsb}"
docker = "{docker}"
openmpi = "{openmpi}"
openblas = "{openblas}"
mkl = "{mkl}"
blis = "{blis}"
glibc = "{glibc}"
jconnect = "{jconnect}"
cassandra = "{cassandra}"
maven = "{maven}"
mysql = "{mysql}"
mysql_glibc = "{mysql_glibc}"
"#,
            cflags = hostbench_core::env::DEFAULT_CFLAGS,
            ids = hostbench_suite::BENCHMARK_IDS.join(", "),
            linpack = versions.linpack,
            stream = versions.stream,
            lmbench = versions.lmbench,
            zlib = versions.zlib,
            openssl = versions.openssl,
            linux = versions.linux,
            mlc = versions.mlc,
            ycsb = versions.ycsb,
            docker = versions.docker,
            openmpi = versions.openmpi,
            openblas = versions.openblas,
            mkl = versions.mkl,
            blis = versions.blis,
            glibc = versions.glibc,
            jconnect = versions.jconnect,
            cassandra = versions.cassandra,
            maven = versions.maven,
            mysql = versions.mysql,
            mysql_glibc = versions.mysql_glibc,
        )
    }

    /// Parse duration string (e.g., "10s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let seconds_per_unit = match unit_part.to_lowercase().as_str() {
            "ms" => 0.001,
            "s" | "sec" => 1.0,
            "m" | "min" => 60.0,
            "h" => 3600.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_secs_f64(value * seconds_per_unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostbenchConfig::default();
        assert_eq!(config.runner.repetitions, 3);
        assert_eq!(config.runner.settle, "10s");
        assert_eq!(config.runner.concurrency, 100);
        assert!(config.runner.quiesce);
        assert!(!config.runner.tune_system);
        assert_eq!(config.toolchain.cflags, "-march=native -mtune=native");
        assert!(config.suite.exclude.is_empty());
    }

    #[test]
    fn test_parse_duration() {
        let parse = |s| HostbenchConfig::parse_duration(s).unwrap();
        assert_eq!(parse("10s"), Duration::from_secs(10));
        assert_eq!(parse("500ms"), Duration::from_millis(500));
        assert_eq!(parse("2m"), Duration::from_secs(120));
        assert_eq!(parse("1.5s"), Duration::from_millis(1500));
        assert_eq!(parse("7"), Duration::from_secs(7));
        assert!(HostbenchConfig::parse_duration("").is_err());
        assert!(HostbenchConfig::parse_duration("5 fortnights").is_err());
        assert!(HostbenchConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            repetitions = 5
            settle = "1s"

            [suite]
            exclude = ["docker", "mlc"]

            [versions]
            linux = "4.19.1"
        "#;

        let config: HostbenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runner.repetitions, 5);
        assert_eq!(config.runner.settle, "1s");
        assert_eq!(config.suite.exclude, ["docker", "mlc"]);
        assert_eq!(config.versions.linux, "4.19.1");
        // Defaults should still apply
        assert_eq!(config.versions.zlib, "1.2.11");
        assert_eq!(config.runner.concurrency, 100);
    }

    #[test]
    fn test_math_library_settings() {
        let toml_str = r#"
            [suite]
            blis_url = "https://mirror.example/AMD-BLIS-Linux-1.0.tar.gz"

            [versions]
            blis = "1.0"
        "#;

        let config: HostbenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.suite.blis_url.as_deref(),
            Some("https://mirror.example/AMD-BLIS-Linux-1.0.tar.gz")
        );
        assert_eq!(config.suite.mkl_url, None);
        assert_eq!(config.versions.blis, "1.0");
        assert_eq!(config.versions.mkl, "2018.0.128");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: HostbenchConfig = toml::from_str(&HostbenchConfig::default_toml()).unwrap();
        assert_eq!(config.runner.repetitions, 3);
        assert_eq!(config.versions, Versions::default());
        assert_eq!(config.paths.root, None);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[toolchain]\navx512 = true\n").unwrap();

        let config = HostbenchConfig::load(&path).unwrap();
        assert!(config.toolchain.avx512);
        assert!(HostbenchConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
