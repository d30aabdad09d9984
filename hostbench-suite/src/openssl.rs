//! OpenSSL AES-GCM throughput
//!
//! `openssl speed -multi` runs on every CPU but the first core, once per
//! cipher and direction. Scores are the 8192-byte block column, reported by
//! OpenSSL in thousands of bytes per second.

use crate::prereq::{GLIBC_PREFIX, glibc_loader};
use crate::{Layout, SuiteOptions};
use hostbench_core::driver::{Benchmark, HostContext, MeasureContext, Measurement, Package};
use hostbench_core::env::Override;
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure;
use hostbench_core::sizing::{multi_count, taskset_ids};
use hostbench_core::{DriverError, Sample, Source};
use std::path::{Path, PathBuf};

const CIPHERS: [&str; 2] = ["aes-128-gcm", "aes-256-gcm"];
const LABELS: [&str; 4] = [
    "aes-128-gcm encrypt",
    "aes-128-gcm decrypt",
    "aes-256-gcm encrypt",
    "aes-256-gcm decrypt",
];
const SIBLINGS: &str = "/sys/devices/system/cpu/cpu1/topology/thread_siblings_list";

/// OpenSSL `speed` for AES-GCM
pub struct OpenSsl {
    layout: Layout,
    version: String,
    glibc: String,
}

impl OpenSsl {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.openssl.clone(),
            glibc: opts.versions.glibc.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("openssl")
    }
}

/// `./config` line, linking against a private glibc when one is installed
pub(crate) fn config_command(dir: &Path, glibc_loader: Option<&Path>) -> String {
    let dir = dir.display();
    match glibc_loader {
        Some(loader) => format!(
            "./config -Wl,--rpath={GLIBC_PREFIX}/lib -Wl,--dynamic-linker={} -Wl,-rpath,{dir} --prefix={dir}/build",
            loader.display()
        ),
        None => format!("./config -Wl,-rpath,{dir} --prefix={dir}/build"),
    }
}

/// Bytes per second from the last line of `speed` output
pub(crate) fn parse_score(output: &str) -> Option<f64> {
    let word = output.trim_end().lines().last()?.split_whitespace().nth(6)?;
    let value: f64 = if word.contains('k') {
        word.chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect::<String>()
            .parse()
            .ok()?
    } else {
        word.parse().ok()?
    };
    Some(value * 1000.0)
}

impl Package for OpenSsl {
    fn id(&self) -> &'static str {
        "openssl"
    }

    fn name(&self) -> &'static str {
        "OpenSSL"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://www.openssl.org/source/openssl-{}.tar.gz",
                self.version
            )),
            archive: self.layout.src_join(format!("openssl-{}.tar.gz", self.version)),
            extracted: Some(format!("openssl-{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.dir().join("apps/openssl")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let dir = self.dir();
        let loader = glibc_loader(&self.glibc);
        let loader = loader.exists().then_some(loader);
        if loader.is_none() {
            tracing::info!(glibc = %self.glibc, "private glibc not installed, linking against the system one");
        }

        let env = host.env_with(&[Override::replace("CFLAGS", host.cflags())]);
        let cores = host.cores();
        Ok(vec![
            Invocation::new("mkdir -p build", &dir, env.clone()),
            Invocation::new(config_command(&dir, loader.as_deref()), &dir, env.clone()),
            Invocation::new(format!("make -s -j {cores}"), &dir, env.clone()),
            Invocation::new(format!("make -s -j {cores} install"), &dir, env),
        ])
    }
}

impl Benchmark for OpenSsl {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let threads = cx.host.threads();
        let siblings = std::fs::read_to_string(SIBLINGS).ok();
        let cpus = taskset_ids(siblings.as_deref(), threads)?;
        let processes = multi_count(&cpus, threads);
        tracing::info!(cpus = %cpus, processes, "OpenSSL CPU set");

        let env = cx.env(&[Override::append(
            "LD_LIBRARY_PATH",
            self.dir().display().to_string(),
        )]);
        let invocations: Vec<Invocation> = CIPHERS
            .iter()
            .flat_map(|cipher| {
                let base = format!(
                    "taskset -c {cpus} {} speed -multi {processes} -evp {cipher}",
                    self.binary().display()
                );
                [base.clone(), format!("{base} -decrypt")]
            })
            .map(|command| Invocation::new(command, self.dir(), env.clone()))
            .collect();

        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let mut scores = Vec::with_capacity(invocations.len());
            for (i, invocation) in invocations.iter().enumerate() {
                if i > 0 {
                    cx.quiesce.quiesce();
                }
                let output = cx.runner.run(invocation).ok()?;
                cx.save_raw(
                    &format!("openssl_{}_run{}.txt", LABELS[i].replace(' ', "_"), rep + 1),
                    &output.stdout,
                );
                scores.push(parse_score(&output.stdout)?);
            }
            Some(Sample::Vector(scores))
        })?;
        Ok(Measurement::vector("B/s", &LABELS, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score() {
        let output = "\
The 'numbers' are in 1000s of bytes per second processed.
type             16 bytes     64 bytes    256 bytes   1024 bytes   8192 bytes
evp aes-128-gcm  401234.56k  1102345.67k  2301234.56k  3401234.56k  3801234.50k
";
        assert_eq!(parse_score(output), Some(3_801_234_500.0));
        assert_eq!(parse_score("short line\n"), None);
    }

    #[test]
    fn test_config_command() {
        let dir = Path::new("/r/src/openssl");
        assert_eq!(
            config_command(dir, None),
            "./config -Wl,-rpath,/r/src/openssl --prefix=/r/src/openssl/build"
        );
        let loader = Path::new("/usr/local/glibc/lib/ld-2.26.so");
        assert!(config_command(dir, Some(loader)).contains("-Wl,--dynamic-linker=/usr/local/glibc/lib/ld-2.26.so"));
    }
}
