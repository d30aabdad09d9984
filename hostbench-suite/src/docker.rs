//! Concurrent kernel compilation in Docker containers
//!
//! An image that compiles a `defconfig` kernel on start is built once with
//! `dockerd` running. Measurement launches every container before joining
//! any, and each container prints its own compile time.

use crate::{DaemonTiming, Layout, SuiteOptions, kernel_url};
use hostbench_core::daemon::{DaemonGuard, DaemonSpec};
use hostbench_core::driver::{
    Benchmark, ConfigStep, HostContext, MeasureContext, Measurement, Package,
};
use hostbench_core::env::{Environment, Override};
use hostbench_core::exec::Invocation;
use hostbench_core::measure::{measure_concurrent, parse_number};
use hostbench_core::{DriverError, Sample, Source};
use std::path::PathBuf;

const IMAGE: &str = "compile_kernel";
const ULIMIT: &str = "--ulimit nofile=1048576:1048576";

const DOCKERFILE: &str = r#"FROM ubuntu:16.04

ARG url
ARG version
ARG cores=1
ARG cflags="-march=native -mtune=native -O3"

RUN apt-get update && apt-get install -y bc build-essential libelf-dev libssl-dev wget
RUN wget -q "${url}" -O /linux.tar.gz \
    && tar -xzf /linux.tar.gz -C / \
    && mv "/linux-${version}" /linux \
    && rm /linux.tar.gz

WORKDIR /linux
RUN make -s -j "${cores}" defconfig && make -s -j "${cores}" clean

ENV cores=${cores} cflags=${cflags}
CMD ["/bin/bash", "-c", "start=$(date +%s.%N); CFLAGS=\"${cflags}\" make -s -j \"${cores}\" > /dev/null 2>&1; end=$(date +%s.%N); echo \"${end} - ${start}\" | bc"]
"#;

/// Many simultaneous containerised kernel builds
pub struct Docker {
    layout: Layout,
    version: String,
    linux: String,
    daemons: DaemonTiming,
}

impl Docker {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.docker.clone(),
            linux: opts.versions.linux.clone(),
            daemons: opts.daemons,
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("docker")
    }

    fn path_override(&self) -> Override {
        Override::prepend("PATH", self.dir().display().to_string())
    }

    fn daemon(&self, env: Environment) -> DaemonSpec {
        let dir = self.dir();
        DaemonSpec {
            name: "dockerd".into(),
            start: Invocation::new(
                format!(
                    "{}/dockerd --pidfile /tmp/docker.pid --data-root {}",
                    dir.display(),
                    dir.join("data").display()
                ),
                &dir,
                env,
            ),
            pid_file: PathBuf::from("/tmp/docker.pid"),
            log: dir.join("hostbench-daemon.log"),
            startup_timeout: self.daemons.pid_timeout,
            warmup: self.daemons.warmup,
            grace: self.daemons.grace,
        }
    }

    fn containers(&self, cores: u32, cflags: &str, count: u32, env: &Environment) -> Vec<Invocation> {
        (0..count)
            .map(|n| {
                Invocation::new(
                    format!(
                        "docker run {ULIMIT} -e \"cores={cores}\" -e \"cflags={cflags}\" --name {IMAGE}_test{n} {IMAGE}"
                    ),
                    self.dir(),
                    env.clone(),
                )
            })
            .collect()
    }
}

/// Remove every container, stopping running ones first when `stop` is set
fn remove_containers(stop: bool) -> String {
    let stop = if stop { "docker stop $ids > /dev/null; " } else { "" };
    format!("ids=$(docker ps -a -q); [ -z \"$ids\" ] || {{ {stop}docker rm $ids > /dev/null; }}")
}

impl Package for Docker {
    fn id(&self) -> &'static str {
        "docker"
    }

    fn name(&self) -> &'static str {
        "Docker"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://download.docker.com/linux/static/stable/x86_64/docker-{}-ce.tgz",
                self.version
            )),
            archive: self.layout.src_join(format!("docker-{}-ce.tgz", self.version)),
            extracted: Some("docker".into()),
            target: self.dir(),
            hint: None,
        }
    }

    fn configure(&self, _host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        Ok(vec![ConfigStep::File {
            path: self.dir().join("Dockerfile"),
            contents: DOCKERFILE.to_string(),
        }])
    }

    /// Marker written once the image is known to the daemon
    fn binary(&self) -> PathBuf {
        self.dir().join(format!(".{IMAGE}.image"))
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let dir = self.dir();
        let cflags = host.cflags();
        let env = host.env_with(&[
            self.path_override(),
            Override::replace("CFLAGS", cflags.clone()),
        ]);
        let build = format!(
            "docker build --build-arg cores={} --build-arg cflags=\"{cflags}\" {ULIMIT} --build-arg url={} --build-arg version={} -t {IMAGE} {}",
            host.cores(),
            kernel_url(&self.linux),
            self.linux,
            dir.display()
        );
        Ok(vec![
            // containers need more addresses than the default bridge offers
            Invocation::new(
                "if command -v ifconfig > /dev/null; then ifconfig docker0 down && ifconfig docker0 172.17.0.1/16 up; fi",
                &dir,
                env.clone(),
            ),
            Invocation::new(
                format!("docker images | grep -q {IMAGE} || {build}"),
                &dir,
                env.clone(),
            ),
            Invocation::new(
                format!("docker images | grep -q {IMAGE} && touch {}", self.binary().display()),
                &dir,
                env,
            ),
        ])
    }

    fn service(&self, host: &HostContext<'_>) -> Option<DaemonSpec> {
        Some(self.daemon(host.env_with(&[self.path_override()])))
    }
}

impl Benchmark for Docker {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let cflags = cx.host.cflags();
        let env = cx.env(&[self.path_override(), Override::replace("CFLAGS", cflags.clone())]);
        let daemon = DaemonGuard::start(cx.runner, &self.daemon(env.clone()))?;

        let images = cx.runner.run(&Invocation::new("docker images", self.dir(), env.clone()))?;
        if !images.stdout.contains(IMAGE) {
            return Err(DriverError::Measurement(format!("docker image {IMAGE} could not be found")));
        }
        cx.runner.run(&Invocation::new(remove_containers(false), self.dir(), env.clone()))?;

        let containers = self.containers(cx.host.cores(), &cflags, cx.concurrency, &env);
        let samples = measure_concurrent(cx.runner, &containers, cx.quiesce, parse_number);

        if let Ok(samples) = &samples {
            let times: String = samples
                .iter()
                .filter_map(|s| match s {
                    Sample::Scalar(x) => Some(format!("{x}\n")),
                    Sample::Vector(_) => None,
                })
                .collect();
            cx.save_raw("docker_times.txt", &times);
        }
        if let Err(e) = cx.runner.run(&Invocation::new(remove_containers(true), self.dir(), env)) {
            tracing::warn!("container cleanup failed: {e}");
        }
        if !daemon.stop() {
            tracing::warn!("dockerd had to be killed");
        }

        Ok(Measurement::scalar("s", samples?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_commands() {
        let docker = Docker::new(&SuiteOptions::new("/r"));
        let runs = docker.containers(4, "-O3", 3, &Environment::new());
        assert_eq!(runs.len(), 3);
        assert_eq!(
            runs[2].command,
            "docker run --ulimit nofile=1048576:1048576 -e \"cores=4\" -e \"cflags=-O3\" --name compile_kernel_test2 compile_kernel"
        );
    }

    #[test]
    fn test_remove_containers() {
        assert!(!remove_containers(false).contains("docker stop"));
        assert!(remove_containers(true).contains("docker stop $ids"));
    }

    #[test]
    fn test_dockerfile_takes_build_args() {
        for arg in ["ARG url", "ARG version", "ARG cores", "ARG cflags"] {
            assert!(DOCKERFILE.contains(arg), "missing {arg}");
        }
    }
}
