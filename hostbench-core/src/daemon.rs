//! Scoped Daemon Processes
//!
//! Database servers and container engines are started in the background for
//! the duration of a measurement. [`DaemonGuard`] owns such a process:
//! acquisition waits for its PID file, and release (explicit or on drop)
//! signals it twice, waits a grace period, then force-kills it if it is
//! still alive. Release happens on every exit path, including failures.

use crate::error::DriverError;
use crate::exec::{Invocation, ProcessRunner, pid_alive, send_signal, wait_until};
use std::path::PathBuf;
use std::time::Duration;

/// How to start and stop a daemon
#[derive(Debug, Clone)]
pub struct DaemonSpec {
    /// Name used in logs and errors
    pub name: String,
    /// Foreground start command; it is backgrounded with output sent to `log`
    pub start: Invocation,
    /// File the daemon writes its PID to
    pub pid_file: PathBuf,
    /// Daemon output
    pub log: PathBuf,
    /// Maximum wait for the PID file
    pub startup_timeout: Duration,
    /// Pause after the PID file appears, for the service to accept clients
    pub warmup: Duration,
    /// Wait between the termination signals and the forced kill
    pub grace: Duration,
}

/// A running daemon, stopped when dropped
#[derive(Debug)]
pub struct DaemonGuard {
    name: String,
    pid: u32,
    pid_file: PathBuf,
    grace: Duration,
    stopped: bool,
}

impl DaemonGuard {
    /// Start the daemon and wait for its PID file
    pub fn start(runner: &dyn ProcessRunner, spec: &DaemonSpec) -> Result<Self, DriverError> {
        if spec.pid_file.exists() {
            tracing::debug!(pid_file = %spec.pid_file.display(), "removing stale pid file");
            std::fs::remove_file(&spec.pid_file)?;
        }

        let background = Invocation {
            command: format!("{} > {} 2>&1 &", spec.start.command, spec.log.display()),
            ..spec.start.clone()
        };
        tracing::info!(daemon = %spec.name, "starting");
        let output = runner.run(&background)?;
        if !output.success {
            return Err(DriverError::Measurement(format!(
                "{} failed to start: {}",
                spec.name,
                output.stdout.trim()
            )));
        }

        let mut pid = None;
        wait_until(spec.startup_timeout, || {
            pid = read_pid(&spec.pid_file);
            pid.is_some()
        });
        let Some(pid) = pid else {
            return Err(DriverError::Measurement(format!(
                "{} did not write {} within {:?}",
                spec.name,
                spec.pid_file.display(),
                spec.startup_timeout
            )));
        };

        let guard = Self {
            name: spec.name.clone(),
            pid,
            pid_file: spec.pid_file.clone(),
            grace: spec.grace,
            stopped: false,
        };

        std::thread::sleep(spec.warmup);
        if !guard.is_alive() {
            return Err(DriverError::Measurement(format!(
                "{} exited during startup, see {}",
                spec.name,
                spec.log.display()
            )));
        }
        tracing::info!(daemon = %guard.name, pid, "running");
        Ok(guard)
    }

    /// Daemon process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the daemon is still running
    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }

    /// Stop the daemon; returns `true` if it had to be force-killed
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;

        // Some daemons ignore the first SIGTERM while finishing startup
        for _ in 0..2 {
            if let Err(e) = send_signal(self.pid, libc::SIGTERM) {
                tracing::debug!(daemon = %self.name, pid = self.pid, "SIGTERM: {e}");
            }
        }

        let exited = wait_until(self.grace, || !pid_alive(self.pid));
        if !exited {
            tracing::warn!(daemon = %self.name, pid = self.pid, "still alive after grace period, killing");
            let _ = send_signal(self.pid, libc::SIGKILL);
        }
        let _ = std::fs::remove_file(&self.pid_file);
        tracing::info!(daemon = %self.name, "stopped");
        !exited
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// PID recorded in `path`; zero, negative and out-of-range values are not PIDs
fn read_pid(path: &std::path::Path) -> Option<u32> {
    let pid: libc::pid_t = std::fs::read_to_string(path).ok()?.trim().parse().ok()?;
    u32::try_from(pid).ok().filter(|&pid| pid > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::exec::ShellRunner;

    fn spec(dir: &std::path::Path, command: &str) -> DaemonSpec {
        let env: Environment = [("PATH", "/usr/bin:/bin")].into_iter().collect();
        DaemonSpec {
            name: "fake".to_string(),
            start: Invocation::new(command, dir, env),
            pid_file: dir.join("fake.pid"),
            log: dir.join("fake.log"),
            startup_timeout: Duration::from_secs(5),
            warmup: Duration::ZERO,
            grace: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path(), "bash -c 'echo $$ > fake.pid; exec sleep 30'");

        let guard = DaemonGuard::start(&ShellRunner, &spec).unwrap();
        let pid = guard.pid();
        assert!(guard.is_alive());

        assert!(!guard.stop());
        assert!(!pid_alive(pid));
        assert!(!spec.pid_file.exists());
    }

    #[test]
    fn test_stubborn_daemon_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(
            dir.path(),
            "bash -c 'trap \"\" TERM; echo $$ > fake.pid; while true; do sleep 0.05; done'",
        );

        let guard = DaemonGuard::start(&ShellRunner, &spec).unwrap();
        let pid = guard.pid();
        assert!(guard.stop());
        assert!(wait_until(Duration::from_secs(2), || !pid_alive(pid)));
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path(), "bash -c 'echo $$ > fake.pid; exec sleep 30'");

        let pid = {
            let guard = DaemonGuard::start(&ShellRunner, &spec).unwrap();
            guard.pid()
        };
        assert!(!pid_alive(pid));
    }

    #[test]
    fn test_read_pid_rejects_non_pids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        for bad in ["0", "-1", "4294967295", "2147483648", "abc", ""] {
            std::fs::write(&path, bad).unwrap();
            assert_eq!(read_pid(&path), None, "{bad:?}");
        }

        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid(&path), Some(4242));
        assert_eq!(read_pid(&dir.path().join("missing.pid")), None);
    }

    #[test]
    fn test_missing_pid_file_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec(dir.path(), "true");
        spec.startup_timeout = Duration::from_millis(100);

        let err = DaemonGuard::start(&ShellRunner, &spec).unwrap_err();
        assert!(err.to_string().contains("did not write"));
    }
}
