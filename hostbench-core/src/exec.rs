//! Process Execution
//!
//! Commands are shell strings run through `/bin/bash -c` in an explicit
//! working directory with an explicit [`Environment`]. The inherited
//! environment is cleared first, so nothing leaks between drivers.

use crate::env::Environment;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// A command with its working directory and environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command line
    pub command: String,
    /// Working directory
    pub cwd: PathBuf,
    /// Complete environment
    pub env: Environment,
}

impl Invocation {
    /// New invocation
    pub fn new(command: impl Into<String>, cwd: impl AsRef<Path>, env: Environment) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.as_ref().to_path_buf(),
            env,
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Combined stdout and stderr
    pub stdout: String,
    /// Whether the command exited with status zero
    pub success: bool,
}

/// A process started without waiting for it
pub trait RunningProcess: Send {
    /// OS process id
    fn id(&self) -> u32;

    /// Block until exit and collect output
    fn wait(self: Box<Self>) -> io::Result<ProcessOutput>;
}

/// Executes invocations
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, capturing output
    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput>;

    /// Run to completion and return wall-clock seconds, or `None` on failure
    fn run_timed(&self, invocation: &Invocation) -> io::Result<Option<f64>> {
        let start = Instant::now();
        let output = self.run(invocation)?;
        let elapsed = start.elapsed();
        if output.success {
            Ok(Some(elapsed.as_secs_f64()))
        } else {
            tracing::debug!(command = %invocation.command, output = %output.stdout, "timed command failed");
            Ok(None)
        }
    }

    /// Start without waiting
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn RunningProcess>>;
}

/// Runs commands through `/bin/bash -c`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new("/bin/bash");
        command
            .arg("-c")
            // stderr is folded into stdout so parsers see everything the tool printed
            .arg(format!("{{ {}\n}} 2>&1", invocation.command))
            .current_dir(&invocation.cwd)
            .env_clear()
            .envs(invocation.env.iter())
            .stdin(Stdio::null());
        command
    }
}

impl ProcessRunner for ShellRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        tracing::debug!(command = %invocation.command, cwd = %invocation.cwd.display(), "run");
        let output = Self::command(invocation).stderr(Stdio::null()).output()?;
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            success: output.status.success(),
        })
    }

    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn RunningProcess>> {
        tracing::debug!(command = %invocation.command, cwd = %invocation.cwd.display(), "spawn");
        let child = Self::command(invocation)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(ShellProcess { child }))
    }
}

struct ShellProcess {
    child: Child,
}

impl RunningProcess for ShellProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn wait(self: Box<Self>) -> io::Result<ProcessOutput> {
        let output = self.child.wait_with_output()?;
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            success: output.status.success(),
        })
    }
}

/// Send a signal to a process id. Values that `kill(2)` would treat as a
/// process group or as every process are refused.
pub(crate) fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .ok()
        .filter(|&pid| pid > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;
    let ret = unsafe { libc::kill(pid, signal) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Whether a process id refers to a live, non-zombie process
pub(crate) fn pid_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

/// Sleep in short slices until `cond` holds or `timeout` elapses
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        std::thread::sleep(remaining.min(Duration::from_millis(50)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_env() -> Environment {
        [("PATH", "/usr/bin:/bin"), ("GREETING", "hello")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_run_captures_output_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let inv = Invocation::new("echo $GREETING; echo oops >&2; pwd", dir.path(), shell_env());

        let output = ShellRunner.run(&inv).unwrap();
        assert!(output.success);
        let lines: Vec<&str> = output.stdout.lines().collect();
        assert_eq!(lines[0], "hello");
        assert_eq!(lines[1], "oops");
        assert!(lines[2].ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn test_env_is_not_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let inv = Invocation::new("echo \"[$CARGO_PKG_NAME]\"", dir.path(), shell_env());
        let output = ShellRunner.run(&inv).unwrap();
        assert_eq!(output.stdout.trim(), "[]");
    }

    #[test]
    fn test_run_timed_failure_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let ok = Invocation::new("true", dir.path(), shell_env());
        let fail = Invocation::new("exit 3", dir.path(), shell_env());

        assert!(ShellRunner.run_timed(&ok).unwrap().is_some());
        assert_eq!(ShellRunner.run_timed(&fail).unwrap(), None);
    }

    #[test]
    fn test_spawn_then_wait() {
        let dir = tempfile::tempdir().unwrap();
        let inv = Invocation::new("echo 12.5", dir.path(), shell_env());
        let process = ShellRunner.spawn(&inv).unwrap();
        assert!(process.id() > 0);
        let output = process.wait().unwrap();
        assert_eq!(output.stdout.trim(), "12.5");
    }

    #[test]
    fn test_pid_alive() {
        assert!(pid_alive(std::process::id()));
        assert!(!pid_alive(u32::MAX - 1));
    }

    #[test]
    fn test_signal_refuses_group_pids() {
        for pid in [0, u32::MAX, i32::MAX as u32 + 1] {
            let err = send_signal(pid, 0).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert!(send_signal(std::process::id(), 0).is_ok());
    }

    #[test]
    fn test_wait_until() {
        let mut calls = 0;
        assert!(wait_until(Duration::from_secs(1), || {
            calls += 1;
            calls == 3
        }));
        assert!(!wait_until(Duration::from_millis(10), || false));
    }
}
