//! Bounded execution of resolved commands.
//!
//! The executor spawns the command via `sh -c` in its own process group,
//! rooted at the workspace directory. It enforces a wall-clock timeout and
//! a combined output byte cap, and observes the host shutdown flag so a
//! SIGINT/SIGTERM to the host also tears down the child subtree.
//!
//! # Notes on stdout/stderr capture and timeouts
//!
//! Do not read stdout/stderr only after process exit: if the child writes
//! enough data to fill a pipe, it can block forever and never exit
//! (deadlock). Both streams are drained concurrently, with a shared byte
//! budget so runaway output is discarded rather than buffered.
//!
//! Timeouts are enforced with millisecond precision by polling `try_wait`;
//! termination is process-group scoped (SIGTERM, short grace wait, then
//! SIGKILL) so subprocesses the child spawned die with it.
//!
//! The drain itself is bounded too: a child can exit while a backgrounded
//! grandchild still holds the inherited pipe write ends open (a daemonizing
//! start script, for example). With no PID namespace to reap it, waiting
//! for pipe EOF would stall past the configured timeout, so collection uses
//! a grace period and kills the process group — the grandchild is still in
//! it — when the pipes stay open.

pub mod signals;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, instrument, trace, warn};

use crate::error::ExecutionError;

/// Default wall-clock timeout for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default combined stdout+stderr cap: 10 MiB.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Poll interval for the wait loop.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a process group gets to react to SIGTERM before SIGKILL.
const TERM_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// How long the pipes get to reach EOF after the child is gone before the
/// process group is killed to close them.
const DRAIN_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Why the child process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Ran to completion with the given exit code (`None` if killed by a
    /// signal outside our control).
    Exited { code: Option<i32> },
    /// Exceeded the wall-clock timeout; the process group was killed.
    TimedOut,
    /// The host was asked to shut down; the process group was killed.
    Interrupted,
}

impl ProcessStatus {
    /// True only for a zero exit code.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}

/// Captured output of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured standard output (lossily decoded, possibly truncated).
    pub stdout: String,
    /// Captured standard error (lossily decoded, possibly truncated).
    pub stderr: String,
    /// True if the combined byte cap truncated either stream.
    pub truncated: bool,
    /// Why the process stopped.
    pub status: ProcessStatus,
}

/// Executes shell commands under time and output bounds.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    timeout: Duration,
    max_output_bytes: usize,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl SandboxExecutor {
    /// Creates an executor with the given bounds.
    #[must_use]
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
        }
    }

    /// Default environment variables for child processes.
    ///
    /// Merged with caller-provided vars, which take precedence.
    fn default_env_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            (
                "PATH",
                "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
            ),
            ("HOME", "/tmp"),
            ("TERM", "xterm"),
        ]
    }

    /// Runs a shell command rooted at `working_dir`.
    ///
    /// Timeout expiry and host interrupts are reported through
    /// [`ExecOutput::status`], with whatever output was captured up to that
    /// point; both streams are always present (empty, not absent).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::SpawnFailed`] if the shell cannot be
    /// spawned, or [`ExecutionError::WaitFailed`] if waiting on it fails.
    #[instrument(skip(self, env_vars), fields(working_dir = %working_dir.display(), timeout_ms = %self.timeout.as_millis()))]
    pub fn run(
        &self,
        shell_command: &str,
        working_dir: &Path,
        env_vars: &HashMap<String, String>,
    ) -> Result<ExecOutput, ExecutionError> {
        use std::os::unix::process::CommandExt;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(shell_command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // New process group with pgid == child pid, so the whole
            // subtree can be signalled as one unit.
            .process_group(0);

        for (key, value) in Self::default_env_vars() {
            cmd.env(key, value);
        }
        for (key, value) in env_vars {
            cmd.env(key, value);
        }

        trace!(command = shell_command, "Spawning child process");
        let mut child = cmd.spawn().map_err(|e| ExecutionError::SpawnFailed {
            context: shell_command.to_string(),
            source: e,
        })?;
        let pgid = Pid::from_raw(child.id() as i32);

        // Drain both pipes concurrently against a shared byte budget.
        let budget = Arc::new(AtomicUsize::new(self.max_output_bytes));
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let (stdout_tx, stdout_rx) = mpsc::channel::<(Vec<u8>, bool)>();
        let (stderr_tx, stderr_rx) = mpsc::channel::<(Vec<u8>, bool)>();

        // The drain threads are detached: if a pipe never reaches EOF the
        // bounded receive below moves on without them, and they exit once
        // the last writer is killed.
        let stdout_budget = Arc::clone(&budget);
        thread::spawn(move || {
            let result = stdout_pipe
                .map(|r| drain_capped(r, &stdout_budget))
                .unwrap_or_default();
            let _ = stdout_tx.send(result);
        });

        let stderr_budget = Arc::clone(&budget);
        thread::spawn(move || {
            let result = stderr_pipe
                .map(|r| drain_capped(r, &stderr_budget))
                .unwrap_or_default();
            let _ = stderr_tx.send(result);
        });

        // Wait for completion with millisecond-precision timeout, watching
        // the host shutdown flag on every iteration.
        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(exit)) => break ProcessStatus::Exited { code: exit.code() },
                Ok(None) => {
                    if signals::shutdown_requested() {
                        debug!("Host shutdown requested, terminating process group");
                        terminate_group(&mut child, pgid);
                        break ProcessStatus::Interrupted;
                    }
                    if start.elapsed() > self.timeout {
                        debug!(
                            elapsed_ms = %start.elapsed().as_millis(),
                            "Command timed out, terminating process group"
                        );
                        terminate_group(&mut child, pgid);
                        break ProcessStatus::TimedOut;
                    }
                    thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => {
                    terminate_group(&mut child, pgid);
                    return Err(ExecutionError::WaitFailed {
                        context: shell_command.to_string(),
                        source: e,
                    });
                }
            }
        };

        // A backgrounded grandchild can keep the pipes open after the child
        // exits; bound the drain and kill the group if it does.
        let (stdout_bytes, stdout_truncated) = recv_drained(&stdout_rx, pgid);
        let (stderr_bytes, stderr_truncated) = recv_drained(&stderr_rx, pgid);

        debug!(?status, elapsed_ms = %start.elapsed().as_millis(), "Command finished");
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
            status,
        })
    }
}

/// Terminates the child's process group: SIGTERM, grace wait, then SIGKILL.
///
/// The group id equals the child pid because the child was spawned with
/// `process_group(0)`. Errors are ignored: the group may already be gone.
fn terminate_group(child: &mut Child, pgid: Pid) {
    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        trace!(%pgid, error = %e, "SIGTERM to process group failed");
    }

    let deadline = Instant::now() + TERM_GRACE_PERIOD;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => thread::sleep(WAIT_POLL_INTERVAL),
            _ => {
                if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                    warn!(%pgid, error = %e, "SIGKILL to process group failed");
                }
                let _ = child.wait();
                break;
            }
        }
    }
}

/// Collects one drained stream, bounded by [`DRAIN_GRACE_PERIOD`].
///
/// The drain thread only sends at pipe EOF. If the grace period expires the
/// pipe is still held open by something in the process group (the child
/// itself is already reaped), so the group gets SIGKILL to close the write
/// end, then one more bounded receive collects whatever was read. Output is
/// marked truncated if even that fails.
fn recv_drained(rx: &mpsc::Receiver<(Vec<u8>, bool)>, pgid: Pid) -> (Vec<u8>, bool) {
    match rx.recv_timeout(DRAIN_GRACE_PERIOD) {
        Ok(drained) => drained,
        Err(_) => {
            debug!(%pgid, "Pipe still open after exit, killing lingering process group");
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                trace!(%pgid, error = %e, "SIGKILL to lingering process group failed");
            }
            rx.recv_timeout(DRAIN_GRACE_PERIOD)
                .unwrap_or((Vec::new(), true))
        }
    }
}

/// Reads a pipe to EOF, keeping at most the bytes the shared budget allows.
///
/// Reading continues past the cap (discarding) so the child never blocks on
/// a full pipe; the boolean reports whether anything was dropped.
fn drain_capped(mut reader: impl Read, budget: &AtomicUsize) -> (Vec<u8>, bool) {
    let mut out = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let granted = take_from_budget(budget, n);
                out.extend_from_slice(&chunk[..granted]);
                if granted < n {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (out, truncated)
}

/// Atomically claims up to `wanted` bytes from the shared budget.
fn take_from_budget(budget: &AtomicUsize, wanted: usize) -> usize {
    let mut current = budget.load(Ordering::Relaxed);
    loop {
        let granted = wanted.min(current);
        if granted == 0 {
            return 0;
        }
        match budget.compare_exchange_weak(
            current,
            current - granted,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return granted,
            Err(observed) => current = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run(executor: &SandboxExecutor, cmd: &str, dir: &Path) -> ExecOutput {
        executor
            .run(cmd, dir, &HashMap::new())
            .expect("execution should not error")
    }

    #[test]
    fn test_echo_captures_stdout() {
        let dir = TempDir::new().expect("temp dir");
        let out = run(&SandboxExecutor::default(), "echo hello", dir.path());

        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "");
        assert!(!out.truncated);
        assert!(out.status.success());
    }

    #[test]
    fn test_nonzero_exit_is_not_success() {
        let dir = TempDir::new().expect("temp dir");
        let out = run(&SandboxExecutor::default(), "exit 3", dir.path());

        assert_eq!(out.status, ProcessStatus::Exited { code: Some(3) });
        assert!(!out.status.success());
    }

    #[test]
    fn test_stderr_is_captured_separately() {
        let dir = TempDir::new().expect("temp dir");
        let out = run(
            &SandboxExecutor::default(),
            "echo out; echo err >&2",
            dir.path(),
        );

        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn test_runs_in_working_directory() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("marker.txt"), "here").expect("write");

        let out = run(&SandboxExecutor::default(), "cat marker.txt", dir.path());
        assert_eq!(out.stdout, "here");
    }

    #[test]
    fn test_env_override_takes_precedence() {
        let dir = TempDir::new().expect("temp dir");
        let mut env = HashMap::new();
        env.insert(String::from("HOME"), String::from("/nonexistent-home"));

        let out = SandboxExecutor::default()
            .run("echo \"$HOME\"", dir.path(), &env)
            .expect("run");
        assert_eq!(out.stdout, "/nonexistent-home\n");
    }

    #[test]
    fn test_output_cap_truncates_without_hanging() {
        let dir = TempDir::new().expect("temp dir");
        let executor = SandboxExecutor::new(DEFAULT_TIMEOUT, 1024);

        // 256 KiB of output against a 1 KiB cap.
        let out = run(&executor, "head -c 262144 /dev/zero | tr '\\0' 'a'", dir.path());

        assert!(out.truncated);
        assert!(out.stdout.len() <= 1024);
        assert!(out.status.success());
    }

    #[test]
    fn test_timeout_kills_process_group() {
        let dir = TempDir::new().expect("temp dir");
        let executor = SandboxExecutor::new(Duration::from_millis(200), DEFAULT_MAX_OUTPUT_BYTES);

        let start = Instant::now();
        let out = run(&executor, "sleep 30", dir.path());

        assert_eq!(out.status, ProcessStatus::TimedOut);
        assert!(!out.status.success());
        // 200ms timeout + 500ms grace + slack, nowhere near the sleep.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_preserves_partial_output() {
        let dir = TempDir::new().expect("temp dir");
        let executor = SandboxExecutor::new(Duration::from_millis(300), DEFAULT_MAX_OUTPUT_BYTES);

        let out = run(&executor, "echo early; sleep 30", dir.path());
        assert_eq!(out.status, ProcessStatus::TimedOut);
        assert_eq!(out.stdout, "early\n");
    }

    #[test]
    fn test_backgrounded_grandchild_does_not_stall_collection() {
        let dir = TempDir::new().expect("temp dir");
        let executor = SandboxExecutor::new(Duration::from_millis(500), DEFAULT_MAX_OUTPUT_BYTES);

        // The shell exits immediately, but the backgrounded sleep inherits
        // the pipes and would hold them open for 8s.
        let start = Instant::now();
        let out = run(&executor, "sleep 8 &\necho started\nexit 0", dir.path());

        assert_eq!(out.status, ProcessStatus::Exited { code: Some(0) });
        assert_eq!(out.stdout, "started\n");
        // Drain grace plus slack, nowhere near the background sleep.
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "collection stalled for {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_spawn_failure_surfaces_as_error() {
        let executor = SandboxExecutor::default();
        let missing_dir = Path::new("/nonexistent/working/dir");

        let err = executor
            .run("echo hi", missing_dir, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::SpawnFailed { .. }));
    }
}
