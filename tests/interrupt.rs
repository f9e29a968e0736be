//! Host-shutdown handling.
//!
//! The shutdown flag is process-global and one-way, so this scenario lives
//! in its own integration binary where raising it cannot leak into other
//! tests.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use runbox::exec::signals;
use runbox::runner::{ExecutionRequest, ExecutionStatus, Runner, RunnerConfig};
use tempfile::TempDir;

/// A shutdown request mid-run interrupts the execution promptly, kills the
/// child subtree, and still cleans up the workspace.
#[test]
fn test_host_shutdown_interrupts_running_command() {
    let pid_dir = TempDir::new().expect("pid dir");
    let pid_file = pid_dir.path().join("pid");

    let base = TempDir::new().expect("base dir");
    let runner = Runner::new(
        RunnerConfig::default()
            .with_base_dir(base.path())
            .with_auto_setup(false),
    );

    // Raise the flag the signal handlers would set, while the child sleeps
    // well past any test deadline.
    thread::spawn(|| {
        thread::sleep(Duration::from_millis(300));
        signals::request_shutdown();
    });

    let start = Instant::now();
    let request = ExecutionRequest::inline("echo $$ > \"$PID_FILE\"\nsleep 30", "a.sh")
        .with_env("PID_FILE", pid_file.display().to_string());
    let result = runner.execute(&request).expect("execute");

    assert_eq!(result.status, ExecutionStatus::Interrupted);
    assert!(!result.success);
    assert_eq!(result.exit_code, None);
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "interrupt not observed promptly: {:?}",
        start.elapsed()
    );

    let leftovers: Vec<_> = fs::read_dir(base.path())
        .expect("base dir should exist")
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .collect();
    assert!(
        leftovers.is_empty(),
        "workspaces must not persist after an interrupt: {leftovers:?}"
    );

    // No process from the spawned group survives.
    let pid: i32 = fs::read_to_string(&pid_file)
        .expect("pid file written before interrupt")
        .trim()
        .parse()
        .expect("pid file contains a pid");
    let proc_path = format!("/proc/{pid}");
    for _ in 0..100 {
        if !Path::new(&proc_path).exists() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("process {pid} survived the interrupt kill");
}
