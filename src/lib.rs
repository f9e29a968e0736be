//! runbox - Ephemeral workspace provisioning and bounded code execution.
//!
//! This crate is the execution core behind a code-running tool: it
//! materializes a short-lived workspace directory for inline source code or
//! an existing project, optionally runs package-manager setup steps,
//! detects the entry point when none is given, executes it under a
//! wall-clock timeout and an output byte cap, and destroys the workspace on
//! every exit path.
//!
//! Isolation is filesystem separation only: each request gets a private
//! directory and its own process group. There is no namespace or cgroup
//! sandboxing here, and workspaces never persist across executions.
//!
//! # Example
//!
//! ```no_run
//! use runbox::{ExecutionRequest, Runner, RunnerConfig};
//!
//! let runner = Runner::new(RunnerConfig::default());
//! let result = runner
//!     .execute(&ExecutionRequest::inline("print('hi')", "a.py"))
//!     .unwrap();
//! assert_eq!(result.stdout, "hi\n");
//! assert!(result.success);
//! ```

pub mod error;
pub mod exec;
pub mod resolve;
pub mod runner;
pub mod setup;
pub mod workspace;

// Re-export commonly used types
pub use error::{Error, Result};
pub use runner::{
    DependencyFile, ExecutionRequest, ExecutionResult, ExecutionStatus, Runner, RunnerConfig,
    StderrPolicy,
};
pub use workspace::{Workspace, WorkspaceStore};
