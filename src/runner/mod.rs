//! The execution pipeline: request and result types, configuration, and
//! the create → setup → resolve → run → cleanup sequence.
//!
//! One request is handled by one sequential pipeline. Multiple requests may
//! run concurrently, each with its own workspace directory and process
//! group; workspace IDs are random, so creation needs no shared lock.
//!
//! # Example
//!
//! ```no_run
//! use runbox::runner::{ExecutionRequest, Runner, RunnerConfig};
//!
//! let runner = Runner::new(RunnerConfig::default());
//! let request = ExecutionRequest::inline("print('hi')", "a.py");
//! let result = runner.execute(&request).unwrap();
//! assert!(result.success);
//! assert_eq!(result.stdout, "hi\n");
//! ```

mod pipeline;

pub use pipeline::Runner;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::exec::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT};
use crate::setup::DEFAULT_SETUP_TIMEOUT;
use crate::workspace;

/// A file written into the workspace before the main file.
///
/// Write order is dependencies-then-main, so the main file may reference
/// dependency filenames but not vice versa by load order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyFile {
    /// Workspace-relative file name.
    pub name: String,
    /// File content, written verbatim.
    pub content: Vec<u8>,
}

/// A single execution request, as submitted by the dispatch layer.
///
/// Exactly one of `inline_code` + `filename` or `existing_path` must be
/// supplied; violating this is a request-validation error, not a runtime
/// error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code to write into the workspace.
    pub inline_code: Option<String>,
    /// Name the inline code is written under.
    pub filename: Option<String>,
    /// Existing project directory whose contents are copied in.
    pub existing_path: Option<PathBuf>,
    /// Extra files written before the main file.
    #[serde(default)]
    pub dependencies: Vec<DependencyFile>,
    /// Workspace-relative entry point, skipping detection entirely.
    pub entry_point: Option<String>,
    /// Environment variable overrides for the child process.
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// Whether to run install/build steps before execution.
    #[serde(default = "default_auto_setup")]
    pub auto_setup: bool,
}

fn default_auto_setup() -> bool {
    true
}

impl ExecutionRequest {
    /// A request carrying inline source code.
    #[must_use]
    pub fn inline(code: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            inline_code: Some(code.into()),
            filename: Some(filename.into()),
            auto_setup: true,
            ..Self::default()
        }
    }

    /// A request for an existing project directory.
    #[must_use]
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self {
            existing_path: Some(path.into()),
            auto_setup: true,
            ..Self::default()
        }
    }

    /// Adds a dependency file, written before the main file.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.dependencies.push(DependencyFile {
            name: name.into(),
            content: content.into(),
        });
        self
    }

    /// Sets an explicit entry point, skipping detection.
    #[must_use]
    pub fn with_entry_point(mut self, entry: impl Into<String>) -> Self {
        self.entry_point = Some(entry.into());
        self
    }

    /// Adds an environment variable for the child process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Enables or disables setup for this request.
    #[must_use]
    pub fn with_auto_setup(mut self, auto_setup: bool) -> Self {
        self.auto_setup = auto_setup;
        self
    }

    /// Validates the request shape before any workspace is created.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), RequestError> {
        match (&self.inline_code, &self.existing_path) {
            (None, None) => return Err(RequestError::MissingSource),
            (Some(_), Some(_)) => return Err(RequestError::ConflictingSource),
            _ => {}
        }
        if self.inline_code.is_some() && self.filename.is_none() {
            return Err(RequestError::MissingFilename);
        }

        let names = self
            .dependencies
            .iter()
            .map(|d| d.name.as_str())
            .chain(self.filename.as_deref())
            .chain(self.entry_point.as_deref());
        for name in names {
            if !workspace::is_safe_relative(name) {
                return Err(RequestError::PathEscapes {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Why the execution stopped, kept distinct from plain non-zero exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The process ran to completion (exit code may still be non-zero).
    Completed,
    /// The process exceeded the wall-clock timeout and was killed.
    TimedOut,
    /// The host was asked to shut down and the process was killed.
    Interrupted,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// The uniform result shape returned for every execution.
///
/// Both output streams are always present (empty string, not absent), even
/// on timeout, so downstream formatting has one shape to handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Derived success flag (see [`StderrPolicy`]).
    pub success: bool,
    /// Workspace-relative path of the file that was run.
    pub entry_point: String,
    /// Why the execution stopped.
    pub status: ExecutionStatus,
    /// Exit code, when the process ran to completion.
    pub exit_code: Option<i32>,
    /// True if the output byte cap truncated either stream.
    pub truncated: bool,
}

/// How stderr output affects success classification.
///
/// Historically this core's predecessor treated *any* stderr output as
/// failure, even on exit code 0 — surprising, since many legitimate
/// programs log warnings to stderr. The policy is therefore explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrPolicy {
    /// Exit status alone decides success (default).
    #[default]
    Ignore,
    /// Non-empty stderr marks the run failed even on exit code 0.
    TreatAsFailure,
}

/// Configuration for the execution pipeline.
///
/// # Example
///
/// ```
/// use runbox::runner::{RunnerConfig, StderrPolicy};
/// use std::time::Duration;
///
/// let config = RunnerConfig::default()
///     .with_timeout(Duration::from_secs(10))
///     .with_max_output_bytes(1024 * 1024)
///     .with_stderr_policy(StderrPolicy::TreatAsFailure);
/// ```
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base directory under which workspaces are allocated.
    pub base_dir: PathBuf,
    /// Wall-clock bound for the run itself.
    pub timeout: Duration,
    /// Wall-clock bound per setup command.
    pub setup_timeout: Duration,
    /// Combined stdout+stderr byte cap.
    pub max_output_bytes: usize,
    /// Success classification policy for stderr output.
    pub stderr_policy: StderrPolicy,
    /// Master switch for setup; a request can only disable it further.
    pub auto_setup: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_dir: workspace::default_base_dir(),
            timeout: DEFAULT_TIMEOUT,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            stderr_policy: StderrPolicy::default(),
            auto_setup: true,
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the workspace base directory.
    #[must_use]
    pub fn with_base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = path.into();
        self
    }

    /// Sets the run timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the per-command setup timeout.
    #[must_use]
    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    /// Sets the combined output byte cap.
    #[must_use]
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Sets the stderr success policy.
    #[must_use]
    pub fn with_stderr_policy(mut self, policy: StderrPolicy) -> Self {
        self.stderr_policy = policy;
        self
    }

    /// Enables or disables setup globally.
    #[must_use]
    pub fn with_auto_setup(mut self, auto_setup: bool) -> Self {
        self.auto_setup = auto_setup;
        self
    }
}
