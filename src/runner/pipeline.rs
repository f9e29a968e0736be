//! The create → populate → setup → resolve → run → cleanup sequence.

use tracing::{debug, info, instrument, warn};

use crate::error::{RequestError, ResolveError, Result};
use crate::exec::{ProcessStatus, SandboxExecutor};
use crate::resolve::{self, EntrySource, ResolvedEntryPoint};
use crate::setup::SetupOrchestrator;
use crate::workspace::{Workspace, WorkspaceGuard, WorkspaceStore};

use super::{ExecutionRequest, ExecutionResult, ExecutionStatus, RunnerConfig, StderrPolicy};

/// Drives execution requests through the full pipeline.
///
/// Cleanup is guaranteed: the workspace is guarded by a [`WorkspaceGuard`]
/// for the whole populate-through-run sequence, so it is destroyed on every
/// exit path — success, failure, panic, timeout, or host interrupt.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    store: WorkspaceStore,
}

impl Runner {
    /// Creates a runner with the given configuration.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        let store = WorkspaceStore::new(&config.base_dir);
        Self { config, store }
    }

    /// Returns the runner's configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Executes one request end to end.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] variants for malformed requests,
    /// unsupported extensions, and workspaces where no entry point can be
    /// determined at all, [`crate::error::WorkspaceError`] if the workspace
    /// cannot be allocated or populated, [`ResolveError`] if an explicitly
    /// requested entry point is missing, and
    /// [`crate::error::ExecutionError`] if the command cannot be spawned.
    /// Timeouts and interrupts are *not* errors; they come back as an
    /// [`ExecutionResult`] with the corresponding [`ExecutionStatus`].
    #[instrument(skip(self, request))]
    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;
        if let Some(path) = &request.existing_path {
            if !path.is_dir() {
                return Err(RequestError::InvalidExistingPath {
                    path: path.display().to_string(),
                }
                .into());
            }
        }

        let workspace = self.store.create()?;
        // From here on the guard owns cleanup on every exit path.
        let guard = WorkspaceGuard::new(&self.store, workspace);

        self.populate(guard.workspace(), request)?;

        if self.config.auto_setup && request.auto_setup {
            SetupOrchestrator::new(self.config.setup_timeout).prepare(&guard.workspace().root);
        }

        let entry = self.resolve_entry(guard.workspace(), request)?;
        info!(entry = %entry, "Entry point resolved");

        let command = resolve::command_for(&entry.path)?;
        let executor = SandboxExecutor::new(self.config.timeout, self.config.max_output_bytes);
        let output = executor.run(&command.shell, &guard.workspace().root, &request.env_vars)?;

        Ok(self.shape_result(guard.workspace(), &entry, output))
    }

    /// Writes dependencies, then the main file, or copies the existing tree.
    fn populate(&self, workspace: &Workspace, request: &ExecutionRequest) -> Result<()> {
        for dep in &request.dependencies {
            self.store.write_file(workspace, &dep.name, &dep.content)?;
        }

        if let Some(code) = &request.inline_code {
            // Validation guarantees the filename is present.
            let filename = request.filename.as_deref().ok_or(RequestError::MissingFilename)?;
            self.store.write_file(workspace, filename, code.as_bytes())?;
        } else if let Some(path) = &request.existing_path {
            self.store.copy_tree(workspace, path)?;
        }
        Ok(())
    }

    /// Resolves the entry point, falling back to the originally written
    /// main file when detection finds nothing.
    fn resolve_entry(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<ResolvedEntryPoint> {
        match resolve::resolve(&workspace.root, request.entry_point.as_deref()) {
            Ok(entry) => Ok(entry),
            Err(ResolveError::NotFound) => {
                if let Some(filename) = &request.filename {
                    let path = workspace.root.join(filename);
                    if path.is_file() {
                        debug!(%filename, "Falling back to the supplied main file");
                        return Ok(ResolvedEntryPoint {
                            path,
                            source: EntrySource::SuppliedMain,
                        });
                    }
                }
                // Nothing to run is a caller problem, not a resolver one.
                Err(RequestError::NoEntryPoint.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Maps raw executor output to the uniform result shape.
    fn shape_result(
        &self,
        workspace: &Workspace,
        entry: &ResolvedEntryPoint,
        output: crate::exec::ExecOutput,
    ) -> ExecutionResult {
        let (status, exit_code) = match output.status {
            ProcessStatus::Exited { code } => (ExecutionStatus::Completed, code),
            ProcessStatus::TimedOut => (ExecutionStatus::TimedOut, None),
            ProcessStatus::Interrupted => (ExecutionStatus::Interrupted, None),
        };

        let stderr_ok = match self.config.stderr_policy {
            StderrPolicy::Ignore => true,
            StderrPolicy::TreatAsFailure => output.stderr.is_empty(),
        };
        let success = output.status.success() && stderr_ok;

        if !success {
            warn!(%status, ?exit_code, "Execution classified as failed");
        }

        let entry_point = entry
            .path
            .strip_prefix(&workspace.root)
            .map_or_else(|_| entry.path.display().to_string(), |p| p.display().to_string());

        ExecutionResult {
            stdout: output.stdout,
            stderr: output.stderr,
            success,
            entry_point,
            status,
            exit_code,
            truncated: output.truncated,
        }
    }
}
