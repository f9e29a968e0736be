//! Error types for the execution core.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The request itself was malformed (caller's fault).
    #[error("invalid execution request")]
    #[diagnostic(code(runbox::request))]
    Request(#[from] RequestError),

    /// Workspace allocation or population failed.
    #[error("workspace error")]
    #[diagnostic(code(runbox::workspace))]
    Workspace(#[from] WorkspaceError),

    /// No entry point could be determined.
    #[error("entry point resolution failed")]
    #[diagnostic(code(runbox::resolve))]
    Resolve(#[from] ResolveError),

    /// The child process could not be spawned or awaited.
    #[error("execution error")]
    #[diagnostic(code(runbox::exec))]
    Execution(#[from] ExecutionError),
}

/// Errors caused by a malformed request. These are reported immediately,
/// before (or instead of) any execution, and are never retried.
#[derive(Error, Debug, Diagnostic)]
pub enum RequestError {
    /// Neither inline code nor an existing path was supplied.
    #[error("request must supply either inline code or an existing path")]
    #[diagnostic(
        code(runbox::request::missing_source),
        help("Set `inline_code` + `filename`, or `existing_path`")
    )]
    MissingSource,

    /// Both inline code and an existing path were supplied.
    #[error("request supplied both inline code and an existing path")]
    #[diagnostic(
        code(runbox::request::conflicting_source),
        help("Exactly one of `inline_code` or `existing_path` is allowed")
    )]
    ConflictingSource,

    /// Inline code was given without a filename to write it under.
    #[error("inline code requires a filename")]
    #[diagnostic(code(runbox::request::missing_filename))]
    MissingFilename,

    /// The existing path does not exist or is not a directory.
    #[error("existing path is not a directory: {path}")]
    #[diagnostic(code(runbox::request::invalid_path))]
    InvalidExistingPath { path: String },

    /// A dependency or entry-point name escapes the workspace root.
    #[error("path is not workspace-relative: {name}")]
    #[diagnostic(
        code(runbox::request::path_escape),
        help("Names must be relative and must not contain `..` components")
    )]
    PathEscapes { name: String },

    /// Nothing in the request or workspace identifies what to run.
    ///
    /// Detection exhausting every tier is the caller's problem to fix, so
    /// it is classified with the request errors rather than surfacing the
    /// resolver-internal [`ResolveError::NotFound`].
    #[error("no entry point could be determined")]
    #[diagnostic(
        code(runbox::request::no_entry_point),
        help("Pass an explicit entry point, or include a conventional main file")
    )]
    NoEntryPoint,

    /// The resolved entry file has no known run command.
    #[error("unsupported file extension: {extension:?}")]
    #[diagnostic(
        code(runbox::request::unsupported_extension),
        help("Only extensions with a registered run command can be executed")
    )]
    UnsupportedExtension { extension: String },
}

/// Errors from workspace directory management.
#[derive(Error, Debug, Diagnostic)]
pub enum WorkspaceError {
    /// The configured base directory could not be created or is not writable.
    #[error("workspace base directory unavailable: {path}")]
    #[diagnostic(
        code(runbox::workspace::base_dir),
        help("Check permissions on the configured base directory")
    )]
    BaseDirUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A filesystem operation inside the workspace failed.
    #[error("workspace I/O failed: {context}")]
    #[diagnostic(code(runbox::workspace::io))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from entry-point resolution.
#[derive(Error, Debug, Diagnostic)]
pub enum ResolveError {
    /// An explicitly requested entry point does not exist in the workspace.
    #[error("explicit entry point not found: {path}")]
    #[diagnostic(code(runbox::resolve::explicit_missing))]
    ExplicitNotFound { path: String },

    /// No tier produced a match.
    #[error("no entry point found in workspace")]
    #[diagnostic(
        code(runbox::resolve::not_found),
        help("Pass an explicit entry point, or add a conventional main file")
    )]
    NotFound,
}

/// Errors from spawning or awaiting the child process.
///
/// Timeouts and host interrupts are *not* errors: they are reported as
/// distinct [`ExecutionStatus`](crate::runner::ExecutionStatus) values so
/// the caller always receives a populated result.
#[derive(Error, Debug, Diagnostic)]
pub enum ExecutionError {
    /// The command could not be spawned at all.
    #[error("failed to spawn command: {context}")]
    #[diagnostic(code(runbox::exec::spawn))]
    SpawnFailed {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child process failed.
    #[error("failed to wait for command: {context}")]
    #[diagnostic(code(runbox::exec::wait))]
    WaitFailed {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Installing host signal handlers failed.
    #[error("failed to install signal handlers: {0}")]
    #[diagnostic(code(runbox::exec::signals))]
    SignalSetup(String),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
