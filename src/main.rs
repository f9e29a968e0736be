//! Command-line entry point.
//!
//! A thin demonstration caller for the execution core: it submits a single
//! file or project directory as an `ExecutionRequest` and prints the
//! result. The real dispatch layer lives outside this crate.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use runbox::exec::signals;
use runbox::{ExecutionRequest, Runner, RunnerConfig, StderrPolicy};

/// Run a source file or project directory in an ephemeral workspace.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source file or project directory to run
    path: PathBuf,

    /// Workspace-relative entry point (skips detection)
    #[arg(long)]
    entry: Option<String>,

    /// Wall-clock timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Skip package-manager setup steps
    #[arg(long, default_value = "false")]
    no_setup: bool,

    /// Treat any stderr output as failure, even on exit code 0
    #[arg(long, default_value = "false")]
    strict_stderr: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is reserved for the program's own output.
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    signals::install_handlers().into_diagnostic()?;

    let stderr_policy = if args.strict_stderr {
        StderrPolicy::TreatAsFailure
    } else {
        StderrPolicy::Ignore
    };
    let config = RunnerConfig::default()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_stderr_policy(stderr_policy)
        .with_auto_setup(!args.no_setup);

    let request = if args.path.is_dir() {
        ExecutionRequest::existing(&args.path)
    } else {
        let code = std::fs::read_to_string(&args.path).into_diagnostic()?;
        let filename = args
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("main.txt"));
        ExecutionRequest::inline(code, filename)
    };
    let request = match args.entry {
        Some(entry) => request.with_entry_point(entry),
        None => request,
    };

    let runner = Runner::new(config);
    let result = runner.execute(&request)?;

    info!(
        entry = %result.entry_point,
        status = %result.status,
        exit_code = ?result.exit_code,
        "Execution finished"
    );

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    std::io::stdout().flush().into_diagnostic()?;

    if !result.success {
        std::process::exit(result.exit_code.unwrap_or(1));
    }
    Ok(())
}
