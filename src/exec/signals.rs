//! Async-signal-safe host shutdown handling.
//!
//! When the host process receives SIGINT, SIGTERM, or SIGHUP mid-execution,
//! the handler sets an atomic flag and nothing else. The executor's wait
//! loop observes the flag and tears down the child process group, so no
//! orphaned children survive their parent.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::debug;

use crate::error::ExecutionError;

/// Global shutdown flag, set only from the signal handler or
/// [`request_shutdown`].
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// One-time handler installation.
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Only atomic operations are allowed here: no allocation, locks, or I/O.
extern "C" fn shutdown_handler(_signal: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs SIGINT/SIGTERM/SIGHUP handlers that request shutdown.
///
/// Idempotent: repeated calls after a successful installation are no-ops.
/// Should be called early, before executions begin.
///
/// # Errors
///
/// Returns [`ExecutionError::SignalSetup`] if `sigaction` fails.
pub fn install_handlers() -> Result<(), ExecutionError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::Handler(shutdown_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe.
        unsafe {
            signal::sigaction(sig, &action)
                .map_err(|e| ExecutionError::SignalSetup(format!("{sig}: {e}")))?;
        }
    }

    let _ = INSTALLED.set(());
    debug!("Signal handlers installed (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}

/// Returns true once host shutdown has been requested.
#[must_use]
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Requests shutdown programmatically, as the signal handler would.
///
/// Embedding hosts with their own signal handling can call this instead of
/// [`install_handlers`].
pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}
