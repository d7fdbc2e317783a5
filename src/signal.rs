//! Ctrl+C handling for cooperative cancellation.
//!
//! A single [`ShutdownHandler`] wraps an `Arc<AtomicBool>`. The walker, the
//! hashing loop and the relocator receive a clone of the flag and check it
//! between files; nothing is killed mid-write.
//!
//! ```rust,no_run
//! use dupestash::signal::install_handler;
//!
//! let handler = install_handler().unwrap();
//! let flag = handler.get_flag();
//! // hand `flag` to Walker / Relocator / Pipeline
//! if handler.is_shutdown_requested() {
//!     std::process::exit(130);
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// New handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl+C was pressed or [`request_shutdown`](Self::request_shutdown) called.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the flag by hand.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clone of the flag for long-running components.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Failure to register the Ctrl+C handler.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// `ctrlc` refused the registration.
    #[error("failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C handler.
///
/// Calling this again returns the already installed handler with its flag
/// cleared, so repeated runs in one process (tests) keep working.
///
/// # Errors
///
/// Returns [`SignalError`] if another Ctrl+C handler was registered
/// outside this module.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "\nInterrupted. Finishing current file...");
        let _ = stderr.flush();
        log::info!("Shutdown signal received");
    })?;

    let installed = GLOBAL_HANDLER.get_or_init(|| handler);
    Ok(installed.clone())
}
