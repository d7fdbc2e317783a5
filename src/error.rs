//! Exit codes and structured error reporting.

use serde::Serialize;

use crate::config::ConfigError;
use crate::pipeline::PipelineError;

/// Process exit codes.
///
/// - 0: everything was scanned and every duplicate relocated
/// - 1: unexpected failure (index error, I/O at startup)
/// - 2: the target directory is unusable
/// - 3: finished, but some files were skipped or could not be moved
/// - 130: interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed without warnings.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The target directory or configuration is invalid.
    ConfigError = 2,
    /// Completed with skipped files or failed relocations.
    PartialSuccess = 3,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::ConfigError => "DS002",
            Self::PartialSuccess => "DS003",
            Self::Interrupted => "DS130",
        }
    }

    /// Pick the exit code for a fatal error.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<ConfigError>().is_some() {
            return Self::ConfigError;
        }
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Interrupted) => Self::Interrupted,
            _ => Self::GeneralError,
        }
    }
}

/// Error report printed on stderr with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Code prefix, e.g. `DS002`
    pub code: String,
    /// Numeric exit code
    pub exit_code: i32,
    /// Human-readable message including causes
    pub message: String,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build the report for `err`.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
