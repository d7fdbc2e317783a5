//! JSON hand-off of a run's results.
//!
//! # Schema
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "hash": "af1349b9...",
//!       "kept": "/data/photos/a/1.jpg",
//!       "relocated": [
//!         { "from": "/data/photos/a/2.jpg", "to": "/data/photos_duplicates/a/2.jpg" }
//!       ]
//!     }
//!   ],
//!   "failures": [
//!     { "path": "/data/photos/b/x.jpg", "error": "target already exists: ..." }
//!   ],
//!   "summary": {
//!     "scan_skipped": false,
//!     "files_found": 120,
//!     "files_indexed": 120,
//!     "files_ignored": 0,
//!     "bytes_hashed": 73400320,
//!     "scan_warnings": [],
//!     "scan_duration_ms": 812,
//!     "duplicate_groups": 1,
//!     "duplicates_found": 2,
//!     "relocated": 1,
//!     "failed": 1,
//!     "dry_run": false,
//!     "interrupted": false,
//!     "exit_code": 3,
//!     "exit_code_name": "DS003"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::duplicates::{RelocationReport, ResolvedGroup};
use crate::error::ExitCode;
use crate::pipeline::ScanSummary;

/// A relocation that did not happen.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFailure {
    /// File left in place
    pub path: String,
    /// Reason
    pub error: String,
}

/// Run statistics.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// The index was reused and no scan ran
    pub scan_skipped: bool,
    /// Regular files found by the walk
    pub files_found: usize,
    /// Records stored by this scan
    pub files_indexed: usize,
    /// Files dropped because their normalized path was already indexed
    pub files_ignored: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Skipped subtrees and files
    pub scan_warnings: Vec<String>,
    /// Scan wall time in milliseconds
    pub scan_duration_ms: u64,
    /// Duplicate groups found in the index
    pub duplicate_groups: usize,
    /// Files eligible for relocation across those groups
    pub duplicates_found: usize,
    /// Files moved (or planned, in a dry run)
    pub relocated: usize,
    /// Files that could not be moved
    pub failed: usize,
    /// No file was actually moved
    pub dry_run: bool,
    /// Shutdown stopped relocation early
    pub interrupted: bool,
    /// Process exit code
    pub exit_code: i32,
    /// Machine-readable exit code name
    pub exit_code_name: String,
}

/// Complete JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Kept file and relocated duplicates per group
    pub groups: &'a [ResolvedGroup],
    /// Relocations that failed
    pub failures: Vec<JsonFailure>,
    /// Run statistics
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    /// Assemble the document from a run's results.
    #[must_use]
    pub fn new(scan: &ScanSummary, report: &'a RelocationReport, exit_code: ExitCode) -> Self {
        Self {
            groups: &report.groups,
            failures: report
                .failures
                .iter()
                .map(|f| JsonFailure {
                    path: f.path().to_string_lossy().into_owned(),
                    error: f.to_string(),
                })
                .collect(),
            summary: JsonSummary {
                scan_skipped: scan.skipped,
                files_found: scan.files_found,
                files_indexed: scan.files_indexed,
                files_ignored: scan.files_ignored,
                bytes_hashed: scan.bytes_hashed,
                scan_warnings: scan.warnings.iter().map(ToString::to_string).collect(),
                scan_duration_ms: u64::try_from(scan.elapsed.as_millis()).unwrap_or(u64::MAX),
                duplicate_groups: report.stats.groups,
                duplicates_found: report.stats.duplicates,
                relocated: report.moved_count(),
                failed: report.failure_count(),
                dry_run: report.dry_run,
                interrupted: report.interrupted,
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors while producing JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// Serialization failed
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing failed
    #[error("I/O error writing JSON: {0}")]
    Io(#[from] std::io::Error),
}
