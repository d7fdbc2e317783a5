//! Directory walker implementation using walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a directory
//! tree and collecting the regular files that feed the hashing pass.
//! walkdir keeps its own stack of open directories, so depth is bounded
//! by the heap rather than the call stack.
//!
//! # Features
//!
//! - Deterministic output (entries sorted by file name within a directory)
//! - Symlinks are skipped unless following is enabled; cycles are reported
//! - Unreadable subtrees become per-entry errors, the walk continues
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use dupestash::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let outcome = walker.collect_files();
//! println!(
//!     "{} files, {} bytes, {} warnings",
//!     outcome.files.len(),
//!     outcome.total_bytes,
//!     outcome.warnings.len()
//! );
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use super::path_utils::absolutize;
use super::{EnumerationError, FileEntry, WalkerConfig};

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk (absolute)
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

/// Everything the first pass of a scan produces.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Regular files in walk order
    pub files: Vec<FileEntry>,
    /// Sum of all file sizes, the denominator for overall progress
    pub total_bytes: u64,
    /// Entries and subtrees that were skipped
    pub warnings: Vec<EnumerationError>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// Relative paths are made absolute against the current directory so
    /// that every yielded [`FileEntry`] carries an absolute path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: absolutize(path),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker stops yielding entries.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
    }

    /// Walk the directory tree, yielding file entries.
    ///
    /// Errors are yielded as [`EnumerationError`] values rather than
    /// stopping iteration; the affected subtree is simply not descended.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, EnumerationError>> + '_ {
        let skip_hidden = self.config.skip_hidden;

        WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && Self::is_hidden(entry)))
            .take_while(move |_| {
                let stop = self.is_shutdown_requested();
                if stop {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                }
                !stop
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => Some(Err(self.handle_walkdir_error(e))),
            })
    }

    /// Run the walk to completion, folding sizes and warnings.
    #[must_use]
    pub fn collect_files(&self) -> WalkOutcome {
        self.walk()
            .fold(WalkOutcome::default(), |mut outcome, result| {
                match result {
                    Ok(file) => {
                        outcome.total_bytes += file.size;
                        outcome.files.push(file);
                    }
                    Err(e) => outcome.warnings.push(e),
                }
                outcome
            })
    }

    fn process_entry(&self, entry: &DirEntry) -> Option<Result<FileEntry, EnumerationError>> {
        let file_type = entry.file_type();

        if file_type.is_dir() {
            return None;
        }

        // With follow_links enabled walkdir reports the target's type
        if file_type.is_symlink() {
            log::trace!("Skipping symlink: {}", entry.path().display());
            return None;
        }

        if !file_type.is_file() {
            log::trace!("Skipping special file: {}", entry.path().display());
            return None;
        }

        let path = entry.path();
        if path.to_str().is_none() {
            log::warn!("Skipping non UTF-8 path: {}", path.display());
            return Some(Err(EnumerationError::NonUtf8Path(path.to_path_buf())));
        }

        match entry.metadata() {
            Ok(metadata) => Some(Ok(FileEntry::new(path.to_path_buf(), metadata.len()))),
            Err(e) => Some(Err(self.handle_walkdir_error(e))),
        }
    }

    fn handle_walkdir_error(&self, error: walkdir::Error) -> EnumerationError {
        use std::io::ErrorKind;

        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if let Some(ancestor) = error.loop_ancestor() {
            log::warn!(
                "Symlink loop at {} (points back to {})",
                path.display(),
                ancestor.display()
            );
        }

        match error.io_error().map(std::io::Error::kind) {
            Some(ErrorKind::PermissionDenied) => {
                log::warn!("Permission denied: {}", path.display());
                EnumerationError::PermissionDenied(path)
            }
            Some(ErrorKind::NotFound) => {
                log::debug!("Path not found (may have been deleted): {}", path.display());
                EnumerationError::NotFound(path)
            }
            _ => {
                log::warn!("Walker error for {}: {}", path.display(), error);
                let source = error
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                EnumerationError::Io { path, source }
            }
        }
    }
}
