//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Sequential directory walking using walkdir
//! - Streaming content hashing with BLAKE3
//! - Unicode path normalization
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: BLAKE3 file hashing (streaming, chunked)
//! - [`path_utils`]: Path normalization used for record ids
//!
//! # Example
//!
//! ```no_run
//! use dupestash::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;

// Re-export main types
pub use hasher::{hash_to_hex, Hash, Hasher, DEFAULT_CHUNK_SIZE};
pub use walker::Walker;

/// A regular file discovered by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Cycles are detected by walkdir and reported as errors.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,
}

impl WalkerConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(follow_symlinks: bool, skip_hidden: bool) -> Self {
        Self {
            follow_symlinks,
            skip_hidden,
        }
    }
}

/// A subtree or entry that could not be enumerated.
///
/// These are warnings: the walker skips the affected entry and continues.
#[derive(thiserror::Error, Debug)]
pub enum EnumerationError {
    /// Permission was denied when listing a directory or reading metadata.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path vanished between listing and inspection.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The path is not valid UTF-8 and cannot be stored in the index.
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// Any other I/O error while walking.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl EnumerationError {
    /// Path of the entry or subtree that was skipped.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::PermissionDenied(p) | Self::NotFound(p) | Self::NonUtf8Path(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}

/// A file whose content could not be fully read.
///
/// The file is excluded from the index for this scan.
#[derive(thiserror::Error, Debug)]
pub enum HashingError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashingError {
    /// Classify an I/O error raised while hashing `path`.
    #[must_use]
    pub fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path of the file that could not be hashed.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}

/// A non-fatal problem recorded during a scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanWarning {
    /// A subtree or entry was skipped.
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    /// A file was excluded because it could not be hashed.
    #[error(transparent)]
    Hashing(#[from] HashingError),

    /// A file was not indexed because a differently spelled path with the
    /// same normalized form was indexed first.
    #[error("Not indexed, normalized path already recorded: {0}")]
    IdCollision(PathBuf),
}
