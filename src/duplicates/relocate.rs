//! Relocation of duplicate files into a mirrored tree.
//!
//! # Overview
//!
//! For every [`DuplicateGroup`] the kept file stays where it is and each
//! other member is renamed to `<duplicates_root>/<path relative to the scan
//! root>`, creating intermediate directories as needed.
//!
//! Relocation is best effort: a file that cannot be moved (missing, target
//! already occupied, permission denied, different filesystem) is recorded
//! in [`RelocationReport::failures`] and left in place, and processing
//! continues with the next file.
//!
//! # Example
//!
//! ```no_run
//! use dupestash::duplicates::Relocator;
//! use dupestash::index::FileIndex;
//! use dupestash::progress::SilentObserver;
//! use std::path::Path;
//!
//! let index = FileIndex::open(Path::new("/data/photos.db")).unwrap();
//! let groups = index.duplicate_groups().unwrap();
//!
//! let relocator = Relocator::new("/data/photos", "/data/photos_duplicates");
//! let report = relocator.resolve(&groups, &SilentObserver);
//! for (kept, moved) in report.kept_map() {
//!     println!("{} <- {} duplicate(s)", kept.display(), moved.len());
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::groups::{DuplicateGroup, GroupingStats};
use crate::progress::ProgressObserver;
use crate::scanner::path_utils::absolutize;

/// Why a single duplicate could not be relocated.
#[derive(Debug, Error)]
pub enum RelocationError {
    /// The duplicate vanished after the scan.
    #[error("source file no longer exists: {0}")]
    SourceMissing(PathBuf),

    /// Something already occupies the target path.
    #[error("target already exists: {target} (source {source_path})")]
    TargetExists {
        /// File that was to be moved
        source_path: PathBuf,
        /// Occupied destination
        target: PathBuf,
    },

    /// The duplicate does not live under the scan root.
    #[error("{path} is not inside scan root {root}")]
    OutsideRoot {
        /// Offending path
        path: PathBuf,
        /// Scan root
        root: PathBuf,
    },

    /// An intermediate directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The move was refused by the filesystem.
    #[error("permission denied moving {0}")]
    PermissionDenied(PathBuf),

    /// Source and target are on different filesystems.
    #[error("cannot move {source_path} to {target}: different filesystems")]
    CrossDevice {
        /// File that was to be moved
        source_path: PathBuf,
        /// Destination on the other filesystem
        target: PathBuf,
    },

    /// Any other I/O failure.
    #[error("failed to move {path}: {source}")]
    Io {
        /// File that was to be moved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl RelocationError {
    /// The path this error is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::SourceMissing(p) | Self::PermissionDenied(p) => p,
            Self::TargetExists { source_path, .. } | Self::CrossDevice { source_path, .. } => {
                source_path
            }
            Self::OutsideRoot { path, .. }
            | Self::CreateDir { path, .. }
            | Self::Io { path, .. } => path,
        }
    }

    fn from_rename(source: &Path, target: &Path, e: io::Error) -> Self {
        if is_cross_device(&e) {
            return Self::CrossDevice {
                source_path: source.to_path_buf(),
                target: target.to_path_buf(),
            };
        }
        match e.kind() {
            io::ErrorKind::NotFound => Self::SourceMissing(source.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(source.to_path_buf()),
            io::ErrorKind::AlreadyExists => Self::TargetExists {
                source_path: source.to_path_buf(),
                target: target.to_path_buf(),
            },
            _ => Self::Io {
                path: source.to_path_buf(),
                source: e,
            },
        }
    }
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV is 18 on Linux and the BSDs
    e.raw_os_error() == Some(18)
}

#[cfg(windows)]
fn is_cross_device(e: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    e.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

/// One successfully relocated (or, in a dry run, planned) move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocatedFile {
    /// Original location
    pub from: PathBuf,
    /// Location under the duplicates root
    pub to: PathBuf,
}

/// Outcome for one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedGroup {
    /// Content hash (hex) shared by the group
    pub hash: String,
    /// File left in place
    pub kept: PathBuf,
    /// Duplicates that were moved, in resolution order
    pub relocated: Vec<RelocatedFile>,
}

/// Result of resolving a batch of duplicate groups.
#[derive(Debug, Default)]
pub struct RelocationReport {
    /// One entry per processed group, in resolution order
    pub groups: Vec<ResolvedGroup>,
    /// Duplicates that stayed in place, with the reason
    pub failures: Vec<RelocationError>,
    /// Whether no file was actually moved
    pub dry_run: bool,
    /// Whether shutdown stopped the batch early
    pub interrupted: bool,
    /// Size of the input batch, including groups not reached
    pub stats: GroupingStats,
}

impl RelocationReport {
    /// Kept path → relocated duplicate paths (their new locations).
    #[must_use]
    pub fn kept_map(&self) -> BTreeMap<PathBuf, Vec<PathBuf>> {
        self.groups
            .iter()
            .map(|g| {
                (
                    g.kept.clone(),
                    g.relocated.iter().map(|r| r.to.clone()).collect(),
                )
            })
            .collect()
    }

    /// Number of files moved.
    #[must_use]
    pub fn moved_count(&self) -> usize {
        self.groups.iter().map(|g| g.relocated.len()).sum()
    }

    /// Number of files that could not be moved.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether every duplicate was handled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.interrupted
    }

    /// Human-readable one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would move" } else { "Moved" };
        let mut line = format!(
            "{} {} duplicate(s) from {} group(s)",
            verb,
            self.moved_count(),
            self.groups.len()
        );
        if !self.failures.is_empty() {
            line.push_str(&format!(", {} failed", self.failures.len()));
        }
        if self.interrupted {
            line.push_str(" (interrupted)");
        }
        line
    }
}

/// Moves duplicates from the scan root into the duplicates root.
#[derive(Debug, Clone)]
pub struct Relocator {
    scan_root: PathBuf,
    duplicates_root: PathBuf,
    dry_run: bool,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Relocator {
    /// Create a relocator mirroring paths from `scan_root` into
    /// `duplicates_root`. Relative roots are resolved against the current
    /// directory, matching the absolute paths stored in the index.
    pub fn new(scan_root: impl AsRef<Path>, duplicates_root: impl AsRef<Path>) -> Self {
        Self {
            scan_root: absolutize(scan_root.as_ref()),
            duplicates_root: absolutize(duplicates_root.as_ref()),
            dry_run: false,
            shutdown_flag: None,
        }
    }

    /// Plan moves without touching the filesystem.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Stop between files once `flag` is set.
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

    /// Where `source` goes: its path relative to the scan root, rejoined
    /// under the duplicates root.
    ///
    /// # Errors
    ///
    /// Returns [`RelocationError::OutsideRoot`] if `source` is not under the
    /// scan root.
    pub fn target_for(&self, source: &Path) -> Result<PathBuf, RelocationError> {
        let relative = source
            .strip_prefix(&self.scan_root)
            .map_err(|_| RelocationError::OutsideRoot {
                path: source.to_path_buf(),
                root: self.scan_root.clone(),
            })?;
        if relative.as_os_str().is_empty() {
            return Err(RelocationError::OutsideRoot {
                path: source.to_path_buf(),
                root: self.scan_root.clone(),
            });
        }
        Ok(self.duplicates_root.join(relative))
    }

    /// Relocate every duplicate of every group.
    ///
    /// Never fails as a whole; per-file problems end up in
    /// [`RelocationReport::failures`].
    pub fn resolve(
        &self,
        groups: &[DuplicateGroup],
        observer: &dyn ProgressObserver,
    ) -> RelocationReport {
        let stats = GroupingStats::from_groups(groups);
        observer.on_relocate_start(stats.duplicates);

        let mut report = RelocationReport {
            dry_run: self.dry_run,
            stats,
            ..RelocationReport::default()
        };

        'groups: for group in groups {
            let mut resolved = ResolvedGroup {
                hash: group.hash.clone(),
                kept: group.kept.path(),
                relocated: Vec::with_capacity(group.duplicates.len()),
            };

            for duplicate in &group.duplicates {
                if self.is_shutdown_requested() {
                    log::info!("Relocation interrupted, stopping");
                    report.interrupted = true;
                    report.groups.push(resolved);
                    break 'groups;
                }

                let source = duplicate.path();
                match self.relocate_one(&source) {
                    Ok(target) => {
                        log::debug!("{} -> {}", source.display(), target.display());
                        observer.on_relocated(&source, &target);
                        resolved.relocated.push(RelocatedFile {
                            from: source,
                            to: target,
                        });
                    }
                    Err(e) => {
                        log::warn!("Skipping duplicate: {}", e);
                        report.failures.push(e);
                    }
                }
            }

            report.groups.push(resolved);
        }

        observer.on_relocate_complete(report.moved_count(), report.failure_count());
        log::info!("{}", report.summary());
        report
    }

    /// Move one file to its mirrored location, returning the target.
    ///
    /// # Errors
    ///
    /// Returns a [`RelocationError`] describing why the file stayed put.
    pub fn relocate_one(&self, source: &Path) -> Result<PathBuf, RelocationError> {
        let target = self.target_for(source)?;

        match fs::symlink_metadata(source) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Moved by an earlier run against the same index
                if fs::symlink_metadata(&target).is_ok() {
                    log::debug!("Already relocated: {}", target.display());
                    return Ok(target);
                }
                return Err(RelocationError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => return Err(RelocationError::from_rename(source, &target, e)),
        }

        if fs::symlink_metadata(&target).is_ok() {
            return Err(RelocationError::TargetExists {
                source_path: source.to_path_buf(),
                target,
            });
        }

        if self.dry_run {
            return Ok(target);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| RelocationError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        move_no_replace(source, &target)
            .map_err(|e| RelocationError::from_rename(source, &target, e))?;
        Ok(target)
    }
}

/// Move `source` to `target`, failing with `AlreadyExists` instead of
/// replacing a file that appeared at `target` in the meantime.
///
/// A hard link claims the target atomically; the source name is removed
/// afterwards. Filesystems without hard links fall back to a checked
/// `rename`.
fn move_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                if let Err(undo) = fs::remove_file(target) {
                    log::warn!("Failed to remove link {}: {}", target.display(), undo);
                }
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists
            || e.kind() == io::ErrorKind::NotFound
            || is_cross_device(&e) =>
        {
            Err(e)
        }
        Err(e) => {
            log::debug!(
                "Hard link unavailable for {} ({}), renaming",
                source.display(),
                e
            );
            // rename() replaces existing files on Unix
            if fs::symlink_metadata(target).is_ok() {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            fs::rename(source, target)
        }
    }
}
