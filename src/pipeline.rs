//! Scan and resolve orchestration.
//!
//! # Phases
//!
//! 1. **Skip check**: a populated index means a previous scan committed;
//!    the scan is skipped and the stored records are reused.
//! 2. **Walk**: the whole tree is enumerated first so the total byte count
//!    is known before hashing starts.
//! 3. **Hash + index**: every file is hashed and inserted inside one index
//!    transaction. With `hash_threads > 1` a rayon pool hashes in parallel
//!    and sends results over a channel to the calling thread, which is the
//!    only writer.
//! 4. **Resolve**: duplicate groups are read back from the index and
//!    relocated.
//!
//! Unreadable subtrees and files are skipped with a warning. An index
//! failure or a shutdown request during phase 3 rolls the whole scan back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;

use crate::duplicates::{RelocationReport, Relocator};
use crate::index::{FileIndex, FileRecord, IndexError, ScanWriter};
use crate::progress::{Estimator, ProgressObserver};
use crate::scanner::path_utils::absolutize;
use crate::scanner::{
    EnumerationError, FileEntry, Hash, Hasher, HashingError, ScanWarning, Walker, WalkerConfig,
    DEFAULT_CHUNK_SIZE,
};

/// Fatal pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The index could not be read or the scan transaction failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Shutdown was requested; the scan was rolled back.
    #[error("operation interrupted")]
    Interrupted,

    /// The hashing thread pool could not be created.
    #[error("failed to create hashing thread pool: {0}")]
    HashPool(#[from] rayon::ThreadPoolBuildError),
}

/// Tunables for the scan phase.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Walker behaviour
    pub walker: WalkerConfig,
    /// Hashing threads; 1 hashes on the calling thread
    pub hash_threads: usize,
    /// Read size per chunk
    pub chunk_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            hash_threads: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What the scan phase did.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// The index was already populated and no scan ran
    pub skipped: bool,
    /// Regular files found by the walk
    pub files_found: usize,
    /// Records stored by this scan
    pub files_indexed: usize,
    /// Records dropped because their id was already present
    pub files_ignored: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Skipped subtrees and files
    pub warnings: Vec<ScanWarning>,
    /// Wall time of the scan phase
    pub elapsed: Duration,
}

impl ScanSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Result of a full run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Scan phase summary
    pub scan: ScanSummary,
    /// Relocation phase report
    pub report: RelocationReport,
}

impl PipelineOutcome {
    /// Whether anything was skipped or failed along the way.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.scan.warnings.is_empty() || !self.report.failures.is_empty()
    }
}

/// Drives a scan root through walk, hash, index and relocation.
#[derive(Debug, Clone)]
pub struct Pipeline {
    scan_root: PathBuf,
    duplicates_root: PathBuf,
    options: ScanOptions,
    hasher: Hasher,
    dry_run: bool,
    shutdown_flag: Arc<AtomicBool>,
}

impl Pipeline {
    /// Pipeline with default options.
    ///
    /// Relative roots are resolved against the current directory.
    pub fn new(scan_root: impl AsRef<Path>, duplicates_root: impl AsRef<Path>) -> Self {
        Self {
            scan_root: absolutize(scan_root.as_ref()),
            duplicates_root: absolutize(duplicates_root.as_ref()),
            options: ScanOptions::default(),
            hasher: Hasher::new(),
            dry_run: false,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the scan options.
    #[must_use]
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.hasher = Hasher::new().with_chunk_size(options.chunk_size);
        self.options = options;
        self
    }

    /// Plan relocations without moving files.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Share a shutdown flag with the pipeline.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Scan then resolve.
    ///
    /// # Errors
    ///
    /// See [`scan`](Self::scan) and [`resolve`](Self::resolve).
    pub fn run(
        &self,
        index: &mut FileIndex,
        observer: &dyn ProgressObserver,
    ) -> Result<PipelineOutcome, PipelineError> {
        let scan = self.scan(index, observer)?;
        let report = self.resolve(index, observer)?;
        Ok(PipelineOutcome { scan, report })
    }

    /// Populate `index` from the scan root unless it already holds records.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Interrupted`] if shutdown was requested
    /// (nothing from this scan is kept), [`PipelineError::Index`] if the
    /// transaction failed (the index is unchanged), or
    /// [`PipelineError::HashPool`] if worker threads cannot be started.
    pub fn scan(
        &self,
        index: &mut FileIndex,
        observer: &dyn ProgressObserver,
    ) -> Result<ScanSummary, PipelineError> {
        if index.is_populated()? {
            log::info!(
                "Index already holds {} record(s), skipping scan",
                index.record_count()?
            );
            observer.on_scan_complete(0);
            return Ok(ScanSummary::skipped());
        }

        let started = Instant::now();
        log::info!("Scanning {}", self.scan_root.display());

        let walker = Walker::new(&self.scan_root, self.options.walker.clone())
            .with_shutdown_flag(Arc::clone(&self.shutdown_flag));
        let outcome = walker.collect_files();
        if self.is_shutdown_requested() {
            log::info!("Walk interrupted by shutdown signal");
            return Err(PipelineError::Interrupted);
        }
        for warning in &outcome.warnings {
            log::warn!("Skipped during walk: {}", warning);
        }
        log::info!(
            "Found {} file(s), {} to hash",
            outcome.files.len(),
            bytesize::ByteSize(outcome.total_bytes)
        );
        observer.on_walk_complete(outcome.files.len(), outcome.total_bytes);

        let estimator = Estimator::new(outcome.total_bytes);
        let mut summary = ScanSummary {
            files_found: outcome.files.len(),
            warnings: outcome
                .warnings
                .into_iter()
                .map(ScanWarning::from)
                .collect(),
            ..ScanSummary::default()
        };

        let hash_warnings = index.write_scan(|writer| {
            let warnings = if self.options.hash_threads > 1 {
                self.hash_parallel(&outcome.files, writer, &estimator, observer)?
            } else {
                self.hash_sequential(&outcome.files, writer, &estimator, observer)?
            };
            if self.is_shutdown_requested() {
                log::info!("Scan interrupted by shutdown signal, rolling back");
                return Err(PipelineError::Interrupted);
            }
            summary.files_indexed = writer.inserted();
            summary.files_ignored = writer.ignored();
            Ok(warnings)
        })?;

        summary.warnings.extend(hash_warnings);
        summary.bytes_hashed = estimator.processed();
        summary.elapsed = started.elapsed();

        log::info!(
            "Indexed {} file(s) in {:.2?} ({} warning(s))",
            summary.files_indexed,
            summary.elapsed,
            summary.warnings.len()
        );
        observer.on_scan_complete(summary.files_indexed);
        Ok(summary)
    }

    /// Relocate every duplicate recorded in `index`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Index`] if the groups cannot be read.
    /// Per-file relocation problems are reported, not returned.
    pub fn resolve(
        &self,
        index: &FileIndex,
        observer: &dyn ProgressObserver,
    ) -> Result<RelocationReport, PipelineError> {
        let groups = index.duplicate_groups()?;
        log::info!("Resolving {} duplicate group(s)", groups.len());

        let relocator = Relocator::new(&self.scan_root, &self.duplicates_root)
            .with_dry_run(self.dry_run)
            .with_shutdown_flag(Arc::clone(&self.shutdown_flag));
        Ok(relocator.resolve(&groups, observer))
    }

    fn hash_sequential(
        &self,
        files: &[FileEntry],
        writer: &mut ScanWriter<'_>,
        estimator: &Estimator,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<ScanWarning>, PipelineError> {
        let mut warnings = Vec::new();
        for file in files {
            if self.is_shutdown_requested() {
                return Err(PipelineError::Interrupted);
            }
            let result = self.hash_one(file, estimator, observer);
            store_result(file, result, writer, &mut warnings)?;
        }
        Ok(warnings)
    }

    fn hash_parallel(
        &self,
        files: &[FileEntry],
        writer: &mut ScanWriter<'_>,
        estimator: &Estimator,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<ScanWarning>, PipelineError> {
        let threads = self.options.hash_threads;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("dupestash-hash-{}", i))
            .build()?;
        log::debug!("Hashing with {} worker thread(s)", threads);

        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::sync_channel::<(&FileEntry, Result<Hash, HashingError>)>(threads * 4);

        std::thread::scope(|scope| {
            let pool = &pool;
            let abort = &abort;
            scope.spawn(move || {
                pool.install(|| {
                    files.par_iter().for_each_with(tx, |tx, file| {
                        if abort.load(Ordering::Relaxed) || self.is_shutdown_requested() {
                            return;
                        }
                        let result = self.hash_one(file, estimator, observer);
                        if tx.send((file, result)).is_err() {
                            abort.store(true, Ordering::Relaxed);
                        }
                    });
                });
            });

            // Receiver is consumed here; returning early drops it and
            // unblocks any worker waiting on a full channel.
            let mut warnings = Vec::new();
            for (file, result) in rx {
                if let Err(e) = store_result(file, result, writer, &mut warnings) {
                    abort.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
            Ok(warnings)
        })
    }

    fn hash_one(
        &self,
        file: &FileEntry,
        estimator: &Estimator,
        observer: &dyn ProgressObserver,
    ) -> Result<Hash, HashingError> {
        observer.on_file_start(&file.path, file.size);
        let per_file = Estimator::new(file.size);
        let mut reported = 0u64;

        let result = self.hasher.hash_with_progress(&file.path, |read| {
            let overall = estimator.advance(read.saturating_sub(reported));
            reported = read;
            let current = per_file.set_processed(read);
            observer.on_file_progress(&file.path, &current, &overall);
        });

        if result.is_ok() {
            log::trace!("Hashed {}", file.path.display());
        }
        observer.on_file_complete(&file.path, &estimator.snapshot());
        result
    }
}

fn store_result(
    file: &FileEntry,
    result: Result<Hash, HashingError>,
    writer: &mut ScanWriter<'_>,
    warnings: &mut Vec<ScanWarning>,
) -> Result<(), PipelineError> {
    match result {
        Ok(hash) => match FileRecord::new(&file.path, &hash) {
            Some(record) => {
                if !writer.insert(&record)? {
                    log::warn!(
                        "Skipping file, normalized path already indexed: {}",
                        file.path.display()
                    );
                    warnings.push(ScanWarning::IdCollision(file.path.clone()));
                }
            }
            None => {
                let warning = EnumerationError::NonUtf8Path(file.path.clone());
                log::warn!("Skipping file: {}", warning);
                warnings.push(warning.into());
            }
        },
        Err(e) => {
            log::warn!("Skipping file: {}", e);
            warnings.push(e.into());
        }
    }
    Ok(())
}
