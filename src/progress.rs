//! Progress estimation and rendering.
//!
//! The [`Estimator`] is a plain state object: it tracks processed units
//! against a known total and computes rate and ETA on demand. It never
//! draws anything. Rendering happens in a [`ProgressObserver`], which the
//! scan pipeline notifies with [`ProgressSnapshot`] values; [`Progress`]
//! draws them with indicatif and [`SilentObserver`] ignores them.
//!
//! One estimator covers the whole scan (bytes across all files); a nested
//! estimator with the same contract is created per file while it is
//! being hashed.
//!
//! All arithmetic is clamped. A zero total reports 100 %, a zero elapsed
//! time reports a rate of 0 and no ETA, and overshooting the total is
//! reported as complete.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Read-only view of an estimator at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Units processed so far (clamped to `total`)
    pub processed: u64,
    /// Known total
    pub total: u64,
    /// Completion in percent, `0.0..=100.0`
    pub percent: f64,
    /// Time since the estimator was created
    pub elapsed: Duration,
    /// Units per second since the start
    pub average_rate: f64,
    /// Units per second since the previous update
    pub instant_rate: f64,
    /// Estimated time remaining, `None` while no rate is known
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    fn compute(processed: u64, total: u64, elapsed: Duration, instant_rate: f64) -> Self {
        let processed = processed.min(total);
        let secs = elapsed.as_secs_f64();

        let percent = if total == 0 {
            100.0
        } else {
            (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };

        let average_rate = if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        };

        let remaining = total - processed;
        let eta = if remaining == 0 {
            Some(Duration::ZERO)
        } else if average_rate > 0.0 {
            Duration::try_from_secs_f64(remaining as f64 / average_rate).ok()
        } else {
            None
        };

        Self {
            processed,
            total,
            percent,
            elapsed,
            average_rate,
            instant_rate: if instant_rate.is_finite() {
                instant_rate.max(0.0)
            } else {
                0.0
            },
            eta,
        }
    }

    /// Whether everything has been processed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

#[derive(Debug)]
struct Sample {
    at: Instant,
    processed: u64,
    rate: f64,
}

/// Running rate/ETA estimator over a known total.
///
/// The processed counter is atomic so hashing workers can advance one
/// shared estimator without a lock on the hot path.
#[derive(Debug)]
pub struct Estimator {
    total: u64,
    started: Instant,
    processed: AtomicU64,
    last: Mutex<Sample>,
}

impl Estimator {
    /// Create an estimator starting now.
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self::starting_at(total, Instant::now())
    }

    fn starting_at(total: u64, started: Instant) -> Self {
        Self {
            total,
            started,
            processed: AtomicU64::new(0),
            last: Mutex::new(Sample {
                at: started,
                processed: 0,
                rate: 0.0,
            }),
        }
    }

    /// Known total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Units processed so far (not clamped).
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Add `amount` to the processed counter and return a fresh snapshot.
    pub fn advance(&self, amount: u64) -> ProgressSnapshot {
        let processed = self
            .processed
            .fetch_add(amount, Ordering::Relaxed)
            .saturating_add(amount);
        self.observe_at(processed, Instant::now())
    }

    /// Set the processed counter to an absolute value.
    ///
    /// Used by per-file estimators, which receive cumulative byte counts.
    pub fn set_processed(&self, processed: u64) -> ProgressSnapshot {
        self.processed.store(processed, Ordering::Relaxed);
        self.observe_at(processed, Instant::now())
    }

    /// Snapshot without changing the counter.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        ProgressSnapshot::compute(
            self.processed(),
            self.total,
            self.started.elapsed(),
            last.rate,
        )
    }

    fn observe_at(&self, processed: u64, now: Instant) -> ProgressSnapshot {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        let dt = now.saturating_duration_since(last.at).as_secs_f64();
        if dt > 0.0 && processed >= last.processed {
            last.rate = (processed - last.processed) as f64 / dt;
            last.at = now;
            last.processed = processed;
        }

        ProgressSnapshot::compute(
            processed,
            self.total,
            now.saturating_duration_since(self.started),
            last.rate,
        )
    }
}

/// Receiver of pipeline progress.
///
/// Every method has a no-op default. Implementations must not block for
/// long: they are called from the hashing loop.
pub trait ProgressObserver: Send + Sync {
    /// The first pass finished; `total_bytes` is the overall denominator.
    fn on_walk_complete(&self, _files: usize, _total_bytes: u64) {}

    /// Hashing of one file is about to start.
    fn on_file_start(&self, _path: &Path, _size: u64) {}

    /// A chunk of `path` was consumed.
    fn on_file_progress(&self, _path: &Path, _file: &ProgressSnapshot, _overall: &ProgressSnapshot) {
    }

    /// Hashing of one file ended (successfully or not).
    fn on_file_complete(&self, _path: &Path, _overall: &ProgressSnapshot) {}

    /// The scan transaction committed.
    fn on_scan_complete(&self, _indexed: usize) {}

    /// Relocation is about to move `total` duplicates.
    fn on_relocate_start(&self, _total: usize) {}

    /// One duplicate was moved.
    fn on_relocated(&self, _from: &Path, _to: &Path) {}

    /// Relocation ended.
    fn on_relocate_complete(&self, _moved: usize, _failed: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {}

/// Terminal renderer using indicatif.
///
/// Shows one overall byte bar plus one bar per file being hashed.
pub struct Progress {
    multi: MultiProgress,
    overall: Mutex<Option<ProgressBar>>,
    files: Mutex<HashMap<PathBuf, ProgressBar>>,
    relocate: Mutex<Option<ProgressBar>>,
}

impl Progress {
    /// Create a renderer. With `quiet` nothing is drawn.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let target = if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            overall: Mutex::new(None),
            files: Mutex::new(HashMap::new()),
            relocate: Mutex::new(None),
        }
    }

    fn overall_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "Progress: [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn file_style() -> ProgressStyle {
        ProgressStyle::with_template("Hashing: {prefix} {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn relocate_style() -> ProgressStyle {
        ProgressStyle::with_template("Moving: [{bar:40.green/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }
}

/// Rate and ETA suffix shown next to a bar.
fn rate_message(snapshot: &ProgressSnapshot) -> String {
    let eta = snapshot
        .eta
        .map_or_else(|| "unknown".to_string(), format_time_remaining);
    format!(
        "- {}/s - Est. {} remaining",
        ByteSize(snapshot.average_rate as u64),
        eta
    )
}

impl ProgressObserver for Progress {
    fn on_walk_complete(&self, files: usize, total_bytes: u64) {
        let pb = self.multi.add(ProgressBar::new(total_bytes));
        pb.set_style(Self::overall_style());
        pb.set_message(format!("{} files", files));
        *self.overall.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
    }

    fn on_file_start(&self, path: &Path, size: u64) {
        let pb = self.multi.add(ProgressBar::new(size));
        pb.set_style(Self::file_style());
        pb.set_prefix(truncate_path(&path.to_string_lossy(), 40));
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), pb);
    }

    fn on_file_progress(&self, path: &Path, file: &ProgressSnapshot, overall: &ProgressSnapshot) {
        if let Some(pb) = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            pb.set_position(file.processed);
            pb.set_message(rate_message(file));
        }
        if let Some(pb) = &*self.overall.lock().unwrap_or_else(PoisonError::into_inner) {
            pb.set_position(overall.processed);
            pb.set_message(rate_message(overall));
        }
    }

    fn on_file_complete(&self, path: &Path, overall: &ProgressSnapshot) {
        if let Some(pb) = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
        {
            pb.finish_and_clear();
            self.multi.remove(&pb);
        }
        if let Some(pb) = &*self.overall.lock().unwrap_or_else(PoisonError::into_inner) {
            pb.set_position(overall.processed);
        }
    }

    fn on_scan_complete(&self, indexed: usize) {
        if let Some(pb) = self
            .overall
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pb.finish_with_message(format!("{} files indexed", indexed));
        }
    }

    fn on_relocate_start(&self, total: usize) {
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::relocate_style());
        *self.relocate.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
    }

    fn on_relocated(&self, from: &Path, _to: &Path) {
        if let Some(pb) = &*self.relocate.lock().unwrap_or_else(PoisonError::into_inner) {
            pb.inc(1);
            pb.set_message(truncate_path(&from.to_string_lossy(), 40));
        }
    }

    fn on_relocate_complete(&self, moved: usize, failed: usize) {
        if let Some(pb) = self
            .relocate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pb.finish_with_message(format!("{} moved, {} failed", moved, failed));
        }
    }
}

/// Human-readable remaining time ("42 seconds", "3 minutes", "1.5 hours").
#[must_use]
pub fn format_time_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs_f64();
    if secs < 60.0 {
        format!("{} seconds", secs.round() as u64)
    } else if secs < 3600.0 {
        let minutes = (secs / 60.0).round() as u64;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        let hours = (secs / 360.0).round() / 10.0;
        format!("{} hour{}", hours, if hours == 1.0 { "" } else { "s" })
    }
}

/// Truncate a path for display in a progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len.saturating_sub(max_len.saturating_sub(3)))
            .collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
