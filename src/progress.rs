//! Progress and status reporting for update runs.
//!
//! The orchestrator reports everything a front end may want to show through
//! [`UpdateReporter`]. Every method has an empty default, so a reporter only
//! implements what it needs.
//!
//! - [`NoProgress`]: discards everything.
//! - [`StatisticsReporter`]: collects counts, byte totals and warnings.
//!
//! # Example
//!
//! ```rust,ignore
//! use arcupdate::progress::StatisticsReporter;
//! use arcupdate::update::{ArchiveUpdater, UpdateJob};
//!
//! let mut stats = StatisticsReporter::new();
//! updater.update(&job, &disk_items, &AllowAll, &mut stats)?;
//! println!("{} deleted, {} written", stats.deleted.len(), stats.items_completed);
//! ```

use crate::codec::OperationResult;
use crate::plan::PlanSummary;
use crate::update::UpdateOutcome;
use std::fmt;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

// Floating point byte units for formatting
const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Stage of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStage {
    /// Opening the old archive, enumerating and pairing.
    Planning,
    /// Creating the output file or volumes.
    OpeningOutput,
    /// Running the codec.
    Writing,
    /// Stamping the archive modification time.
    FinalizingTime,
    /// Flushing and closing the output.
    Closing,
    /// Replacing the old archive with the new one.
    Moving,
    /// The new archive is in place.
    Committed,
    /// The run failed; the old archive is untouched.
    Failed,
}

impl UpdateStage {
    /// Returns a short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateStage::Planning => "planning",
            UpdateStage::OpeningOutput => "opening output",
            UpdateStage::Writing => "writing",
            UpdateStage::FinalizingTime => "finalizing time",
            UpdateStage::Closing => "closing",
            UpdateStage::Moving => "moving",
            UpdateStage::Committed => "committed",
            UpdateStage::Failed => "failed",
        }
    }
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to one output item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemOperation {
    /// A disk item new to the archive.
    Add,
    /// A disk item replacing an archive entry.
    Update,
    /// An archive entry passed through.
    Copy,
    /// An archive entry passed through under a new name.
    Rename,
    /// An anti entry.
    Delete,
}

impl ItemOperation {
    /// Returns a one-word label.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemOperation::Add => "add",
            ItemOperation::Update => "update",
            ItemOperation::Copy => "copy",
            ItemOperation::Rename => "rename",
            ItemOperation::Delete => "delete",
        }
    }
}

/// Receives status and progress notifications from an update run.
pub trait UpdateReporter {
    /// Called once per archive before planning.
    ///
    /// `exists` tells whether an archive is being updated or created.
    fn on_start_archive(&mut self, path: &Path, exists: bool) {
        let _ = (path, exists);
    }

    /// Called when the run enters a new stage.
    fn on_stage(&mut self, stage: UpdateStage) {
        let _ = stage;
    }

    /// Called with the plan counts before anything is written.
    fn on_plan(&mut self, summary: &PlanSummary) {
        let _ = summary;
    }

    /// Called once for every archive entry the new archive will not contain.
    fn on_delete(&mut self, name: &str, is_dir: bool) {
        let _ = (name, is_dir);
    }

    /// Called when the codec starts on an item.
    fn on_item_start(&mut self, name: &str, operation: ItemOperation, size: u64) {
        let _ = (name, operation, size);
    }

    /// Called when the codec is done with an item.
    fn on_item_complete(&mut self, name: &str, operation: ItemOperation, result: OperationResult) {
        let _ = (name, operation, result);
    }

    /// Called periodically with bytes read, bytes written and the expected
    /// total of bytes to read.
    ///
    /// Returns `true` to continue or `false` to cancel the run.
    fn on_progress(&mut self, in_bytes: u64, out_bytes: u64, total_bytes: u64) -> bool {
        let _ = (in_bytes, out_bytes, total_bytes);
        true
    }

    /// Called when a disk item cannot be opened and is skipped.
    fn on_open_error(&mut self, path: &Path, error: &io::Error) {
        let _ = (path, error);
    }

    /// Called before the new archive replaces the old one.
    fn on_move(&mut self, temp: &Path, target: &Path) {
        let _ = (temp, target);
    }

    /// Called after a successful run.
    fn on_finish(&mut self, outcome: &UpdateOutcome) {
        let _ = outcome;
    }

    /// Called for any non-fatal problem.
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }
}

/// A reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl UpdateReporter for NoProgress {}

/// Byte progress with timing, for rate and ETA display.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Bytes expected to be read.
    pub total_bytes: u64,
    /// Bytes read so far.
    pub in_bytes: u64,
    /// Bytes written so far.
    pub out_bytes: u64,
    /// Processing start time.
    pub start_time: Instant,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            total_bytes: 0,
            in_bytes: 0,
            out_bytes: 0,
            start_time: Instant::now(),
        }
    }
}

impl ProgressState {
    /// Creates a new progress state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completion percentage (0.0 - 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.in_bytes.min(self.total_bytes) as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Returns elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the read rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            self.in_bytes as f64 / elapsed
        }
    }

    /// Returns estimated time remaining.
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate < 1.0 || self.in_bytes >= self.total_bytes {
            return None;
        }
        let remaining = self.total_bytes - self.in_bytes;
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

/// A reporter that records what happened.
#[derive(Debug, Default, Clone)]
pub struct StatisticsReporter {
    /// Byte progress.
    pub state: ProgressState,
    /// Stages in the order they were entered.
    pub stages: Vec<UpdateStage>,
    /// The plan counts, once known.
    pub plan: Option<PlanSummary>,
    /// Names reported as deleted.
    pub deleted: Vec<String>,
    /// Items the codec finished successfully.
    pub items_completed: u64,
    /// Items that were skipped or changed while being read.
    pub items_failed: u64,
    /// Paths that could not be opened.
    pub open_errors: Vec<String>,
    /// Warnings collected.
    pub warnings: Vec<String>,
    /// Set to request cancellation at the next progress report.
    pub cancel: bool,
}

impl StatisticsReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last stage entered.
    pub fn last_stage(&self) -> Option<UpdateStage> {
        self.stages.last().copied()
    }
}

impl UpdateReporter for StatisticsReporter {
    fn on_start_archive(&mut self, _path: &Path, _exists: bool) {
        self.state = ProgressState::new();
    }

    fn on_stage(&mut self, stage: UpdateStage) {
        self.stages.push(stage);
    }

    fn on_plan(&mut self, summary: &PlanSummary) {
        self.plan = Some(*summary);
        self.state.total_bytes = summary.new_bytes;
    }

    fn on_delete(&mut self, name: &str, _is_dir: bool) {
        self.deleted.push(name.to_string());
    }

    fn on_item_complete(&mut self, _name: &str, _operation: ItemOperation, result: OperationResult) {
        match result {
            OperationResult::Ok => self.items_completed += 1,
            OperationResult::Skipped | OperationResult::DataError => self.items_failed += 1,
        }
    }

    fn on_progress(&mut self, in_bytes: u64, out_bytes: u64, total_bytes: u64) -> bool {
        self.state.total_bytes = total_bytes;
        self.state.in_bytes = in_bytes;
        self.state.out_bytes = out_bytes;
        !self.cancel
    }

    fn on_open_error(&mut self, path: &Path, _error: &io::Error) {
        self.open_errors.push(path.display().to_string());
    }

    fn on_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

impl<R: UpdateReporter + ?Sized> UpdateReporter for &mut R {
    fn on_start_archive(&mut self, path: &Path, exists: bool) {
        (**self).on_start_archive(path, exists)
    }

    fn on_stage(&mut self, stage: UpdateStage) {
        (**self).on_stage(stage)
    }

    fn on_plan(&mut self, summary: &PlanSummary) {
        (**self).on_plan(summary)
    }

    fn on_delete(&mut self, name: &str, is_dir: bool) {
        (**self).on_delete(name, is_dir)
    }

    fn on_item_start(&mut self, name: &str, operation: ItemOperation, size: u64) {
        (**self).on_item_start(name, operation, size)
    }

    fn on_item_complete(&mut self, name: &str, operation: ItemOperation, result: OperationResult) {
        (**self).on_item_complete(name, operation, result)
    }

    fn on_progress(&mut self, in_bytes: u64, out_bytes: u64, total_bytes: u64) -> bool {
        (**self).on_progress(in_bytes, out_bytes, total_bytes)
    }

    fn on_open_error(&mut self, path: &Path, error: &io::Error) {
        (**self).on_open_error(path, error)
    }

    fn on_move(&mut self, temp: &Path, target: &Path) {
        (**self).on_move(temp, target)
    }

    fn on_finish(&mut self, outcome: &UpdateOutcome) {
        (**self).on_finish(outcome)
    }

    fn on_warning(&mut self, message: &str) {
        (**self).on_warning(message)
    }
}

/// Formats bytes as a human-readable string using IEC units (KiB, MiB, GiB).
///
/// ```rust
/// use arcupdate::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let value = bytes as f64;
    if value < BYTES_KB {
        format!("{} B", bytes)
    } else if value < BYTES_MB {
        format!("{:.1} KiB", value / BYTES_KB)
    } else if value < BYTES_GB {
        format!("{:.1} MiB", value / BYTES_MB)
    } else {
        format!("{:.1} GiB", value / BYTES_GB)
    }
}

/// Formats a duration as a human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_state_percentage() {
        let mut state = ProgressState::new();
        state.total_bytes = 200;
        state.in_bytes = 50;
        assert!((state.percentage() - 25.0).abs() < 0.001);
        state.in_bytes = 500;
        assert!((state.percentage() - 100.0).abs() < 0.001);
        assert!(state.eta().is_none());
    }

    #[test]
    fn test_no_progress_never_cancels() {
        let mut progress = NoProgress;
        assert!(progress.on_progress(50, 10, 100));
    }

    #[test]
    fn test_statistics_reporter() {
        let mut stats = StatisticsReporter::new();
        stats.on_stage(UpdateStage::Planning);
        stats.on_plan(&PlanSummary {
            added: 1,
            new_bytes: 10,
            ..PlanSummary::default()
        });
        stats.on_delete("old.txt", false);
        stats.on_item_complete("a", ItemOperation::Add, OperationResult::Ok);
        stats.on_item_complete("b", ItemOperation::Add, OperationResult::Skipped);
        assert!(stats.on_progress(10, 4, 10));

        assert_eq!(stats.last_stage(), Some(UpdateStage::Planning));
        assert_eq!(stats.state.total_bytes, 10);
        assert_eq!(stats.deleted, vec!["old.txt".to_string()]);
        assert_eq!((stats.items_completed, stats.items_failed), (1, 1));

        stats.cancel = true;
        assert!(!stats.on_progress(10, 4, 10));
    }

    #[test]
    fn test_reporter_through_mut_ref() {
        fn drive<R: UpdateReporter>(mut reporter: R) {
            reporter.on_stage(UpdateStage::Writing);
        }
        let mut stats = StatisticsReporter::new();
        drive(&mut stats);
        assert_eq!(stats.stages, vec![UpdateStage::Writing]);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes_iec(500), "500 B");
        assert_eq!(format_bytes_iec(1500), "1.5 KiB");
        assert_eq!(format_bytes_iec(1500 * 1024), "1.5 MiB");
        assert_eq!(format_bytes_iec(1500 * 1024 * 1024), "1.5 GiB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3700)), "1h 1m");
    }
}
