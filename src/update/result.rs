//! What an update run produced.

use crate::plan::PlanSummary;
use crate::{Error, ErrorCategory, Result};
use std::path::PathBuf;
use std::time::Duration;

/// A non-fatal per-item problem: an unreadable file that was skipped, a scan
/// error, or an item whose size changed while it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Physical path of the item.
    pub path: PathBuf,
    /// OS error code, when the failure came from the OS.
    pub os_code: Option<i32>,
    /// Human-readable description.
    pub message: String,
}

impl ItemFailure {
    /// Creates a failure from an I/O error.
    pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            os_code: err.raw_os_error(),
            message: err.to_string(),
        }
    }

    /// Creates a failure with a message only.
    pub fn message(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            os_code: None,
            message: message.into(),
        }
    }
}

/// Counts gathered while writing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// What the plan asked for.
    pub plan: PlanSummary,
    /// Items the codec reported as written.
    pub items_written: u64,
    /// Items skipped because they could not be read.
    pub items_skipped: u64,
    /// Bytes read from disk and the old archive.
    pub bytes_in: u64,
    /// Bytes written to the output.
    pub bytes_out: u64,
    /// Disk files removed by `delete_after_compressing`.
    pub files_deleted: u64,
}

/// Result of a successful update run.
#[must_use = "update outcomes carry per-item failures that should be checked"]
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Final path of the archive (the base path for volume sets).
    pub archive_path: PathBuf,
    /// Total size of the output in bytes.
    pub output_size: u64,
    /// Number of volumes; 0 for a single file.
    pub volume_count: u32,
    /// Size of each volume.
    pub volume_sizes: Vec<u64>,
    /// Non-fatal problems.
    pub failures: Vec<ItemFailure>,
    /// Counters.
    pub stats: UpdateStats,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl UpdateOutcome {
    /// Returns true if no item was skipped or damaged.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A flat summary of one run, successful or not, for front ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// True if the new archive is in place.
    pub success: bool,
    /// Category of the fatal error, if any.
    pub category: Option<ErrorCategory>,
    /// Total output size.
    pub output_size: u64,
    /// Number of volumes; 0 for a single file.
    pub volume_count: u32,
    /// Non-fatal problems, plus the paths of the fatal error.
    pub failures: Vec<ItemFailure>,
    /// Counters.
    pub stats: UpdateStats,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
    /// Message of the fatal error.
    pub message: Option<String>,
}

impl UpdateReport {
    /// Flattens the result of [`ArchiveUpdater::update`](super::ArchiveUpdater::update).
    pub fn from_result(result: &Result<UpdateOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                category: None,
                output_size: outcome.output_size,
                volume_count: outcome.volume_count,
                failures: outcome.failures.clone(),
                stats: outcome.stats,
                elapsed_ms: outcome.elapsed.as_millis() as u64,
                message: None,
            },
            Err(err) => Self::from_error(err),
        }
    }

    fn from_error(err: &Error) -> Self {
        let failures = err
            .paths()
            .into_iter()
            .map(|path| ItemFailure {
                path,
                os_code: err.os_error(),
                message: err.to_string(),
            })
            .collect();
        Self {
            success: false,
            category: Some(err.category()),
            failures,
            message: Some(err.to_string()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_report_from_success() {
        let outcome = UpdateOutcome {
            output_size: 120,
            failures: vec![ItemFailure::message("a.txt", "changed while reading")],
            elapsed: Duration::from_millis(1500),
            ..UpdateOutcome::default()
        };
        let report = UpdateReport::from_result(&Ok(outcome));
        assert!(report.success);
        assert_eq!(report.output_size, 120);
        assert_eq!(report.elapsed_ms, 1500);
        assert_eq!(report.failures.len(), 1);
        assert!(report.message.is_none());
    }

    #[test]
    fn test_report_from_commit_error() {
        let err = Error::Commit {
            temp: "out.tmp".into(),
            target: "out".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let report = UpdateReport::from_result(&Err(err));
        assert!(!report.success);
        assert_eq!(report.category, Some(ErrorCategory::Commit));
        let paths: Vec<_> = report.failures.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("out.tmp"), PathBuf::from("out")]);
        assert!(report.message.unwrap().contains("valid new archive"));
    }

    #[test]
    fn test_item_failure_from_io() {
        let err = io::Error::from_raw_os_error(2);
        let failure = ItemFailure::from_io("x", &err);
        assert_eq!(failure.os_code, Some(2));
    }
}
