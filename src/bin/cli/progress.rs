//! Progress bar implementation for CLI operations.

use arcupdate::codec::OperationResult;
use arcupdate::plan::PlanSummary;
use arcupdate::progress::ItemOperation;
use arcupdate::{UpdateOutcome, UpdateReporter, UpdateStage};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::Path;

/// Progress display for update runs
pub struct CliProgress {
    bar: ProgressBar,
    quiet: bool,
    warnings: usize,
}

impl CliProgress {
    /// Creates a new progress display
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(spinner_style());
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb
        };

        Self {
            bar,
            quiet,
            warnings: 0,
        }
    }

    /// Number of warnings printed so far
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    fn println(&self, line: String) {
        if self.quiet {
            eprintln!("{}", line);
        } else {
            self.bar.println(line);
        }
    }
}

impl UpdateReporter for CliProgress {
    fn on_start_archive(&mut self, path: &Path, exists: bool) {
        let verb = if exists { "Updating" } else { "Creating" };
        self.bar.set_message(format!("{} {}", verb, path.display()));
    }

    fn on_stage(&mut self, stage: UpdateStage) {
        match stage {
            UpdateStage::Writing => {}
            UpdateStage::Committed | UpdateStage::Failed => self.bar.finish_and_clear(),
            _ => self.bar.set_message(stage.as_str().to_string()),
        }
    }

    fn on_plan(&mut self, summary: &PlanSummary) {
        if self.quiet {
            return;
        }
        self.bar.set_length(summary.new_bytes);
        self.bar.set_position(0);
        self.bar.set_style(bar_style());
    }

    fn on_item_start(&mut self, name: &str, operation: ItemOperation, _size: u64) {
        if self.quiet {
            return;
        }
        // Truncate long names
        let display_name = if name.chars().count() > 40 {
            let tail: String = name.chars().rev().take(37).collect::<Vec<_>>().into_iter().rev().collect();
            format!("...{}", tail)
        } else {
            name.to_string()
        };
        self.bar.set_message(format!("{} {}", operation.as_str(), display_name));
    }

    fn on_item_complete(&mut self, name: &str, _operation: ItemOperation, result: OperationResult) {
        if result == OperationResult::DataError {
            self.println(format!("Warning: {} changed while it was read", name));
        }
    }

    fn on_progress(&mut self, in_bytes: u64, _out_bytes: u64, total_bytes: u64) -> bool {
        if total_bytes > 0 {
            self.bar.set_length(total_bytes);
        }
        self.bar.set_position(in_bytes);
        true
    }

    fn on_open_error(&mut self, path: &Path, error: &io::Error) {
        self.warnings += 1;
        self.println(format!("Warning: skipping {}: {}", path.display(), error));
    }

    fn on_finish(&mut self, outcome: &UpdateOutcome) {
        log::debug!(
            "{} written in {:?}",
            outcome.archive_path.display(),
            outcome.elapsed
        );
    }

    fn on_warning(&mut self, message: &str) {
        self.warnings += 1;
        self.println(format!("Warning: {}", message));
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {wide_msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
