//! The update orchestrator.
//!
//! [`ArchiveUpdater`] turns an existing archive (or none), a list of disk
//! items and an [`UpdateJob`] into a new archive that replaces the old one
//! atomically. A run goes through the stages of
//! [`UpdateStage`](crate::progress::UpdateStage):
//!
//! 1. **Planning**: open the old archive, enumerate it, pair it against the
//!    disk items (or apply rename rules) and validate the plan.
//! 2. **OpeningOutput**: create a temporary file or volume set next to the
//!    target (or in the working directory). Without an old archive the
//!    final path is created directly and must not exist.
//! 3. **Writing**: hand the plan to the codec in one call.
//! 4. **FinalizingTime**: stamp the output with the newest entry time.
//! 5. **Closing**: check that no input stream leaked, then flush and close.
//! 6. **Moving**: delete the old archive and move the new one into place.
//!
//! Any failure before the move deletes the temporary output and leaves the
//! old archive untouched.
//!
//! # Example
//!
//! ```rust,no_run
//! use arcupdate::codec::simple::SimpleFormat;
//! use arcupdate::filter::AllowAll;
//! use arcupdate::pair::Policy;
//! use arcupdate::progress::NoProgress;
//! use arcupdate::scan::DirScanner;
//! use arcupdate::update::{ArchiveUpdater, UpdateJob, UpdateOptions};
//!
//! fn main() -> arcupdate::Result<()> {
//!     let disk = DirScanner::new().scan(&["docs"]);
//!     let job = UpdateJob::new("docs.aupk").options(UpdateOptions::new().policy(Policy::Update));
//!     let updater = ArchiveUpdater::new(SimpleFormat::new());
//!     let outcome = updater.update(&job, &disk, &AllowAll, &mut NoProgress)?;
//!     println!("{} bytes, {} failures", outcome.output_size, outcome.failures.len());
//!     Ok(())
//! }
//! ```

mod callback;
mod options;
mod output;
mod result;
mod source;
mod temp;

pub use options::{UpdateJob, UpdateOptions};
pub use result::{ItemFailure, UpdateOutcome, UpdateReport, UpdateStats};
pub use source::{ArchiveSource, DiskSource, ItemSource, StreamRegistry, TrackedStream};

use crate::archive_path::{self, NameMode};
use crate::codec::{ArchiveFormat, InArchive, ReadSeek};
use crate::context::CancelFlag;
use crate::enumerate::enumerate;
use crate::filter::PathFilter;
use crate::item::{ArchiveItem, DiskItems};
use crate::pair::{self, DeleteNotifier, PairingOptions};
use crate::plan::UpdatePlan;
use crate::progress::{UpdateReporter, UpdateStage};
use crate::timestamp::{ItemTime, Timestamp};
use crate::volume::VolumeReader;
use crate::{Error, Result};
use callback::UpdateCallbackImpl;
use output::Output;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use temp::TempFiles;

/// An old archive opened for update.
struct OpenedArchive<A> {
    archive: A,
    /// Files the archive is stored in.
    paths: Vec<PathBuf>,
    /// Modification time of the archive file itself.
    mtime: Option<ItemTime>,
}

/// Forwards delete notifications to the reporter.
struct ReporterNotifier<'a> {
    reporter: &'a mut dyn UpdateReporter,
    cancel: &'a CancelFlag,
}

impl DeleteNotifier for ReporterNotifier<'_> {
    fn on_delete(&mut self, item: &ArchiveItem) -> Result<()> {
        self.cancel.check()?;
        self.reporter.on_delete(&item.name, item.is_dir);
        Ok(())
    }
}

/// Updates archives of format `F`.
#[derive(Debug, Clone, Default)]
pub struct ArchiveUpdater<F> {
    format: F,
}

impl<F: ArchiveFormat> ArchiveUpdater<F> {
    /// Creates an updater using `format` to read and write archives.
    pub fn new(format: F) -> Self {
        Self { format }
    }

    /// Returns the codec.
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Runs one update.
    ///
    /// `disk` is the scanned input; it is ignored in rename mode. `filter`
    /// selects which archive entries the policy applies to; entries it
    /// rejects are kept unchanged.
    ///
    /// # Errors
    ///
    /// Every error is fatal for the run; see
    /// [`ErrorCategory`](crate::ErrorCategory) for the state the files are
    /// left in. Per-item open errors are only fatal when
    /// [`stop_after_open_error`](UpdateOptions::stop_after_open_error) is on.
    pub fn update(
        &self,
        job: &UpdateJob,
        disk: &DiskItems,
        filter: &dyn PathFilter,
        reporter: &mut dyn UpdateReporter,
    ) -> Result<UpdateOutcome> {
        let start = Instant::now();
        match self.run(job, disk, filter, reporter) {
            Ok(mut outcome) => {
                outcome.elapsed = start.elapsed();
                reporter.on_stage(UpdateStage::Committed);
                reporter.on_finish(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                log::debug!("update of {} failed: {}", job.archive.display(), e);
                reporter.on_stage(UpdateStage::Failed);
                Err(e)
            }
        }
    }

    /// Runs several updates in order, each with its own temporary output.
    ///
    /// A failed job does not stop the batch; a cancelled one does, and the
    /// remaining jobs get no result.
    pub fn update_batch(
        &self,
        jobs: &[UpdateJob],
        disk: &DiskItems,
        filter: &dyn PathFilter,
        reporter: &mut dyn UpdateReporter,
    ) -> Vec<Result<UpdateOutcome>> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let result = self.update(job, disk, filter, reporter);
            let cancelled = matches!(result, Err(Error::Cancelled));
            results.push(result);
            if cancelled {
                log::debug!("batch cancelled after {} of {} jobs", results.len(), jobs.len());
                break;
            }
        }
        results
    }

    fn run(
        &self,
        job: &UpdateJob,
        disk: &DiskItems,
        filter: &dyn PathFilter,
        reporter: &mut dyn UpdateReporter,
    ) -> Result<UpdateOutcome> {
        let target = job.archive_path();
        let options = job.get_options();
        let context = options.get_context();
        let cancel = context.cancel();
        let names = context.names();

        // Planning
        let exists = target.is_file() || VolumeReader::is_volume_set(target);
        reporter.on_start_archive(target, exists);
        reporter.on_stage(UpdateStage::Planning);
        cancel.check()?;
        let volume_config = options.volume_config(target)?;
        let empty = DiskItems::empty();
        let disk = if options.is_rename() { &empty } else { disk };
        check_not_included(target, disk, names)?;
        let old = self.open_existing(target)?;

        let mut archive_items = match &old {
            Some(opened) => enumerate(&opened.archive, opened.mtime, filter)?,
            None => Vec::new(),
        };
        let precision = match context.precision_override() {
            Some(forced) => {
                for time in archive_items.iter_mut().filter_map(|item| item.mtime.as_mut()) {
                    time.precision = forced;
                }
                forced
            }
            None => self.format.time_precision(),
        };
        let plan = if options.is_rename() {
            pair::plan_renames(&archive_items, options.get_rename_rules(), names)?
        } else {
            let pairing = PairingOptions::new(options.get_policy())
                .actions(options.action_set())
                .time_precision(precision)
                .name_mode(names);
            let mut notifier = ReporterNotifier {
                reporter: &mut *reporter,
                cancel,
            };
            pair::pair(disk, &archive_items, &pairing, &mut notifier)?
        };
        plan.validate(disk, &archive_items, names)?;
        let summary = plan.summary(disk);
        log::debug!(
            "plan for {}: {} added, {} updated, {} deleted, {} kept, {} renamed",
            target.display(),
            summary.added,
            summary.updated,
            summary.deleted,
            summary.kept,
            summary.renamed
        );
        reporter.on_plan(&summary);

        // OpeningOutput
        cancel.check()?;
        reporter.on_stage(UpdateStage::OpeningOutput);
        let use_temp = old.is_some() || options.get_working_dir().is_some();
        let mut guard = TempFiles::new();
        let mut output = Output::open(
            target,
            volume_config.as_ref(),
            use_temp,
            options.get_working_dir(),
        )?;
        guard.extend(output.paths());

        // Writing
        reporter.on_stage(UpdateStage::Writing);
        let old_archive = old.as_ref().map(|opened| &opened.archive);
        let mut callback = UpdateCallbackImpl::new(
            &plan,
            disk,
            &archive_items,
            old_archive.map(|archive| archive as &dyn InArchive),
            &mut *reporter,
            context,
        )
        .stop_after_open_error(options.stop_after_open_error);
        let written = self.format.update_items(old_archive, output.stream(), &mut callback);
        guard.extend(output.paths());
        let registry = callback.registry().clone();
        let results = callback.into_results();
        if let Err(e) = written {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            return Err(e);
        }

        // FinalizingTime
        if options.set_archive_mtime {
            reporter.on_stage(UpdateStage::FinalizingTime);
            if let Some(mtime) = archive_mtime(&plan, disk, &archive_items) {
                if let Err(e) = output.set_mtime(mtime) {
                    let message = format!("cannot set the archive time: {}", e);
                    log::warn!("{}", message);
                    reporter.on_warning(&message);
                }
            }
        }

        // Closing
        reporter.on_stage(UpdateStage::Closing);
        registry.check_closed()?;
        let is_volumes = output.is_volumes();
        let finished = output.finish()?;
        guard.extend(finished.paths.iter().cloned());
        cancel.check()?;

        // Moving
        reporter.on_stage(UpdateStage::Moving);
        let old_paths = old.map(|opened| opened.paths).unwrap_or_default();
        if use_temp {
            let final_paths: Vec<PathBuf> = match &volume_config {
                Some(config) => (1..=finished.paths.len() as u32)
                    .map(|n| config.volume_path(n))
                    .collect(),
                None => vec![target.to_path_buf()],
            };
            commit(&finished.paths, &final_paths, &old_paths, &mut guard, reporter)?;
        } else {
            guard.keep();
        }

        let mut outcome = UpdateOutcome {
            archive_path: target.to_path_buf(),
            output_size: finished.total_size(),
            volume_count: if is_volumes { finished.sizes.len() as u32 } else { 0 },
            volume_sizes: if is_volumes { finished.sizes.clone() } else { Vec::new() },
            failures: results.failures,
            stats: results.stats,
            elapsed: Default::default(),
        };
        outcome.stats.plan = summary;
        for error in disk.errors() {
            outcome.failures.push(ItemFailure {
                path: error.path.clone(),
                os_code: error.os_code,
                message: error.message.clone(),
            });
        }
        if options.delete_after_compressing {
            outcome.stats.files_deleted =
                delete_consumed(disk, &results.consumed, reporter, &mut outcome.failures);
        }
        Ok(outcome)
    }

    /// Opens the archive at `target`, as a single file or a volume set.
    fn open_existing(&self, target: &Path) -> Result<Option<OpenedArchive<F::Archive>>> {
        let (reader, paths): (Box<dyn ReadSeek + Send>, Vec<PathBuf>) = if target.is_file() {
            let file = File::open(target).map_err(|e| Error::open_archive(target, Error::Io(e)))?;
            (Box::new(BufReader::new(file)), vec![target.to_path_buf()])
        } else if VolumeReader::is_volume_set(target) {
            let reader = VolumeReader::open(target).map_err(|e| Error::open_archive(target, e))?;
            let paths = reader.paths();
            (Box::new(reader), paths)
        } else {
            return Ok(None);
        };

        let mtime = paths
            .first()
            .and_then(|path| fs::metadata(path).ok())
            .and_then(|meta| meta.modified().ok())
            .and_then(Timestamp::from_system_time)
            .map(ItemTime::windows);
        let archive = self
            .format
            .open(reader)
            .map_err(|e| Error::open_archive(target, e))?;
        log::debug!(
            "opened {} ({} entries, {} file(s))",
            target.display(),
            archive.len(),
            paths.len()
        );
        Ok(Some(OpenedArchive { archive, paths, mtime }))
    }
}

/// Rejects a disk item that is the archive itself or one of its volumes.
fn check_not_included(target: &Path, disk: &DiskItems, mode: NameMode) -> Result<()> {
    let target = absolute(target);
    let target = target.to_string_lossy();
    for item in disk.iter() {
        let path = absolute(&item.path);
        let path = path.to_string_lossy();
        let is_self = archive_path::names_equal(&path, &target, mode)
            || path
                .strip_prefix(&*target)
                .and_then(|rest| rest.strip_prefix('.'))
                .is_some_and(|ext| ext.len() == 3 && ext.bytes().all(|b| b.is_ascii_digit()));
        if is_self {
            return Err(Error::ArchiveIncludesItself { path: item.path.clone() });
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Newest modification time among the entries of the new archive.
fn archive_mtime(plan: &UpdatePlan, disk: &DiskItems, archive: &[ArchiveItem]) -> Option<Timestamp> {
    plan.iter()
        .filter(|entry| !entry.is_anti)
        .filter_map(|entry| {
            let from_disk = entry.take_from_disk || entry.is_same_time;
            match entry.disk_index.and_then(|i| disk.get(i)) {
                Some(item) if from_disk => Some(item.mtime),
                _ if entry.use_archive_props => entry
                    .archive_index
                    .and_then(|i| archive.get(i))
                    .and_then(|item| item.mtime)
                    .map(|t| t.time),
                _ => None,
            }
        })
        .max()
}

/// Replaces `old_paths` with the finished temporary files.
fn commit(
    temps: &[PathBuf],
    targets: &[PathBuf],
    old_paths: &[PathBuf],
    guard: &mut TempFiles,
    reporter: &mut dyn UpdateReporter,
) -> Result<()> {
    for path in targets {
        if !old_paths.contains(path) && path.exists() {
            return Err(Error::TargetExists { path: path.clone() });
        }
    }
    let first_temp = temps.first().cloned().unwrap_or_default();

    guard.keep();
    for path in old_paths {
        match fs::remove_file(path) {
            Ok(()) => log::debug!("deleted old archive file {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::CommitDelete {
                    path: path.clone(),
                    temp: first_temp,
                    source,
                });
            }
        }
    }
    for (temp, target) in temps.iter().zip(targets) {
        reporter.on_move(temp, target);
        temp::move_file(temp, target).map_err(|source| Error::Commit {
            temp: temp.clone(),
            target: target.clone(),
            source,
        })?;
        log::debug!("moved {} to {}", temp.display(), target.display());
    }
    Ok(())
}

/// Deletes disk files whose data is now in the archive, then the
/// directories that became empty, deepest first.
fn delete_consumed(
    disk: &DiskItems,
    consumed: &[bool],
    reporter: &mut dyn UpdateReporter,
    failures: &mut Vec<ItemFailure>,
) -> u64 {
    let mut deleted = 0;
    let mut dirs = Vec::new();
    for (item, _) in disk.iter().zip(consumed).filter(|(_, done)| **done) {
        if item.is_alt_stream {
            continue;
        }
        if item.is_dir() {
            dirs.push(item);
            continue;
        }
        match fs::remove_file(&item.path) {
            Ok(()) => deleted += 1,
            Err(e) => {
                let message = format!("cannot delete {}: {}", item.path.display(), e);
                log::warn!("{}", message);
                reporter.on_warning(&message);
                failures.push(ItemFailure::from_io(&item.path, &e));
            }
        }
    }
    dirs.sort_by_key(|item| std::cmp::Reverse(item.path.components().count()));
    for dir in dirs {
        if let Err(e) = fs::remove_dir(&dir.path) {
            log::debug!("keeping directory {}: {}", dir.path.display(), e);
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::simple::SimpleFormat;
    use crate::filter::AllowAll;
    use crate::item::DiskItem;
    use crate::pair::Policy;
    use crate::plan::UpdatePlanEntry;
    use crate::progress::{NoProgress, StatisticsReporter};
    use crate::scan::DiskItemsBuilder;

    fn write_file(dir: &Path, name: &str, data: &[u8], secs: i64) -> DiskItem {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        let mtime = Timestamp::from_unix_secs(secs).unwrap();
        filetime::set_file_mtime(&path, mtime.as_file_time()).unwrap();
        DiskItem::file(name, path, data.len() as u64, mtime)
    }

    #[test]
    fn test_create_then_update() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        let target = dir.path().join("out.aupk");
        let updater = ArchiveUpdater::new(SimpleFormat::new());

        let mut builder = DiskItemsBuilder::new();
        builder.push(write_file(&src, "a.txt", b"alpha", 1_000));
        let disk = builder.build();
        let job = UpdateJob::new(&target);
        let mut stats = StatisticsReporter::new();
        let outcome = updater.update(&job, &disk, &AllowAll, &mut stats).unwrap();
        assert_eq!(outcome.volume_count, 0);
        assert_eq!(outcome.output_size, fs::metadata(&target).unwrap().len());
        assert_eq!(stats.last_stage(), Some(UpdateStage::Committed));
        assert!(!stats.stages.contains(&UpdateStage::Failed));

        let mut builder = DiskItemsBuilder::new();
        builder.push(write_file(&src, "b.txt", b"beta", 2_000));
        let disk = builder.build();
        let outcome = updater.update(&job, &disk, &AllowAll, &mut NoProgress).unwrap();
        assert_eq!((outcome.stats.plan.added, outcome.stats.plan.kept), (1, 1));

        let file = File::open(&target).unwrap();
        let archive = updater.format().open(Box::new(BufReader::new(file))).unwrap();
        let names: Vec<String> = (0..archive.len()).map(|i| archive.entry(i).unwrap().path).collect();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert!(!dir.path().join("out.aupk.tmp").exists());

        let mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(&target).unwrap());
        assert_eq!(mtime.unix_seconds(), 2_000);
    }

    #[test]
    fn test_unreadable_archive_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.aupk");
        fs::write(&target, b"not an archive").unwrap();
        let updater = ArchiveUpdater::new(SimpleFormat::new());
        let mut stats = StatisticsReporter::new();
        let err = updater
            .update(&UpdateJob::new(&target), &DiskItems::empty(), &AllowAll, &mut stats)
            .unwrap_err();
        assert!(matches!(err, Error::OpenArchive { .. }));
        assert_eq!(fs::read(&target).unwrap(), b"not an archive");
        assert_eq!(stats.last_stage(), Some(UpdateStage::Failed));
        assert!(!dir.path().join("out.aupk.tmp").exists());
    }

    #[test]
    fn test_target_exists() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.aupk");
        fs::create_dir(&target).unwrap();
        let updater = ArchiveUpdater::new(SimpleFormat::new());
        let err = updater
            .update(&UpdateJob::new(&target), &DiskItems::empty(), &AllowAll, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::TargetExists { .. }));
    }

    #[test]
    fn test_archive_includes_itself() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.aupk");
        let mut builder = DiskItemsBuilder::new();
        builder.push(DiskItem::file("out.aupk", &target, 0, Timestamp::default()));
        let disk = builder.build();
        let updater = ArchiveUpdater::new(SimpleFormat::new());
        let err = updater
            .update(&UpdateJob::new(&target), &disk, &AllowAll, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::ArchiveIncludesItself { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn test_archive_mtime_sources() {
        let mut builder = DiskItemsBuilder::new();
        builder.push(DiskItem::file("a", "a", 1, Timestamp::from_unix_secs(10).unwrap()));
        let disk = builder.build();
        let archive = vec![ArchiveItem {
            name: "b".into(),
            size: Some(1),
            mtime: Some(ItemTime::windows(Timestamp::from_unix_secs(20).unwrap())),
            is_dir: false,
            is_alt_stream: false,
            censored: true,
            index: 0,
        }];

        let mut plan = UpdatePlan::new();
        plan.push(UpdatePlanEntry::compress(0, None));
        plan.push(UpdatePlanEntry::keep(0));
        assert_eq!(archive_mtime(&plan, &disk, &archive), Timestamp::from_unix_secs(20));

        let mut plan = UpdatePlan::new();
        plan.push(UpdatePlanEntry::compress(0, None));
        plan.push(UpdatePlanEntry::tombstone(0));
        assert_eq!(archive_mtime(&plan, &disk, &archive), Timestamp::from_unix_secs(10));
    }

    #[test]
    fn test_archive_mtime_of_kept_same_time_entry() {
        let disk_time = Timestamp::from_unix_secs_nanos(20, 500_000_000).unwrap();
        let mut builder = DiskItemsBuilder::new();
        builder.push(DiskItem::file("b", "b", 1, disk_time));
        let disk = builder.build();
        let archive = vec![ArchiveItem {
            name: "b".into(),
            size: Some(1),
            mtime: Some(ItemTime::windows(Timestamp::from_unix_secs(20).unwrap())),
            is_dir: false,
            is_alt_stream: false,
            censored: true,
            index: 0,
        }];

        let mut same = UpdatePlanEntry::keep(0).with_disk_item(Some(0));
        same.is_same_time = true;
        let mut plan = UpdatePlan::new();
        plan.push(same);
        assert_eq!(archive_mtime(&plan, &disk, &archive), Some(disk_time));

        let mut plan = UpdatePlan::new();
        plan.push(UpdatePlanEntry::keep(0).with_disk_item(Some(0)));
        assert_eq!(archive_mtime(&plan, &disk, &archive), Timestamp::from_unix_secs(20));
    }

    #[test]
    fn test_batch_stops_after_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let options = UpdateOptions::new().policy(Policy::Add);
        options.get_context().cancel().cancel();
        let jobs = vec![
            UpdateJob::new(dir.path().join("one.aupk")).options(options),
            UpdateJob::new(dir.path().join("two.aupk")),
        ];
        let updater = ArchiveUpdater::new(SimpleFormat::new());
        let results = updater.update_batch(&jobs, &DiskItems::empty(), &AllowAll, &mut NoProgress);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Cancelled)));
        assert!(!dir.path().join("one.aupk").exists());
    }
}
