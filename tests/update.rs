//! End-to-end update tests.
//!
//! These tests drive `ArchiveUpdater` against real files in a temporary
//! directory and check the archive that ends up on disk, the files left
//! behind, and what the reporter saw.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use arcupdate::codec::simple::{SimpleArchive, SimpleFormat};
use arcupdate::codec::{ArchiveFormat, ReadSeek, UpdateCallback};
use arcupdate::filter::{AllowAll, PatternFilter};
use arcupdate::item::DiskItems;
use arcupdate::progress::{ItemOperation, NoProgress, StatisticsReporter};
use arcupdate::stream::OutputStream;
use arcupdate::timestamp::TimePrecision;
use arcupdate::{
    ArchiveUpdater, CancelFlag, Error, ErrorCategory, Policy, RenameRule, UpdateContext, UpdateJob, UpdateOptions,
    UpdateReport, UpdateReporter, UpdateStage,
};

mod common;
use common::{Fixture, disk_items, entry_names, read_archive, stored_bytes};

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

/// Creates the archive from `(name, data, mtime)` triples.
fn seed(fx: &Fixture, files: &[(&str, &[u8], i64)]) {
    let disk = disk_items(files.iter().map(|(name, data, secs)| fx.file(name, data, *secs)));
    let outcome = fx.update(UpdateOptions::new(), &disk).expect("Failed to create archive");
    assert!(outcome.is_clean());
}

// =============================================================================
// Policies
// =============================================================================

#[test]
fn test_update_policy_worked_example() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"old alpha", 100), ("b.txt", b"beta", 100)]);
    let kept_b = stored_bytes(&fx.target, "b.txt").unwrap();

    let disk = disk_items([fx.file("a.txt", b"new alpha", 200), fx.file("c.txt", b"gamma", 300)]);
    let outcome = fx.update(UpdateOptions::new().policy(Policy::Update), &disk).unwrap();

    assert_eq!(outcome.stats.plan.added, 1);
    assert_eq!(outcome.stats.plan.updated, 1);
    assert_eq!(outcome.stats.plan.kept, 1);
    assert_eq!(outcome.stats.plan.deleted, 0);

    let mut entries = read_archive(&fx.target);
    entries.sort();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], ("a.txt".to_string(), b"new alpha".to_vec(), Some(200)));
    assert_eq!(entries[1], ("b.txt".to_string(), b"beta".to_vec(), Some(100)));
    assert_eq!(entries[2], ("c.txt".to_string(), b"gamma".to_vec(), Some(300)));
    assert_eq!(stored_bytes(&fx.target, "b.txt").unwrap(), kept_b);
}

#[test]
fn test_add_never_overwrites() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"first", 100)]);

    let disk = disk_items([fx.file("a.txt", b"second", 200), fx.file("b.txt", b"new", 200)]);
    let outcome = fx.update(UpdateOptions::new().policy(Policy::Add), &disk).unwrap();
    assert_eq!((outcome.stats.plan.added, outcome.stats.plan.kept), (1, 1));
    assert_eq!(outcome.stats.plan.updated, 0);

    let mut entries = read_archive(&fx.target);
    entries.sort();
    assert_eq!(entries[0].1, b"first");
    assert_eq!(entries[1].0, "b.txt");
}

#[test]
fn test_fresh_only_replaces() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"first", 100)]);

    let disk = disk_items([fx.file("a.txt", b"second", 200), fx.file("b.txt", b"new", 200)]);
    let outcome = fx.update(UpdateOptions::new().policy(Policy::Fresh), &disk).unwrap();

    assert_eq!(outcome.stats.plan.added, 0);
    assert_eq!(outcome.stats.plan.updated, 1);
    let entries = read_archive(&fx.target);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, b"second");
}

#[test]
fn test_no_silent_loss() {
    for policy in [Policy::Add, Policy::Update, Policy::Fresh] {
        let fx = Fixture::new();
        seed(&fx, &[("x.txt", b"kept one", 100), ("y.txt", b"kept two", 100)]);
        let before_x = stored_bytes(&fx.target, "x.txt").unwrap();
        let before_y = stored_bytes(&fx.target, "y.txt").unwrap();

        let disk = disk_items([fx.file("z.txt", b"other", 500)]);
        let outcome = fx.update(UpdateOptions::new().policy(policy), &disk).unwrap();
        assert_eq!(outcome.stats.plan.kept, 2, "{:?}", policy);

        assert_eq!(stored_bytes(&fx.target, "x.txt").unwrap(), before_x, "{:?}", policy);
        assert_eq!(stored_bytes(&fx.target, "y.txt").unwrap(), before_y, "{:?}", policy);
    }
}

#[test]
fn test_sync_completeness() {
    let fx = Fixture::new();
    seed(&fx, &[("gone.txt", b"bye", 100), ("same.txt", b"same", 100)]);

    let disk = disk_items([fx.file("same.txt", b"same", 100), fx.file("new.txt", b"hello", 300)]);
    let job = UpdateJob::new(&fx.target).options(UpdateOptions::new().policy(Policy::Sync));
    let mut stats = StatisticsReporter::new();
    let outcome = ArchiveUpdater::new(SimpleFormat::new())
        .update(&job, &disk, &AllowAll, &mut stats)
        .unwrap();

    assert_eq!(sorted(entry_names(&fx.target)), vec!["new.txt", "same.txt"]);
    assert_eq!(stats.deleted, vec!["gone.txt".to_string()]);
    assert_eq!(outcome.stats.plan.deleted, 1);
    assert_eq!(outcome.stats.plan.kept, 1);
}

#[test]
fn test_idempotent_update() {
    let fx = Fixture::new();
    let disk = disk_items([
        fx.file("a.txt", b"alpha", 100),
        fx.file("dir/b.txt", b"beta beta beta", 200),
    ]);
    let options = UpdateOptions::new().policy(Policy::Update);
    let outcome = fx.update(options.clone(), &disk).unwrap();
    assert_eq!(outcome.stats.plan.added, 2);
    let first = read_archive(&fx.target);
    let first_b = stored_bytes(&fx.target, "dir/b.txt").unwrap();

    let outcome = fx.update(options, &disk).unwrap();
    assert_eq!(outcome.stats.plan.added + outcome.stats.plan.updated, 0);
    assert_eq!(outcome.stats.plan.kept, 2);
    assert_eq!(read_archive(&fx.target), first);
    assert_eq!(stored_bytes(&fx.target, "dir/b.txt").unwrap(), first_b);
}

#[test]
fn test_delete_matching_entries() {
    let fx = Fixture::new();
    seed(
        &fx,
        &[("keep.txt", b"1", 100), ("a.log", b"2", 100), ("logs/b.log", b"3", 100)],
    );

    let filter = PatternFilter::new(&["*.log"], &[]).unwrap();
    let job = UpdateJob::new(&fx.target).options(UpdateOptions::new().policy(Policy::Delete));
    let outcome = ArchiveUpdater::new(SimpleFormat::new())
        .update(&job, &DiskItems::empty(), &filter, &mut NoProgress)
        .unwrap();

    assert_eq!(entry_names(&fx.target), vec!["keep.txt"]);
    assert_eq!(outcome.stats.plan.deleted, 2);
}

#[test]
fn test_filter_keeps_unmatched_entries() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"old", 100), ("b.bin", b"old", 100)]);

    // Sync only looks at *.txt; b.bin is outside the filter and survives.
    let disk = disk_items([fx.file("a.txt", b"new", 200)]);
    let filter = PatternFilter::new(&["*.txt"], &[]).unwrap();
    let job = UpdateJob::new(&fx.target).options(UpdateOptions::new().policy(Policy::Sync));
    let outcome = ArchiveUpdater::new(SimpleFormat::new())
        .update(&job, &disk, &filter, &mut NoProgress)
        .unwrap();
    assert_eq!(outcome.stats.plan.deleted, 0);

    let mut entries = read_archive(&fx.target);
    entries.sort();
    assert_eq!(entries[0].1, b"new");
    assert_eq!(entries[1].0, "b.bin");
}

// =============================================================================
// Rename
// =============================================================================

#[test]
fn test_rename_passes_data_through() {
    let fx = Fixture::new();
    seed(
        &fx,
        &[("docs/a.txt", b"aaa", 100), ("docs/b.txt", b"bbb", 100), ("other.txt", b"ccc", 100)],
    );
    let before = stored_bytes(&fx.target, "docs/a.txt").unwrap();

    let options = UpdateOptions::new().rename(RenameRule::new("docs", "manual").unwrap());
    // Disk items are ignored in rename mode.
    let disk = disk_items([fx.file("unrelated.txt", b"zzz", 100)]);
    let outcome = fx.update(options, &disk).unwrap();

    assert_eq!(outcome.stats.plan.renamed, 2);
    assert_eq!(
        sorted(entry_names(&fx.target)),
        vec!["manual/a.txt", "manual/b.txt", "other.txt"]
    );
    assert_eq!(stored_bytes(&fx.target, "manual/a.txt").unwrap(), before);
}

#[test]
fn test_rename_conflict_leaves_archive() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"a", 100), ("b.txt", b"b", 100)]);
    let before = fs::read(&fx.target).unwrap();

    let options = UpdateOptions::new().rename(RenameRule::new("a.txt", "b.txt").unwrap());
    let err = fx.update(options, &DiskItems::empty()).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Plan);
    assert_eq!(fs::read(&fx.target).unwrap(), before);
    assert_eq!(fx.root_files(), vec!["test.aupk"]);
}

// =============================================================================
// Per-item open errors
// =============================================================================

#[test]
fn test_open_error_skipped_on_request() {
    let fx = Fixture::new();
    let good = fx.file("good.txt", b"ok", 100);
    let missing = fx.file("missing.txt", b"soon gone", 100);
    fs::remove_file(&missing.path).unwrap();
    let disk = disk_items([good, missing.clone()]);

    let outcome = fx
        .update(UpdateOptions::new().stop_after_open_error(false), &disk)
        .unwrap();

    assert!(!outcome.is_clean());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].path, missing.path);
    assert_eq!(outcome.stats.items_skipped, 1);
    assert_eq!(entry_names(&fx.target), vec!["good.txt"]);

    let report = UpdateReport::from_result(&Ok(outcome));
    assert!(report.success);
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn test_open_error_is_fatal_by_default() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"a", 100)]);
    let before = fs::read(&fx.target).unwrap();

    let missing = fx.file("missing.txt", b"x", 200);
    fs::remove_file(&missing.path).unwrap();
    let err = fx
        .update(UpdateOptions::new(), &disk_items([missing.clone()]))
        .unwrap_err();

    assert!(matches!(err, Error::OpenItem { .. }));
    assert_eq!(err.paths(), vec![missing.path.clone()]);
    assert_eq!(fs::read(&fx.target).unwrap(), before);
    assert_eq!(fx.root_files(), vec!["test.aupk"]);
}

// =============================================================================
// Cancellation and atomicity
// =============================================================================

/// Raises the cancel flag when the first item starts.
struct CancelOnFirstItem {
    flag: CancelFlag,
}

impl UpdateReporter for CancelOnFirstItem {
    fn on_item_start(&mut self, _name: &str, _operation: ItemOperation, _size: u64) {
        self.flag.cancel();
    }
}

#[test]
fn test_cancellation_leaves_original() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"a", 100)]);
    let before = fs::read(&fx.target).unwrap();

    let flag = CancelFlag::new();
    let options = UpdateOptions::new()
        .policy(Policy::Update)
        .context(UpdateContext::new().cancel_flag(flag.clone()));
    let disk = disk_items([fx.file("a.txt", b"changed", 200), fx.file("b.txt", b"b", 200)]);
    let job = UpdateJob::new(&fx.target).options(options);
    let mut reporter = CancelOnFirstItem { flag };
    let err = ArchiveUpdater::new(SimpleFormat::new())
        .update(&job, &disk, &AllowAll, &mut reporter)
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(UpdateReport::from_result(&Err(err)).category, Some(ErrorCategory::Cancelled));
    assert_eq!(fs::read(&fx.target).unwrap(), before);
    assert_eq!(fx.root_files(), vec!["test.aupk"]);
}

/// Panics when the run reaches the Moving stage, standing in for a crash
/// between writing and committing.
struct CrashBeforeMove;

impl UpdateReporter for CrashBeforeMove {
    fn on_stage(&mut self, stage: UpdateStage) {
        if stage == UpdateStage::Moving {
            panic!("simulated crash");
        }
    }
}

#[test]
fn test_crash_before_move_keeps_original() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"a", 100)]);
    let before = fs::read(&fx.target).unwrap();

    let disk = disk_items([fx.file("b.txt", b"b", 200)]);
    let job = UpdateJob::new(&fx.target);
    let updater = ArchiveUpdater::new(SimpleFormat::new());
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        updater.update(&job, &disk, &AllowAll, &mut CrashBeforeMove)
    }));

    assert!(result.is_err());
    assert_eq!(fs::read(&fx.target).unwrap(), before);
    assert_eq!(fx.root_files(), vec!["test.aupk"]);
}

/// Delegates to the reference codec, with a hook that runs first.
struct HookedFormat<H> {
    inner: SimpleFormat,
    hook: H,
}

impl<H> ArchiveFormat for HookedFormat<H>
where
    H: Fn(&mut dyn OutputStream, &mut dyn UpdateCallback) -> arcupdate::Result<()>,
{
    type Archive = SimpleArchive;

    fn time_precision(&self) -> TimePrecision {
        self.inner.time_precision()
    }

    fn open(&self, reader: Box<dyn ReadSeek + Send>) -> arcupdate::Result<SimpleArchive> {
        self.inner.open(reader)
    }

    fn update_items(
        &self,
        old: Option<&SimpleArchive>,
        output: &mut dyn OutputStream,
        callback: &mut dyn UpdateCallback,
    ) -> arcupdate::Result<()> {
        (self.hook)(&mut *output, &mut *callback)?;
        self.inner.update_items(old, output, callback)
    }
}

fn run_hooked<H>(fx: &Fixture, disk: &DiskItems, hook: H) -> (arcupdate::Result<arcupdate::UpdateOutcome>, StatisticsReporter)
where
    H: Fn(&mut dyn OutputStream, &mut dyn UpdateCallback) -> arcupdate::Result<()>,
{
    let format = HookedFormat {
        inner: SimpleFormat::new(),
        hook,
    };
    let mut stats = StatisticsReporter::new();
    let result = ArchiveUpdater::new(format).update(&UpdateJob::new(&fx.target), disk, &AllowAll, &mut stats);
    (result, stats)
}

#[test]
fn test_write_error_cleans_up() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"a", 100)]);
    let before = fs::read(&fx.target).unwrap();

    let disk = disk_items([fx.file("b.txt", b"b", 200)]);
    let (result, stats) = run_hooked(&fx, &disk, |output, _| {
        output.write_all(b"partial garbage")?;
        Err(Error::Io(std::io::Error::other("disk full")))
    });

    let err = result.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Write);
    assert_eq!(stats.last_stage(), Some(UpdateStage::Failed));
    assert_eq!(fs::read(&fx.target).unwrap(), before);
    assert_eq!(fx.root_files(), vec!["test.aupk"]);
}

#[test]
fn test_leaked_stream_is_fatal() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"a", 100)]);
    let before = fs::read(&fx.target).unwrap();

    let disk = disk_items([fx.file("b.txt", b"b", 200)]);
    let (result, _) = run_hooked(&fx, &disk, |_, callback| {
        for index in 0..callback.len() {
            if !callback.props(index)?.new_data {
                continue;
            }
            if let Some(stream) = callback.open_stream(index)? {
                std::mem::forget(stream);
                break;
            }
        }
        Ok(())
    });

    let err = result.unwrap_err();
    assert!(matches!(err, Error::UnclosedStreams { .. }));
    assert_eq!(err.category(), ErrorCategory::Leak);
    assert_eq!(fs::read(&fx.target).unwrap(), before);
    assert_eq!(fx.root_files(), vec!["test.aupk"]);
}

// =============================================================================
// Output placement
// =============================================================================

#[test]
fn test_working_dir_for_temp() {
    let fx = Fixture::new();
    let work = fx.dir.path().join("work");
    fs::create_dir(&work).unwrap();

    let disk = disk_items([fx.file("a.txt", b"a", 100)]);
    let _outcome = fx.update(UpdateOptions::new().working_dir(&work), &disk).unwrap();

    assert_eq!(entry_names(&fx.target), vec!["a.txt"]);
    assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
}

#[test]
fn test_time_precision_override() {
    let fx = Fixture::new();
    seed(&fx, &[("a.txt", b"data", 101)]);

    // 101 s and 102 s fall into the same two-second DOS slot.
    let disk = disk_items([fx.file("a.txt", b"DATA", 102)]);
    let context = UpdateContext::new().time_precision(TimePrecision::Dos);
    let outcome = fx
        .update(UpdateOptions::new().policy(Policy::Update).context(context), &disk)
        .unwrap();
    assert_eq!((outcome.stats.plan.kept, outcome.stats.plan.updated), (1, 0));
    assert_eq!(read_archive(&fx.target)[0].1, b"data");

    let outcome = fx.update(UpdateOptions::new().policy(Policy::Update), &disk).unwrap();
    assert_eq!(outcome.stats.plan.updated, 1);
    assert_eq!(read_archive(&fx.target)[0].1, b"DATA");
}

#[test]
fn test_archive_mtime_is_newest_entry() {
    let fx = Fixture::new();
    let disk = disk_items([fx.file("a.txt", b"a", 1_000), fx.file("b.txt", b"b", 5_000)]);
    let _outcome = fx.update(UpdateOptions::new(), &disk).unwrap();
    assert_eq!(mtime_secs(&fx.target), 5_000);

    let fx = Fixture::new();
    let disk = disk_items([fx.file("a.txt", b"a", 1_000)]);
    let _outcome = fx.update(UpdateOptions::new().set_archive_mtime(false), &disk).unwrap();
    assert_ne!(mtime_secs(&fx.target), 1_000);
}

fn mtime_secs(path: &Path) -> i64 {
    filetime::FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

#[test]
fn test_delete_after_compressing() {
    let fx = Fixture::new();
    let a = fx.file("sub/a.txt", b"a", 100);
    let b = fx.file("sub/b.txt", b"b", 100);
    let dir = arcupdate::item::DiskItem::directory("sub", fx.src.join("sub"), arcupdate::Timestamp::default());
    let disk = disk_items([dir, a.clone(), b.clone()]);

    let outcome = fx
        .update(UpdateOptions::new().delete_after_compressing(true), &disk)
        .unwrap();

    assert_eq!(outcome.stats.files_deleted, 2);
    assert!(!a.path.exists());
    assert!(!b.path.exists());
    assert!(!fx.src.join("sub").exists());
    assert_eq!(sorted(entry_names(&fx.target)), vec!["sub", "sub/a.txt", "sub/b.txt"]);
}
