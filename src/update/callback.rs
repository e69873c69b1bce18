//! The engine side of the codec boundary.
//!
//! [`UpdateCallbackImpl`] answers the codec's questions about each plan
//! entry: its properties, and a stream of its bytes from disk or from the old
//! archive. It also collects what happened to each item so the orchestrator
//! can report failures and, optionally, delete consumed disk files.

use super::result::{ItemFailure, UpdateStats};
use super::source::{ArchiveSource, DiskSource, ItemSource, StreamRegistry};
use crate::codec::{InArchive, ItemStream, OperationResult, UpdateCallback, UpdateItemProps};
use crate::context::UpdateContext;
use crate::item::{ArchiveItem, DiskItems};
use crate::plan::{UpdatePlan, UpdatePlanEntry};
use crate::progress::{ItemOperation, UpdateReporter};
use crate::{Error, Result};

/// What the callback learned while the codec ran.
#[derive(Debug, Default)]
pub(crate) struct CallbackResults {
    pub failures: Vec<ItemFailure>,
    /// Per disk item: its data was fully written.
    pub consumed: Vec<bool>,
    pub stats: UpdateStats,
}

/// Feeds one [`UpdatePlan`] to a codec.
pub(crate) struct UpdateCallbackImpl<'a> {
    plan: &'a UpdatePlan,
    disk: &'a DiskItems,
    archive: &'a [ArchiveItem],
    old: Option<&'a dyn InArchive>,
    reporter: &'a mut dyn UpdateReporter,
    context: &'a UpdateContext,
    registry: StreamRegistry,
    stop_after_open_error: bool,
    total_bytes: u64,
    results: CallbackResults,
}

impl<'a> UpdateCallbackImpl<'a> {
    pub(crate) fn new(
        plan: &'a UpdatePlan,
        disk: &'a DiskItems,
        archive: &'a [ArchiveItem],
        old: Option<&'a dyn InArchive>,
        reporter: &'a mut dyn UpdateReporter,
        context: &'a UpdateContext,
    ) -> Self {
        let total_bytes = plan
            .iter()
            .filter(|e| !e.is_anti)
            .map(|e| entry_size(e, disk, archive))
            .sum();
        Self {
            plan,
            disk,
            archive,
            old,
            reporter,
            context,
            registry: StreamRegistry::new(),
            stop_after_open_error: true,
            total_bytes,
            results: CallbackResults {
                consumed: vec![false; disk.len()],
                ..CallbackResults::default()
            },
        }
    }

    pub(crate) fn stop_after_open_error(mut self, stop: bool) -> Self {
        self.stop_after_open_error = stop;
        self
    }

    /// The registry every handed-out stream is tracked in.
    pub(crate) fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub(crate) fn into_results(self) -> CallbackResults {
        self.results
    }

    fn entry(&self, index: usize) -> Result<UpdatePlanEntry> {
        self.plan.get(index).copied().ok_or(Error::EntryNotFound { index })
    }

    fn old_archive(&self, index: usize) -> Result<&'a dyn InArchive> {
        self.old.ok_or_else(|| {
            Error::InvalidPlan(format!("item {} refers to an archive that is not open", index))
        })
    }

    /// Position of the plan entry's archive item in the underlying archive.
    fn codec_index(&self, entry: &UpdatePlanEntry) -> Option<usize> {
        entry
            .archive_index
            .and_then(|i| self.archive.get(i))
            .map(|item| item.index)
    }

    fn describe(&self, index: usize) -> Result<(String, ItemOperation)> {
        let entry = self.entry(index)?;
        let name = self
            .plan
            .final_name(&entry, self.disk, self.archive)
            .ok_or_else(|| Error::InvalidPlan(format!("entry {} has no name", index)))?
            .to_string();
        Ok((name, operation(&entry)))
    }
}

fn operation(entry: &UpdatePlanEntry) -> ItemOperation {
    if entry.is_anti {
        ItemOperation::Delete
    } else if entry.take_from_disk {
        if entry.archive_index.is_some() {
            ItemOperation::Update
        } else {
            ItemOperation::Add
        }
    } else if entry.take_new_metadata_only {
        ItemOperation::Rename
    } else {
        ItemOperation::Copy
    }
}

fn entry_size(entry: &UpdatePlanEntry, disk: &DiskItems, archive: &[ArchiveItem]) -> u64 {
    if entry.take_from_disk {
        entry
            .disk_index
            .and_then(|i| disk.get(i))
            .filter(|item| !item.is_dir())
            .map_or(0, |item| item.size)
    } else {
        entry
            .archive_index
            .and_then(|i| archive.get(i))
            .and_then(|item| item.size)
            .unwrap_or(0)
    }
}

impl UpdateCallback for UpdateCallbackImpl<'_> {
    fn len(&self) -> usize {
        self.plan.len()
    }

    fn props(&mut self, index: usize) -> Result<UpdateItemProps> {
        let entry = self.entry(index)?;
        let (name, op) = self.describe(index)?;
        let mut props = UpdateItemProps {
            new_data: entry.new_data(),
            new_props: entry.new_props(),
            archive_index: self.codec_index(&entry),
            path: name,
            is_anti: entry.is_anti,
            ..UpdateItemProps::default()
        };

        if entry.use_archive_props {
            let old_index = props.archive_index.ok_or_else(|| {
                Error::InvalidPlan(format!("entry {} uses archive properties without an archive item", index))
            })?;
            let old = self.old_archive(index)?.entry(old_index)?;
            props.is_dir = old.is_dir;
            props.is_alt_stream = old.is_alt_stream;
            props.size = old.size.unwrap_or(0);
            props.mtime = old.mtime;
            props.ctime = old.ctime;
            props.atime = old.atime;
            props.attributes = old.attributes.unwrap_or_default();
        } else if let Some(item) = entry.disk_index.and_then(|i| self.disk.get(i)) {
            props.is_dir = item.is_dir();
            props.is_alt_stream = item.is_alt_stream;
            props.size = if props.is_dir { 0 } else { item.size };
            props.mtime = Some(item.mtime);
            props.ctime = item.ctime;
            props.atime = item.atime;
            props.attributes = item.attributes;
        }
        if props.is_anti {
            props.size = 0;
        }

        self.reporter.on_item_start(&props.path, op, props.size);
        Ok(props)
    }

    fn open_stream(&mut self, index: usize) -> Result<Option<ItemStream>> {
        self.context.cancel().check()?;
        let entry = self.entry(index)?;

        let (stream, label) = if entry.take_from_disk {
            let disk_index = entry.disk_index.ok_or_else(|| {
                Error::InvalidPlan(format!("entry {} takes data from disk without a disk item", index))
            })?;
            let source = DiskSource::new(self.disk);
            match source.open(disk_index) {
                Ok(stream) => (stream, source.describe(disk_index)),
                Err(Error::OpenItem { path, source: err }) if !self.stop_after_open_error => {
                    log::warn!("skipping {}: {}", path.display(), err);
                    self.reporter.on_open_error(&path, &err);
                    self.results.failures.push(ItemFailure::from_io(path, &err));
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        } else {
            let old_index = self.codec_index(&entry).ok_or_else(|| {
                Error::InvalidPlan(format!("entry {} has no data source", index))
            })?;
            let source = ArchiveSource::new(self.old_archive(index)?);
            (source.open(old_index)?, source.describe(old_index))
        };

        let tracked = self.registry.track(
            stream,
            label,
            self.context.cancel().clone(),
            self.context.poll_bytes(),
        );
        Ok(Some(Box::new(tracked)))
    }

    fn set_operation_result(&mut self, index: usize, result: OperationResult) -> Result<()> {
        let entry = self.entry(index)?;
        let (name, op) = self.describe(index)?;
        match result {
            OperationResult::Ok => {
                self.results.stats.items_written += 1;
                if entry.take_from_disk {
                    if let Some(slot) = entry.disk_index.and_then(|i| self.results.consumed.get_mut(i)) {
                        *slot = true;
                    }
                }
            }
            OperationResult::Skipped => {
                self.results.stats.items_skipped += 1;
            }
            OperationResult::DataError => {
                self.results.stats.items_written += 1;
                let path = entry
                    .disk_index
                    .filter(|_| entry.take_from_disk)
                    .and_then(|i| self.disk.get(i))
                    .map(|item| item.path.clone())
                    .unwrap_or_else(|| name.clone().into());
                let message = format!("{}: size changed while reading", name);
                self.reporter.on_warning(&message);
                self.results.failures.push(ItemFailure::message(path, message));
            }
        }
        self.reporter.on_item_complete(&name, op, result);
        Ok(())
    }

    fn report_progress(&mut self, in_bytes: u64, out_bytes: u64) -> Result<()> {
        self.context.cancel().check()?;
        self.results.stats.bytes_in = in_bytes;
        self.results.stats.bytes_out = out_bytes;
        if !self.reporter.on_progress(in_bytes, out_bytes, self.total_bytes) {
            self.context.cancel().cancel();
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
