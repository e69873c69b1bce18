//! The update plan: one entry per item of the archive being written.
//!
//! A plan is produced by the [`pair`](crate::pair) engine and consumed by the
//! [`update`](crate::update) orchestrator. Each [`UpdatePlanEntry`] says where
//! the entry's data and metadata come from:
//!
//! | entry | data | metadata |
//! |---|---|---|
//! | keep | old archive | old archive |
//! | compress | disk | disk |
//! | rename | old archive | old archive, new name |
//! | anti | none | name of the deleted entry |

use crate::archive_path::{self, NameMode};
use crate::item::{ArchiveItem, DiskItems};
use crate::{Error, Result};

/// One entry of the output archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdatePlanEntry {
    /// Data is read from the disk item.
    pub take_from_disk: bool,
    /// Data is copied from the old archive but the properties change.
    pub take_new_metadata_only: bool,
    /// The entry marks a deletion.
    pub is_anti: bool,
    /// Properties come from the old archive entry.
    pub use_archive_props: bool,
    /// The disk item and the archive entry have the same time.
    pub is_same_time: bool,
    /// Index into the disk items.
    pub disk_index: Option<usize>,
    /// Index into the archive item list the plan was built from.
    pub archive_index: Option<usize>,
    /// Index into the plan's new-name table.
    pub rename_target: Option<usize>,
}

impl UpdatePlanEntry {
    /// An archive entry passed through unchanged.
    pub fn keep(archive_index: usize) -> Self {
        Self {
            use_archive_props: true,
            archive_index: Some(archive_index),
            ..Self::default()
        }
    }

    /// Records the disk item paired with a kept entry.
    ///
    /// The entry still takes data and properties from the archive.
    pub fn with_disk_item(mut self, disk_index: Option<usize>) -> Self {
        self.disk_index = disk_index;
        self
    }

    /// A disk item compressed into the archive, optionally replacing an
    /// archive entry.
    pub fn compress(disk_index: usize, archive_index: Option<usize>) -> Self {
        Self {
            take_from_disk: true,
            disk_index: Some(disk_index),
            archive_index,
            ..Self::default()
        }
    }

    /// An anti entry deleting an archive entry.
    pub fn tombstone(archive_index: usize) -> Self {
        Self {
            is_anti: true,
            use_archive_props: true,
            archive_index: Some(archive_index),
            ..Self::default()
        }
    }

    /// An archive entry kept with a new name.
    pub fn rename(archive_index: usize, target: usize) -> Self {
        Self {
            take_new_metadata_only: true,
            use_archive_props: true,
            archive_index: Some(archive_index),
            rename_target: Some(target),
            ..Self::default()
        }
    }

    /// Returns true if the codec must be handed new data.
    pub fn new_data(&self) -> bool {
        self.take_from_disk || self.is_anti
    }

    /// Returns true if the codec must be handed new properties.
    pub fn new_props(&self) -> bool {
        self.take_from_disk || self.take_new_metadata_only || self.is_anti
    }

    /// Returns true for a pass-through entry.
    pub fn is_kept(&self) -> bool {
        !self.new_props()
    }
}

/// Counts of what a plan will do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Disk items with no archive counterpart.
    pub added: u64,
    /// Archive entries replaced by disk items.
    pub updated: u64,
    /// Archive entries deleted.
    pub deleted: u64,
    /// Archive entries passed through.
    pub kept: u64,
    /// Archive entries renamed.
    pub renamed: u64,
    /// Bytes that will be read from disk.
    pub new_bytes: u64,
}

impl PlanSummary {
    /// Returns true if writing the plan would reproduce the old archive.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0 && self.renamed == 0
    }
}

/// An ordered list of [`UpdatePlanEntry`] plus the names renamed entries get.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    entries: Vec<UpdatePlanEntry>,
    new_names: Vec<String>,
}

impl UpdatePlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: UpdatePlanEntry) {
        self.entries.push(entry);
    }

    /// Adds a name to the new-name table and returns its index.
    pub fn add_name(&mut self, name: impl Into<String>) -> usize {
        self.new_names.push(name.into());
        self.new_names.len() - 1
    }

    /// The entries, in output order.
    pub fn entries(&self) -> &[UpdatePlanEntry] {
        &self.entries
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: usize) -> Option<&UpdatePlanEntry> {
        self.entries.get(index)
    }

    /// Iterates the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, UpdatePlanEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the plan has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The new-name table.
    pub fn new_names(&self) -> &[String] {
        &self.new_names
    }

    /// Returns the name `entry` will have in the output archive.
    pub fn final_name<'a>(
        &'a self,
        entry: &UpdatePlanEntry,
        disk: &'a DiskItems,
        archive: &'a [ArchiveItem],
    ) -> Option<&'a str> {
        if let Some(target) = entry.rename_target {
            return self.new_names.get(target).map(String::as_str);
        }
        let disk_name = || entry.disk_index.and_then(|i| disk.get(i)).map(|d| d.name.as_str());
        if entry.take_from_disk {
            return disk_name();
        }
        match entry.archive_index {
            Some(i) => archive.get(i).map(|a| a.name.as_str()),
            None => disk_name(),
        }
    }

    /// Counts what the plan does.
    pub fn summary(&self, disk: &DiskItems) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for entry in &self.entries {
            if entry.is_anti {
                summary.deleted += 1;
            } else if entry.take_from_disk {
                if entry.archive_index.is_some() {
                    summary.updated += 1;
                } else {
                    summary.added += 1;
                }
                if let Some(item) = entry.disk_index.and_then(|i| disk.get(i)) {
                    if !item.is_dir() {
                        summary.new_bytes += item.size;
                    }
                }
            } else if entry.take_new_metadata_only {
                summary.renamed += 1;
            } else {
                summary.kept += 1;
            }
        }
        summary
    }

    /// Checks the plan invariants against the items it was built from.
    ///
    /// Every entry references at least one item and every index is in range;
    /// an entry that takes data from disk has a disk index; no two non-anti
    /// entries end up with the same name.
    pub fn validate(&self, disk: &DiskItems, archive: &[ArchiveItem], mode: NameMode) -> Result<()> {
        let mut names: Vec<(&str, usize)> = Vec::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.disk_index.is_none() && entry.archive_index.is_none() {
                return Err(Error::InvalidPlan(format!("entry {} references no item", i)));
            }
            if entry.take_from_disk && entry.disk_index.is_none() {
                return Err(Error::InvalidPlan(format!(
                    "entry {} takes data from disk without a disk item",
                    i
                )));
            }
            if entry.disk_index.is_some_and(|d| d >= disk.len()) {
                return Err(Error::InvalidPlan(format!("entry {} has a bad disk index", i)));
            }
            if entry.archive_index.is_some_and(|a| a >= archive.len()) {
                return Err(Error::InvalidPlan(format!("entry {} has a bad archive index", i)));
            }
            if entry.use_archive_props && entry.archive_index.is_none() {
                return Err(Error::InvalidPlan(format!(
                    "entry {} uses archive properties without an archive item",
                    i
                )));
            }
            let name = self.final_name(entry, disk, archive).ok_or_else(|| {
                Error::InvalidPlan(format!("entry {} has a bad rename target", i))
            })?;
            if !entry.is_anti {
                names.push((name, i));
            }
        }

        names.sort_by(|a, b| archive_path::compare_names(a.0, b.0, mode));
        for pair in names.windows(2) {
            if archive_path::names_equal(pair[0].0, pair[1].0, mode) {
                return Err(Error::InvalidPlan(format!(
                    "entries {} and {} are both named '{}'",
                    pair[0].1, pair[1].1, pair[0].0
                )));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a UpdatePlan {
    type Item = &'a UpdatePlanEntry;
    type IntoIter = std::slice::Iter<'a, UpdatePlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
