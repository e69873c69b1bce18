//! Pair states produced by the merge walk.

use std::fmt;

/// How a disk item relates to an archive entry with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairState {
    /// Archive entry excluded by the filter; kept and never matched.
    NotMasked,
    /// Archive entry with no disk counterpart.
    OnlyInArchive,
    /// Disk item with no archive counterpart.
    OnlyOnDisk,
    /// The archive copy is newer than the disk file.
    NewInArchive,
    /// The disk file is newer than the archive copy.
    OldInArchive,
    /// Same time and same size.
    SameFiles,
    /// Times are equal but sizes differ or are unknown, or the archive entry
    /// has no time at all.
    UnknownNewerFiles,
}

/// Time relation between the disk file and the archive entry of a matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeRelation {
    /// The disk file is newer.
    DiskNewer,
    /// Same time and size.
    Same,
    /// The disk file is older.
    DiskOlder,
    /// The times cannot be ordered.
    Incomparable,
}

impl PairState {
    /// Every state, in table order.
    pub const ALL: [PairState; 7] = [
        PairState::NotMasked,
        PairState::OnlyInArchive,
        PairState::OnlyOnDisk,
        PairState::NewInArchive,
        PairState::OldInArchive,
        PairState::SameFiles,
        PairState::UnknownNewerFiles,
    ];

    /// Position of the state in [`PairState::ALL`].
    pub(crate) const fn index(self) -> usize {
        match self {
            PairState::NotMasked => 0,
            PairState::OnlyInArchive => 1,
            PairState::OnlyOnDisk => 2,
            PairState::NewInArchive => 3,
            PairState::OldInArchive => 4,
            PairState::SameFiles => 5,
            PairState::UnknownNewerFiles => 6,
        }
    }

    /// Time relation of a matched pair; `None` for one-sided states.
    pub fn time_relation(self) -> Option<TimeRelation> {
        match self {
            PairState::OldInArchive => Some(TimeRelation::DiskNewer),
            PairState::SameFiles => Some(TimeRelation::Same),
            PairState::NewInArchive => Some(TimeRelation::DiskOlder),
            PairState::UnknownNewerFiles => Some(TimeRelation::Incomparable),
            PairState::NotMasked | PairState::OnlyInArchive | PairState::OnlyOnDisk => None,
        }
    }

    /// Returns true if the state carries a disk item.
    pub fn has_disk(self) -> bool {
        !matches!(self, PairState::NotMasked | PairState::OnlyInArchive)
    }

    /// Returns true if the state carries an archive entry.
    pub fn has_archive(self) -> bool {
        self != PairState::OnlyOnDisk
    }

    /// Returns a short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            PairState::NotMasked => "not-masked",
            PairState::OnlyInArchive => "only-in-archive",
            PairState::OnlyOnDisk => "only-on-disk",
            PairState::NewInArchive => "new-in-archive",
            PairState::OldInArchive => "old-in-archive",
            PairState::SameFiles => "same",
            PairState::UnknownNewerFiles => "unknown-newer",
        }
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the merge walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePair {
    /// Pair state.
    pub state: PairState,
    /// Index into the disk items, for states that have one.
    pub disk_index: Option<usize>,
    /// Index into the archive item list passed to the pairing engine.
    pub archive_index: Option<usize>,
    /// For alternate streams, the pair index of the host file.
    pub host_index: Option<usize>,
}

impl UpdatePair {
    pub(crate) fn disk_only(disk_index: usize) -> Self {
        Self {
            state: PairState::OnlyOnDisk,
            disk_index: Some(disk_index),
            archive_index: None,
            host_index: None,
        }
    }

    pub(crate) fn archive_only(archive_index: usize, censored: bool) -> Self {
        Self {
            state: if censored {
                PairState::OnlyInArchive
            } else {
                PairState::NotMasked
            },
            disk_index: None,
            archive_index: Some(archive_index),
            host_index: None,
        }
    }

    pub(crate) fn matched(state: PairState, disk_index: usize, archive_index: usize) -> Self {
        Self {
            state,
            disk_index: Some(disk_index),
            archive_index: Some(archive_index),
            host_index: None,
        }
    }
}
