//! Entries read from an existing archive.

use crate::timestamp::ItemTime;

/// One entry of the archive being updated, as seen by the pairing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveItem {
    /// Logical path.
    pub name: String,
    /// Size in bytes; `None` when the codec cannot tell cheaply.
    pub size: Option<u64>,
    /// Modification time; the archive's own mtime when the entry has none.
    pub mtime: Option<ItemTime>,
    /// True for directory entries.
    pub is_dir: bool,
    /// True for alternate stream entries (`host:stream`).
    pub is_alt_stream: bool,
    /// True if the entry survived the include/exclude filter.
    pub censored: bool,
    /// Index of the entry in the underlying archive.
    pub index: usize,
}

impl ArchiveItem {
    /// Returns true if the size is known and equals `size`.
    pub fn has_size(&self, size: u64) -> bool {
        self.size == Some(size)
    }
}
