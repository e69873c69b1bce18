//! Items found on disk.

use super::Attributes;
use crate::archive_path;
use crate::timestamp::{ItemTime, TimePrecision, Timestamp};
use std::io;
use std::path::{Path, PathBuf};

/// One file, directory or alternate stream found by the scanner.
///
/// Disk items are immutable once produced and live for one update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskItem {
    /// Logical path inside the archive (`/` separated).
    pub name: String,
    /// Physical path used to open the item.
    pub path: PathBuf,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Creation time, if the filesystem reports one.
    pub ctime: Option<Timestamp>,
    /// Last access time.
    pub atime: Option<Timestamp>,
    /// Last modification time.
    pub mtime: Timestamp,
    /// Precision of the times above.
    pub time_precision: TimePrecision,
    /// Attribute bits.
    pub attributes: Attributes,
    /// Index of the parent directory item, when it is part of the same scan.
    pub parent: Option<usize>,
    /// Index into an external security-descriptor table.
    pub security_index: Option<usize>,
    /// Reparse payload; for symbolic links this is the link target.
    pub reparse: Option<Vec<u8>>,
    /// True for alternate data streams (`host:stream`).
    pub is_alt_stream: bool,
}

impl DiskItem {
    /// Creates a regular file item.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>, size: u64, mtime: Timestamp) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            ctime: None,
            atime: None,
            mtime,
            time_precision: TimePrecision::Windows,
            attributes: Attributes::file(),
            parent: None,
            security_index: None,
            reparse: None,
            is_alt_stream: false,
        }
    }

    /// Creates a directory item.
    pub fn directory(name: impl Into<String>, path: impl Into<PathBuf>, mtime: Timestamp) -> Self {
        Self {
            attributes: Attributes::directory(),
            ..Self::file(name, path, 0, mtime)
        }
    }

    /// Creates an alternate stream item; `name` must be `host:stream`.
    pub fn alt_stream(name: impl Into<String>, path: impl Into<PathBuf>, size: u64, mtime: Timestamp) -> Self {
        Self {
            is_alt_stream: true,
            ..Self::file(name, path, size, mtime)
        }
    }

    /// Sets the attribute bits.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets the precision the times were captured at.
    pub fn with_time_precision(mut self, precision: TimePrecision) -> Self {
        self.time_precision = precision;
        self
    }

    /// Sets creation and access times.
    pub fn with_times(mut self, ctime: Option<Timestamp>, atime: Option<Timestamp>) -> Self {
        self.ctime = ctime;
        self.atime = atime;
        self
    }

    /// Marks the item as a symbolic link with the given target.
    pub fn with_link_target(mut self, target: impl Into<Vec<u8>>) -> Self {
        let target = target.into();
        self.size = target.len() as u64;
        self.reparse = Some(target);
        self.attributes = Attributes::from_raw(self.attributes.raw() | Attributes::REPARSE_POINT);
        self
    }

    /// Sets the security descriptor index.
    pub fn with_security_index(mut self, index: usize) -> Self {
        self.security_index = Some(index);
        self
    }

    /// Returns true for directories.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.attributes.is_dir()
    }

    /// Modification time with its precision, for pairing.
    pub fn mtime_item(&self) -> ItemTime {
        ItemTime::new(self.mtime, self.time_precision)
    }

    /// Logical name of the host file, for alternate streams.
    pub fn host_name(&self) -> Option<&str> {
        if self.is_alt_stream {
            archive_path::split_alt_stream(&self.name).map(|(host, _)| host)
        } else {
            None
        }
    }
}

/// Aggregate counts for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Regular files (and links).
    pub files: u64,
    /// Directories.
    pub dirs: u64,
    /// Alternate streams.
    pub alt_streams: u64,
    /// Sum of file and stream sizes.
    pub total_bytes: u64,
    /// Paths that could not be read.
    pub errors: u64,
}

/// A path the scanner could not read.
///
/// Scan errors are not fatal; they are collected and reported in the final
/// [`UpdateOutcome`](crate::update::UpdateOutcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    /// The unreadable path.
    pub path: PathBuf,
    /// OS error code, when available.
    pub os_code: Option<i32>,
    /// Human-readable message.
    pub message: String,
}

impl ScanError {
    /// Builds a scan error from an I/O error.
    pub fn from_io(path: impl AsRef<Path>, err: &io::Error) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            os_code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// The ordered result of a scan.
///
/// Built through [`DiskItemsBuilder`](crate::scan::DiskItemsBuilder).
#[derive(Debug, Clone, Default)]
pub struct DiskItems {
    pub(crate) items: Vec<DiskItem>,
    pub(crate) stats: ScanStats,
    pub(crate) errors: Vec<ScanError>,
}

impl DiskItems {
    /// An empty item list, as used by delete and rename runs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item at `index`.
    pub fn get(&self, index: usize) -> Option<&DiskItem> {
        self.items.get(index)
    }

    /// All items in scan order.
    pub fn items(&self) -> &[DiskItem] {
        &self.items
    }

    /// Iterates the items in scan order.
    pub fn iter(&self) -> std::slice::Iter<'_, DiskItem> {
        self.items.iter()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Accumulated scan errors.
    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }
}

impl std::ops::Index<usize> for DiskItems {
    type Output = DiskItem;

    fn index(&self, index: usize) -> &DiskItem {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a DiskItems {
    type Item = &'a DiskItem;
    type IntoIter = std::slice::Iter<'a, DiskItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_target_sets_reparse() {
        let item = DiskItem::file("l", "/x/l", 0, Timestamp::default()).with_link_target(b"target".to_vec());
        assert_eq!(item.size, 6);
        assert!(item.attributes.is_reparse_point());
        assert_eq!(item.reparse.as_deref(), Some(&b"target"[..]));
    }

    #[test]
    fn test_alt_stream_host() {
        let item = DiskItem::alt_stream("dir/a.txt:zone", "/x", 3, Timestamp::default());
        assert_eq!(item.host_name(), Some("dir/a.txt"));
        let plain = DiskItem::file("dir/a.txt", "/x", 3, Timestamp::default());
        assert_eq!(plain.host_name(), None);
    }

    #[test]
    fn test_scan_error_from_io() {
        let err = io::Error::from_raw_os_error(13);
        let scan = ScanError::from_io("/root/secret", &err);
        assert_eq!(scan.os_code, Some(13));
        assert!(!scan.message.is_empty());
    }
}
