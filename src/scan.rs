//! Scanner adapter: turns directory listings into [`DiskItems`].
//!
//! Any directory walker can feed a [`DiskItemsBuilder`]: push items in the
//! order they were found and push an error for every path that could not be
//! read. The builder fills in parent indices and statistics.
//!
//! With the `scanner` feature, [`DirScanner`] walks real directories using
//! `walkdir`.
//!
//! # Example
//!
//! ```rust
//! use arcupdate::item::DiskItem;
//! use arcupdate::scan::DiskItemsBuilder;
//! use arcupdate::Timestamp;
//!
//! let mut builder = DiskItemsBuilder::new();
//! builder.push(DiskItem::directory("docs", "/src/docs", Timestamp::default()));
//! builder.push(DiskItem::file("docs/a.txt", "/src/docs/a.txt", 12, Timestamp::default()));
//! let items = builder.build();
//!
//! assert_eq!(items.len(), 2);
//! assert_eq!(items[1].parent, Some(0));
//! assert_eq!(items.stats().total_bytes, 12);
//! ```

use crate::archive_path;
use crate::item::{DiskItem, DiskItems, ScanError, ScanStats};
use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Incrementally builds a [`DiskItems`] list.
#[derive(Debug, Default)]
pub struct DiskItemsBuilder {
    items: Vec<DiskItem>,
    stats: ScanStats,
    errors: Vec<ScanError>,
    dirs: HashMap<String, usize>,
}

impl DiskItemsBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item and returns its index.
    ///
    /// If the item's logical parent was pushed earlier its index is recorded
    /// in [`DiskItem::parent`].
    pub fn push(&mut self, mut item: DiskItem) -> usize {
        let index = self.items.len();
        if item.parent.is_none() {
            let parent_name = if item.is_alt_stream {
                item.host_name().and_then(archive_path::parent)
            } else {
                archive_path::parent(&item.name)
            };
            item.parent = parent_name.and_then(|p| self.dirs.get(p).copied());
        }

        if item.is_dir() {
            self.stats.dirs += 1;
            self.dirs.insert(item.name.clone(), index);
        } else if item.is_alt_stream {
            self.stats.alt_streams += 1;
            self.stats.total_bytes += item.size;
        } else {
            self.stats.files += 1;
            self.stats.total_bytes += item.size;
        }
        self.items.push(item);
        index
    }

    /// Records a path that could not be read.
    ///
    /// The error is accumulated; scanning continues.
    pub fn push_error(&mut self, path: impl AsRef<Path>, err: &io::Error) {
        let path = path.as_ref();
        log::warn!("Cannot read {}: {}", path.display(), err);
        self.stats.errors += 1;
        self.errors.push(ScanError::from_io(path, err));
    }

    /// Number of items pushed so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no item was pushed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finishes the list.
    pub fn build(self) -> DiskItems {
        DiskItems {
            items: self.items,
            stats: self.stats,
            errors: self.errors,
        }
    }
}

#[cfg(feature = "scanner")]
pub use dir::DirScanner;

#[cfg(feature = "scanner")]
mod dir {
    use super::DiskItemsBuilder;
    use crate::archive_path;
    use crate::filter::{AllowAll, PathFilter};
    use crate::item::{Attributes, DiskItem, DiskItems};
    use crate::timestamp::{TimePrecision, Timestamp};
    use std::fs;
    use std::path::{Path, PathBuf};
    use walkdir::WalkDir;

    /// Walks directories and files into a [`DiskItems`] list.
    ///
    /// Each root is added under its own file name, so scanning `/src/docs`
    /// yields `docs`, `docs/a.txt`, and so on. Symbolic links are not
    /// followed; they are recorded with their target as reparse payload.
    ///
    /// ```rust,ignore
    /// use arcupdate::scan::DirScanner;
    ///
    /// let items = DirScanner::new().exclude_path("/src/out.aupk").scan(&["/src/docs"]);
    /// println!("{} files, {} errors", items.stats().files, items.errors().len());
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct DirScanner {
        excluded: Vec<PathBuf>,
        recursive: bool,
    }

    impl DirScanner {
        /// Creates a recursive scanner.
        pub fn new() -> Self {
            Self {
                excluded: Vec::new(),
                recursive: true,
            }
        }

        /// Only scans the roots themselves and their direct children.
        pub fn recursive(mut self, recursive: bool) -> Self {
            self.recursive = recursive;
            self
        }

        /// Skips a physical path (and everything below it).
        pub fn exclude_path(mut self, path: impl Into<PathBuf>) -> Self {
            self.excluded.push(path.into());
            self
        }

        /// Scans the given roots in order.
        ///
        /// Unreadable paths are recorded as scan errors.
        pub fn scan<P: AsRef<Path>>(&self, roots: &[P]) -> DiskItems {
            self.scan_filtered(roots, &AllowAll)
        }

        /// Scans the given roots, keeping only items whose logical name
        /// `filter` accepts.
        ///
        /// Rejected directories are still descended into.
        pub fn scan_filtered<P: AsRef<Path>>(&self, roots: &[P], filter: &dyn PathFilter) -> DiskItems {
            let mut builder = DiskItemsBuilder::new();
            for root in roots {
                self.scan_root(root.as_ref(), filter, &mut builder);
            }
            builder.build()
        }

        fn scan_root(&self, root: &Path, filter: &dyn PathFilter, builder: &mut DiskItemsBuilder) {
            let base = root.parent().unwrap_or_else(|| Path::new(""));
            let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
            if !self.recursive {
                walker = walker.max_depth(1);
            }
            let mut it = walker.into_iter();
            while let Some(entry) = it.next() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                        let io_err = err
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                        builder.push_error(path, &io_err);
                        continue;
                    }
                };
                let path = entry.path();
                if self.excluded.iter().any(|ex| path == ex) {
                    if entry.file_type().is_dir() {
                        it.skip_current_dir();
                    }
                    continue;
                }
                let rel = path.strip_prefix(base).unwrap_or(path);
                let name = match archive_path::from_relative(rel) {
                    Ok(name) => name,
                    Err(err) => {
                        builder.push_error(path, &std::io::Error::other(err.to_string()));
                        continue;
                    }
                };
                if !filter.allows_all() && !filter.check(&name, entry.file_type().is_dir()) {
                    continue;
                }
                match disk_item(name, path) {
                    Ok(item) => {
                        builder.push(item);
                    }
                    Err(err) => builder.push_error(path, &err),
                }
            }
        }
    }

    fn disk_item(name: String, path: &Path) -> std::io::Result<DiskItem> {
        let meta = fs::symlink_metadata(path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(Timestamp::from_system_time)
            .unwrap_or_default();
        let ctime = meta.created().ok().and_then(Timestamp::from_system_time);
        let atime = meta.accessed().ok().and_then(Timestamp::from_system_time);
        let attributes = Attributes::from_metadata(&meta);

        let item = if meta.is_dir() {
            DiskItem::directory(name, path, mtime)
        } else if meta.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            DiskItem::file(name, path, 0, mtime)
                .with_link_target(target.to_string_lossy().into_owned().into_bytes())
        } else {
            DiskItem::file(name, path, meta.len(), mtime)
        };

        let precision = if cfg!(windows) {
            TimePrecision::Windows
        } else {
            TimePrecision::HighPrecision
        };
        let attributes = if item.reparse.is_some() {
            Attributes::from_raw(attributes.raw() | Attributes::REPARSE_POINT)
        } else {
            attributes
        };
        Ok(item
            .with_attributes(attributes)
            .with_times(ctime, atime)
            .with_time_precision(precision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Timestamp;

    #[test]
    fn test_parent_indices_and_stats() {
        let mut b = DiskItemsBuilder::new();
        b.push(DiskItem::directory("a", "/a", Timestamp::default()));
        b.push(DiskItem::directory("a/b", "/a/b", Timestamp::default()));
        b.push(DiskItem::file("a/b/f", "/a/b/f", 10, Timestamp::default()));
        b.push(DiskItem::alt_stream("a/b/f:s", "/a/b/f:s", 5, Timestamp::default()));
        b.push(DiskItem::file("loose", "/loose", 1, Timestamp::default()));
        let items = b.build();

        assert_eq!(items[1].parent, Some(0));
        assert_eq!(items[2].parent, Some(1));
        assert_eq!(items[3].parent, Some(1));
        assert_eq!(items[4].parent, None);
        let stats = items.stats();
        assert_eq!((stats.dirs, stats.files, stats.alt_streams), (2, 2, 1));
        assert_eq!(stats.total_bytes, 16);
    }

    #[test]
    fn test_errors_are_accumulated() {
        let mut b = DiskItemsBuilder::new();
        b.push_error("/nope", &io::Error::new(io::ErrorKind::NotFound, "gone"));
        b.push(DiskItem::file("f", "/f", 1, Timestamp::default()));
        let items = b.build();
        assert_eq!(items.len(), 1);
        assert_eq!(items.errors().len(), 1);
        assert_eq!(items.stats().errors, 1);
    }

    #[cfg(feature = "scanner")]
    #[test]
    fn test_dir_scanner_walks_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/x.txt"), b"hello").unwrap();
        std::fs::write(root.join("y.txt"), b"hi").unwrap();
        std::fs::write(root.join("skip.bin"), b"no").unwrap();

        let items = DirScanner::new()
            .exclude_path(root.join("skip.bin"))
            .scan(&[&root]);
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["data", "data/sub", "data/sub/x.txt", "data/y.txt"]);
        assert_eq!(items.stats().total_bytes, 7);
        assert!(items.errors().is_empty());
    }

    #[cfg(feature = "scanner")]
    #[test]
    fn test_dir_scanner_filter() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(root.join("logs")).unwrap();
        std::fs::write(root.join("logs/a.log"), b"log").unwrap();
        std::fs::write(root.join("logs/a.txt"), b"txt").unwrap();

        let filter = crate::filter::PatternFilter::new(&["*"], &["*.log"]).unwrap();
        let items = DirScanner::new().scan_filtered(&[&root], &filter);
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["data", "data/logs", "data/logs/a.txt"]);
        assert_eq!(items[2].parent, Some(1));
    }
}
