//! Where item bytes come from: disk files or the old archive.
//!
//! Every stream handed to the codec is wrapped in a [`TrackedStream`] that
//! registers itself in a [`StreamRegistry`] until it is dropped, and checks
//! the cancel flag while it is read.

use crate::codec::{InArchive, ItemStream};
use crate::context::CancelFlag;
use crate::item::DiskItems;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// A provider of item streams, addressed by index.
pub trait ItemSource {
    /// Opens the bytes of item `index`.
    fn open(&self, index: usize) -> Result<ItemStream>;

    /// Human-readable name of item `index`, for diagnostics.
    fn describe(&self, index: usize) -> String;
}

/// Streams disk items.
///
/// Regular files are opened by their physical path. Items carrying a reparse
/// payload (symbolic links) yield the payload instead of following the link.
pub struct DiskSource<'a> {
    items: &'a DiskItems,
}

impl<'a> DiskSource<'a> {
    /// Creates a source over `items`.
    pub fn new(items: &'a DiskItems) -> Self {
        Self { items }
    }
}

impl ItemSource for DiskSource<'_> {
    fn open(&self, index: usize) -> Result<ItemStream> {
        let item = self.items.get(index).ok_or(Error::EntryNotFound { index })?;
        if let Some(payload) = &item.reparse {
            return Ok(Box::new(Cursor::new(payload.clone())));
        }
        let file = File::open(&item.path).map_err(|source| Error::OpenItem {
            path: item.path.clone(),
            source,
        })?;
        Ok(Box::new(file))
    }

    fn describe(&self, index: usize) -> String {
        self.items
            .get(index)
            .map(|item| item.path.display().to_string())
            .unwrap_or_else(|| format!("disk item {}", index))
    }
}

/// Streams decoded entries of the archive being updated.
pub struct ArchiveSource<'a> {
    archive: &'a dyn InArchive,
}

impl<'a> ArchiveSource<'a> {
    /// Creates a source over an open archive.
    pub fn new(archive: &'a dyn InArchive) -> Self {
        Self { archive }
    }
}

impl ItemSource for ArchiveSource<'_> {
    fn open(&self, index: usize) -> Result<ItemStream> {
        self.archive.open_entry(index)
    }

    fn describe(&self, index: usize) -> String {
        match self.archive.entry(index) {
            Ok(entry) => entry.path,
            Err(_) => format!("archive entry {}", index),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    open: BTreeMap<u64, String>,
}

/// Streams handed out and not yet dropped.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panic while holding the lock leaves the map itself consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, label: String) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.open.insert(id, label);
        id
    }

    fn release(&self, id: u64) {
        self.lock().open.remove(&id);
    }

    /// Labels of the streams still open, in the order they were opened.
    pub fn open_streams(&self) -> Vec<String> {
        self.lock().open.values().cloned().collect()
    }

    /// Fails with [`Error::UnclosedStreams`] if any stream is still open.
    pub fn check_closed(&self) -> Result<()> {
        let paths: Vec<PathBuf> = self.open_streams().into_iter().map(PathBuf::from).collect();
        if paths.is_empty() {
            Ok(())
        } else {
            Err(Error::UnclosedStreams { paths })
        }
    }

    /// Wraps `inner` so it is tracked and honours `cancel`.
    pub fn track(&self, inner: ItemStream, label: String, cancel: CancelFlag, poll_bytes: u64) -> TrackedStream {
        let id = self.register(label);
        TrackedStream {
            inner,
            registry: self.clone(),
            id,
            cancel,
            poll_bytes: poll_bytes.max(1),
            since_check: 0,
        }
    }
}

/// A stream registered in a [`StreamRegistry`] until dropped.
///
/// Once the cancel flag is raised, reads fail with an I/O error. The flag is
/// checked every `poll_bytes` bytes.
pub struct TrackedStream {
    inner: ItemStream,
    registry: StreamRegistry,
    id: u64,
    cancel: CancelFlag,
    poll_bytes: u64,
    since_check: u64,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.since_check >= self.poll_bytes {
            self.since_check = 0;
            if self.cancel.is_cancelled() {
                return Err(io::Error::other("operation cancelled"));
            }
        }
        let n = self.inner.read(buf)?;
        self.since_check += n as u64;
        Ok(n)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl std::fmt::Debug for TrackedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedStream")
            .field("id", &self.id)
            .field("poll_bytes", &self.poll_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DiskItem;
    use crate::scan::DiskItemsBuilder;
    use crate::timestamp::Timestamp;

    #[test]
    fn test_registry_tracks_until_drop() {
        let registry = StreamRegistry::new();
        let a = registry.track(Box::new(Cursor::new(vec![1u8])), "a".into(), CancelFlag::new(), 1);
        let b = registry.track(Box::new(Cursor::new(vec![2u8])), "b".into(), CancelFlag::new(), 1);
        assert_eq!(registry.open_streams(), vec!["a".to_string(), "b".to_string()]);
        drop(a);
        match registry.check_closed() {
            Err(Error::UnclosedStreams { paths }) => assert_eq!(paths, vec![PathBuf::from("b")]),
            other => panic!("unexpected {:?}", other),
        }
        drop(b);
        registry.check_closed().unwrap();
    }

    #[test]
    fn test_cancel_during_read() {
        let cancel = CancelFlag::new();
        let registry = StreamRegistry::new();
        let mut stream = registry.track(Box::new(Cursor::new(vec![0u8; 64])), "x".into(), cancel.clone(), 16);
        let mut buf = [0u8; 16];
        stream.read_exact(&mut buf).unwrap();
        cancel.cancel();
        assert!(stream.read(&mut buf).is_err());
    }

    #[test]
    fn test_disk_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"content").unwrap();

        let mut builder = DiskItemsBuilder::new();
        builder.push(DiskItem::file("f.txt", &path, 7, Timestamp::default()));
        builder.push(DiskItem::file("link", dir.path().join("link"), 0, Timestamp::default()).with_link_target(b"f.txt".to_vec()));
        builder.push(DiskItem::file("gone", dir.path().join("gone"), 1, Timestamp::default()));
        let items = builder.build();
        let source = DiskSource::new(&items);

        let mut data = Vec::new();
        source.open(0).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"content");

        data.clear();
        source.open(1).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"f.txt");

        assert!(matches!(source.open(2), Err(Error::OpenItem { .. })));
        assert!(source.describe(2).ends_with("gone"));
    }
}
