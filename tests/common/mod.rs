//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use arcupdate::codec::simple::SimpleFormat;
use arcupdate::codec::{ArchiveFormat, InArchive, ReadSeek};
use arcupdate::filter::AllowAll;
use arcupdate::item::{DiskItem, DiskItems};
use arcupdate::progress::NoProgress;
use arcupdate::scan::DiskItemsBuilder;
use arcupdate::{ArchiveUpdater, Timestamp, UpdateJob, UpdateOptions, UpdateOutcome, VolumeReader};
use tempfile::TempDir;

/// A temporary workspace with a source directory and a target archive path.
pub struct Fixture {
    pub dir: TempDir,
    pub src: PathBuf,
    pub target: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create source dir");
        let target = dir.path().join("test.aupk");
        Self { dir, src, target }
    }

    /// Writes `data` to `src/<name>` with the given mtime and returns the
    /// matching disk item.
    pub fn file(&self, name: &str, data: &[u8], secs: i64) -> DiskItem {
        let path = self.src.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, data).expect("Failed to write file");
        let mtime = Timestamp::from_unix_secs(secs).expect("Invalid time");
        filetime::set_file_mtime(&path, mtime.as_file_time()).expect("Failed to set mtime");
        DiskItem::file(name, path, data.len() as u64, mtime)
    }

    /// Paths of every file in the workspace root, sorted.
    pub fn root_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.dir.path())
            .expect("Failed to read dir")
            .map(|e| e.expect("Failed to read entry").file_name().to_string_lossy().into_owned())
            .filter(|name| name != "src")
            .collect();
        names.sort();
        names
    }

    /// Runs an update with default reporting.
    pub fn update(&self, options: UpdateOptions, disk: &DiskItems) -> arcupdate::Result<UpdateOutcome> {
        let job = UpdateJob::new(&self.target).options(options);
        ArchiveUpdater::new(SimpleFormat::new()).update(&job, disk, &AllowAll, &mut NoProgress)
    }
}

/// Builds a `DiskItems` list from individual items.
pub fn disk_items(items: impl IntoIterator<Item = DiskItem>) -> DiskItems {
    let mut builder = DiskItemsBuilder::new();
    for item in items {
        builder.push(item);
    }
    builder.build()
}

/// Reads every entry of an archive (single file or volume set) as
/// `(path, bytes, mtime seconds)`.
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>, Option<i64>)> {
    let reader: Box<dyn ReadSeek + Send> = if path.is_file() {
        Box::new(BufReader::new(File::open(path).expect("Failed to open archive")))
    } else {
        Box::new(VolumeReader::open(path).expect("Failed to open volume set"))
    };
    let archive = SimpleFormat::new().open(reader).expect("Failed to parse archive");
    (0..archive.len())
        .map(|index| {
            let entry = archive.entry(index).expect("Failed to read entry");
            let mut data = Vec::new();
            if !entry.is_dir {
                archive
                    .open_entry(index)
                    .expect("Failed to open entry")
                    .read_to_end(&mut data)
                    .expect("Failed to read entry data");
            }
            (entry.path, data, entry.mtime.map(|t| t.as_unix_secs()))
        })
        .collect()
}

/// Names of the entries of an archive, in archive order.
pub fn entry_names(path: &Path) -> Vec<String> {
    read_archive(path).into_iter().map(|(name, _, _)| name).collect()
}

/// The raw data region of one entry, as stored (compressed or not).
///
/// Used to check that kept entries were copied and not re-encoded.
pub fn stored_bytes(path: &Path, name: &str) -> Option<Vec<u8>> {
    let bytes = fs::read(path).ok()?;
    let format = SimpleFormat::new();
    let archive = format
        .open(Box::new(std::io::Cursor::new(bytes.clone())))
        .ok()?;
    let entry = archive.entries().iter().find(|e| e.path == name)?;
    let start = entry.offset as usize;
    Some(bytes[start..start + entry.packed as usize].to_vec())
}
