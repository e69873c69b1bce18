//! The codec boundary.
//!
//! The update engine does not know how an archive is laid out on disk. It
//! talks to a codec through three traits:
//!
//! - [`ArchiveFormat`]: opens existing archives, reports its timestamp
//!   precision and writes a new archive in one [`update_items`] call.
//! - [`InArchive`]: read access to an opened archive (entry metadata and
//!   decoded entry bytes).
//! - [`UpdateCallback`]: implemented by the engine; the codec asks it, per
//!   output item, for properties and for a data stream.
//!
//! The crate ships one implementation, [`simple::SimpleFormat`], a minimal
//! container used to drive and test the pipeline.
//!
//! # Contract for `update_items`
//!
//! For every index `i` in `0..callback.len()`, in order, the codec calls
//! [`UpdateCallback::props`]. Then:
//!
//! - anti items are recorded as deletions, or skipped if the format has no
//!   such notion;
//! - items without new data are copied from the old archive using
//!   `archive_index`. A codec that cannot copy an entry verbatim may ask
//!   [`UpdateCallback::open_stream`] for its decoded bytes instead;
//! - items with new data are read from [`UpdateCallback::open_stream`]. A
//!   `None` stream means the item was skipped and must not be written.
//!
//! Every stream obtained from the callback must be dropped before
//! `update_items` returns.
//!
//! [`update_items`]: ArchiveFormat::update_items

pub mod simple;

use crate::Result;
use crate::item::Attributes;
use crate::stream::OutputStream;
use crate::timestamp::{TimePrecision, Timestamp};
use std::io::{Read, Seek};

/// A readable, seekable byte source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Stream of item bytes handed to a codec.
pub type ItemStream = Box<dyn Read + Send>;

/// Metadata of one entry in an existing archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveEntry {
    /// Logical path.
    pub path: String,
    /// Directory entry.
    pub is_dir: bool,
    /// Alternate stream entry.
    pub is_alt_stream: bool,
    /// Deletion marker.
    pub is_anti: bool,
    /// Unpacked size, if known.
    pub size: Option<u64>,
    /// Modification time, if stored.
    pub mtime: Option<Timestamp>,
    /// Creation time, if stored.
    pub ctime: Option<Timestamp>,
    /// Access time, if stored.
    pub atime: Option<Timestamp>,
    /// Precision of the stored times; `Unknown` means the format default.
    pub time_precision: TimePrecision,
    /// Attribute bits, if stored.
    pub attributes: Option<Attributes>,
}

/// Read access to an opened archive.
///
/// Methods take `&self`; implementations that share a file handle are
/// expected to serialize access internally.
pub trait InArchive {
    /// Number of entries.
    fn len(&self) -> usize;

    /// Returns true if the archive has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata of entry `index`.
    fn entry(&self, index: usize) -> Result<ArchiveEntry>;

    /// Opens a stream of the decoded bytes of entry `index`.
    fn open_entry(&self, index: usize) -> Result<ItemStream>;
}

/// An archive codec.
pub trait ArchiveFormat {
    /// The opened-archive type.
    type Archive: InArchive;

    /// Precision at which this format stores modification times.
    fn time_precision(&self) -> TimePrecision;

    /// Opens an existing archive.
    fn open(&self, reader: Box<dyn ReadSeek + Send>) -> Result<Self::Archive>;

    /// Writes a new archive to `output`.
    ///
    /// `old` is the archive being updated, if any; entries without new data
    /// are copied from it.
    fn update_items(
        &self,
        old: Option<&Self::Archive>,
        output: &mut dyn OutputStream,
        callback: &mut dyn UpdateCallback,
    ) -> Result<()>;
}

/// Properties of one output item, as answered by [`UpdateCallback::props`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateItemProps {
    /// The item's data must be read from [`UpdateCallback::open_stream`].
    pub new_data: bool,
    /// Metadata below replaces the old entry's metadata.
    pub new_props: bool,
    /// Entry in the old archive this item comes from, if any.
    pub archive_index: Option<usize>,
    /// Logical path.
    pub path: String,
    /// Directory item.
    pub is_dir: bool,
    /// Deletion marker.
    pub is_anti: bool,
    /// Alternate stream.
    pub is_alt_stream: bool,
    /// Size of the data, when known in advance.
    pub size: u64,
    /// Modification time.
    pub mtime: Option<Timestamp>,
    /// Creation time.
    pub ctime: Option<Timestamp>,
    /// Access time.
    pub atime: Option<Timestamp>,
    /// Attribute bits.
    pub attributes: Attributes,
}

/// Outcome of processing one item, reported by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The item was written.
    Ok,
    /// The item's data could not be read; it was not written.
    Skipped,
    /// The item was written, but its size differed from the announced one,
    /// usually because the file changed while it was read.
    DataError,
}

/// Item provider implemented by the update engine.
pub trait UpdateCallback {
    /// Number of output items.
    fn len(&self) -> usize;

    /// Returns true if there is nothing to write.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Properties of item `index`.
    fn props(&mut self, index: usize) -> Result<UpdateItemProps>;

    /// Opens the data of item `index`.
    ///
    /// Returns `Ok(None)` if the item could not be opened and the engine
    /// chose to skip it.
    fn open_stream(&mut self, index: usize) -> Result<Option<ItemStream>>;

    /// Reports how item `index` was handled.
    fn set_operation_result(&mut self, index: usize, result: OperationResult) -> Result<()>;

    /// Reports bytes consumed from inputs and written to the output so far.
    ///
    /// Returning an error aborts the update.
    fn report_progress(&mut self, in_bytes: u64, out_bytes: u64) -> Result<()>;
}
