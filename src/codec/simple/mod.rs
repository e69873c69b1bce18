//! A minimal reference container ("AUPK").
//!
//! The container stores entries back to back after a fixed start header and
//! ends with an index. It exists to exercise the update engine end to end:
//! kept entries are copied byte for byte from the old archive, new entries
//! are stored or deflated, and the start header is rewritten after the body,
//! which is exactly the access pattern multi-volume output has to support.
//!
//! # Example
//!
//! ```rust
//! use arcupdate::codec::simple::{Method, SimpleFormat};
//!
//! let format = SimpleFormat::new().method(Method::Store).convert_kept(false);
//! assert_eq!(format.stored_method(), Method::Store);
//! ```

mod header;
mod reader;
mod writer;

pub use header::{IndexEntry, Method, StartHeader, HEADER_SIZE, MAGIC};
pub use reader::SimpleArchive;

use crate::Result;
use crate::codec::{ArchiveFormat, ReadSeek, UpdateCallback};
use crate::stream::OutputStream;
use crate::timestamp::TimePrecision;

/// The AUPK codec and its write options.
#[derive(Debug, Clone)]
pub struct SimpleFormat {
    method: Method,
    level: u32,
    convert_kept: bool,
    precision: TimePrecision,
}

impl Default for SimpleFormat {
    fn default() -> Self {
        Self {
            method: if cfg!(feature = "deflate") {
                Method::Deflate
            } else {
                Method::Store
            },
            level: 6,
            convert_kept: false,
            precision: TimePrecision::Windows,
        }
    }
}

impl SimpleFormat {
    /// Creates the codec with default options (deflate at level 6 when
    /// available).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method for new entries.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the deflate level, clamped to 0-9.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Re-encodes kept entries whose method differs from [`method`].
    ///
    /// Off by default: kept entries are copied without decoding.
    ///
    /// [`method`]: Self::method
    pub fn convert_kept(mut self, convert: bool) -> Self {
        self.convert_kept = convert;
        self
    }

    /// Sets the timestamp precision this codec stores and reports.
    pub fn precision(mut self, precision: TimePrecision) -> Self {
        self.precision = precision;
        self
    }

    /// The method used for new entries.
    pub fn stored_method(&self) -> Method {
        self.method
    }
}

impl ArchiveFormat for SimpleFormat {
    type Archive = SimpleArchive;

    fn time_precision(&self) -> TimePrecision {
        self.precision
    }

    fn open(&self, reader: Box<dyn ReadSeek + Send>) -> Result<SimpleArchive> {
        SimpleArchive::open(reader)
    }

    fn update_items(
        &self,
        old: Option<&SimpleArchive>,
        output: &mut dyn OutputStream,
        callback: &mut dyn UpdateCallback,
    ) -> Result<()> {
        writer::write_archive(self, old, output, callback)
    }
}
