//! Opening and reading AUPK archives.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::header::{self, HEADER_SIZE, IndexEntry, MAX_INDEX_SIZE, Method, StartHeader};
use crate::codec::{ArchiveEntry, InArchive, ItemStream, ReadSeek};
use crate::item::Attributes;
use crate::timestamp::Timestamp;
use crate::{Error, Result};

type Shared = Arc<Mutex<Box<dyn ReadSeek + Send>>>;

fn lock(shared: &Shared) -> io::Result<MutexGuard<'_, Box<dyn ReadSeek + Send>>> {
    shared
        .lock()
        .map_err(|_| io::Error::other("archive reader lock poisoned"))
}

/// An opened AUPK archive.
///
/// The underlying reader is shared by all entry streams; each read seeks to
/// its own position under a lock, so several streams may be open at once.
pub struct SimpleArchive {
    reader: Shared,
    entries: Vec<IndexEntry>,
}

impl SimpleArchive {
    /// Parses the header and index of `reader`.
    pub fn open(mut reader: Box<dyn ReadSeek + Send>) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidFormat("file too short for header".into())
            } else {
                Error::Io(e)
            }
        })?;
        let start = StartHeader::parse(&buf)?;

        let in_range = start
            .index_offset
            .checked_add(start.index_size)
            .is_some_and(|end| start.index_offset >= HEADER_SIZE && end <= file_len);
        if !in_range {
            return Err(Error::corrupt_header(8, "index out of range"));
        }
        if start.index_size > MAX_INDEX_SIZE {
            return Err(Error::corrupt_header(16, "index too large"));
        }

        reader.seek(SeekFrom::Start(start.index_offset))?;
        let mut index = vec![0u8; start.index_size as usize];
        reader.read_exact(&mut index)?;
        if crc32fast::hash(&index) != start.index_crc {
            return Err(Error::corrupt_header(start.index_offset, "index CRC mismatch"));
        }
        let entries = header::parse_index(&index, start.index_offset, start.index_offset)?;
        log::debug!("Opened archive with {} entries", entries.len());

        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            entries,
        })
    }

    /// The raw index records.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub(crate) fn index_entry(&self, index: usize) -> Result<&IndexEntry> {
        self.entries.get(index).ok_or(Error::EntryNotFound { index })
    }

    /// Copies the packed bytes of entry `index` to `out` unchanged.
    pub(crate) fn copy_raw<W: Write + ?Sized>(&self, index: usize, out: &mut W) -> Result<u64> {
        let entry = self.index_entry(index)?;
        let mut src = RangeReader::new(self.reader.clone(), entry.offset, entry.packed);
        let copied = io::copy(&mut src, out)?;
        if copied != entry.packed {
            return Err(Error::corrupt_header(entry.offset, "entry data truncated"));
        }
        Ok(copied)
    }
}

impl std::fmt::Debug for SimpleArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleArchive")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl InArchive for SimpleArchive {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, index: usize) -> Result<ArchiveEntry> {
        let e = self.index_entry(index)?;
        Ok(ArchiveEntry {
            path: e.path.clone(),
            is_dir: e.is_dir(),
            is_alt_stream: e.is_alt_stream(),
            is_anti: false,
            size: Some(e.size),
            mtime: e.mtime.map(Timestamp::from_filetime),
            ctime: e.ctime.map(Timestamp::from_filetime),
            atime: e.atime.map(Timestamp::from_filetime),
            time_precision: e.precision,
            attributes: Some(Attributes::from_raw(e.attributes)),
        })
    }

    fn open_entry(&self, index: usize) -> Result<ItemStream> {
        let e = self.index_entry(index)?;
        let raw = RangeReader::new(self.reader.clone(), e.offset, e.packed);
        let decoded: ItemStream = match e.method {
            Method::Store => Box::new(raw),
            #[cfg(feature = "deflate")]
            Method::Deflate => Box::new(flate2::read::DeflateDecoder::new(raw)),
            #[cfg(not(feature = "deflate"))]
            Method::Deflate => return Err(Error::Unsupported("deflate support is disabled")),
        };
        Ok(Box::new(CheckedReader {
            inner: decoded,
            expected_size: e.size,
            expected_crc: e.crc,
            hasher: crc32fast::Hasher::new(),
            read: 0,
            verified: false,
        }))
    }
}

/// Reads `len` bytes starting at `offset` of the shared reader.
struct RangeReader {
    shared: Shared,
    pos: u64,
    remaining: u64,
}

impl RangeReader {
    fn new(shared: Shared, offset: u64, len: u64) -> Self {
        Self {
            shared,
            pos: offset,
            remaining: len,
        }
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let mut reader = lock(&self.shared)?;
        reader.seek(SeekFrom::Start(self.pos))?;
        let n = reader.read(&mut buf[..want])?;
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Verifies size and CRC of decoded data at end of stream.
struct CheckedReader {
    inner: ItemStream,
    expected_size: u64,
    expected_crc: u32,
    hasher: crc32fast::Hasher,
    read: u64,
    verified: bool,
}

impl Read for CheckedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.verified {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            let crc = self.hasher.clone().finalize();
            if self.read != self.expected_size || crc != self.expected_crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "entry data mismatch: {} bytes (expected {}), CRC {:08x} (expected {:08x})",
                        self.read, self.expected_size, crc, self.expected_crc
                    ),
                ));
            }
            self.verified = true;
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}
