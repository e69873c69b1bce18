//! On-disk structures of the AUPK container.
//!
//! ```text
//! +----------------------+  offset 0
//! | start header (32 B)  |
//! +----------------------+  offset 32
//! | entry data ...       |  packed bytes of every entry, back to back
//! +----------------------+  index_offset
//! | index                |  one record per entry
//! +----------------------+
//! ```
//!
//! All integers are little-endian. The start header is written last, after
//! the body and index, so a truncated file is detected by its CRC.

use crate::timestamp::TimePrecision;
use crate::{Error, Result};

/// File signature.
pub const MAGIC: [u8; 4] = *b"AUPK";
/// Current container version.
pub const VERSION: u16 = 1;
/// Size of the start header in bytes.
pub const HEADER_SIZE: u64 = 32;
/// Upper bound on the index size accepted when parsing.
pub const MAX_INDEX_SIZE: u64 = 256 * 1024 * 1024;

/// Entry flag: directory.
pub const FLAG_DIR: u8 = 0x01;
/// Entry flag: alternate stream.
pub const FLAG_ALT_STREAM: u8 = 0x02;
/// Entry flag: modification time present.
pub const FLAG_MTIME: u8 = 0x08;
/// Entry flag: creation time present.
pub const FLAG_CTIME: u8 = 0x10;
/// Entry flag: access time present.
pub const FLAG_ATIME: u8 = 0x20;

/// Storage method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Bytes stored as-is.
    #[default]
    Store,
    /// Raw deflate stream.
    Deflate,
}

impl Method {
    fn id(self) -> u8 {
        match self {
            Method::Store => 0,
            Method::Deflate => 1,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Method::Store),
            1 => Some(Method::Deflate),
            _ => None,
        }
    }
}

/// The fixed-size start header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartHeader {
    /// Reserved flags.
    pub flags: u16,
    /// Offset of the index.
    pub index_offset: u64,
    /// Size of the index in bytes.
    pub index_size: u64,
    /// CRC32 of the index bytes.
    pub index_crc: u32,
}

impl StartHeader {
    /// Serializes the header, including its own CRC.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.index_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.index_crc.to_le_bytes());
        let crc = crc32fast::hash(&buf[0..28]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses and verifies a start header.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(Error::InvalidFormat("file too short for header".into()));
        }
        if buf[0..4] != MAGIC {
            return Err(Error::InvalidFormat("bad signature".into()));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(Error::InvalidFormat(format!("unsupported version {}", version)));
        }
        let stored_crc = read_u32(buf, 28);
        if crc32fast::hash(&buf[0..28]) != stored_crc {
            return Err(Error::corrupt_header(28, "start header CRC mismatch"));
        }
        Ok(Self {
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            index_offset: read_u64(buf, 8),
            index_size: read_u64(buf, 16),
            index_crc: read_u32(buf, 24),
        })
    }
}

/// One record of the index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexEntry {
    /// Logical path.
    pub path: String,
    /// `FLAG_*` bits.
    pub flags: u8,
    /// Attribute word.
    pub attributes: u32,
    /// Modification time (FILETIME).
    pub mtime: Option<u64>,
    /// Creation time (FILETIME).
    pub ctime: Option<u64>,
    /// Access time (FILETIME).
    pub atime: Option<u64>,
    /// Precision of the stored times.
    pub precision: TimePrecision,
    /// Unpacked size.
    pub size: u64,
    /// Packed size.
    pub packed: u64,
    /// Offset of the packed bytes.
    pub offset: u64,
    /// Storage method.
    pub method: Method,
    /// CRC32 of the unpacked bytes.
    pub crc: u32,
}

impl IndexEntry {
    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.flags & FLAG_DIR != 0
    }

    /// Returns true for alternate streams.
    pub fn is_alt_stream(&self) -> bool {
        self.flags & FLAG_ALT_STREAM != 0
    }

    fn time_flags(&self) -> u8 {
        let mut flags = self.flags & !(FLAG_MTIME | FLAG_CTIME | FLAG_ATIME);
        if self.mtime.is_some() {
            flags |= FLAG_MTIME;
        }
        if self.ctime.is_some() {
            flags |= FLAG_CTIME;
        }
        if self.atime.is_some() {
            flags |= FLAG_ATIME;
        }
        flags
    }

    /// Appends the serialized record to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let path = self.path.as_bytes();
        let len = u16::try_from(path.len())
            .map_err(|_| Error::InvalidPath(format!("'{}' is too long", self.path)))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(path);
        out.push(self.time_flags());
        out.extend_from_slice(&self.attributes.to_le_bytes());
        for time in [self.mtime, self.ctime, self.atime].into_iter().flatten() {
            out.extend_from_slice(&time.to_le_bytes());
        }
        out.push(encode_precision(self.precision));
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.packed.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.push(self.method.id());
        out.extend_from_slice(&self.crc.to_le_bytes());
        Ok(())
    }
}

/// Serializes a complete index.
pub fn encode_index(entries: &[IndexEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(entries.len() * 64 + 4);
    let count = u32::try_from(entries.len())
        .map_err(|_| Error::Unsupported("more than 4G entries"))?;
    out.extend_from_slice(&count.to_le_bytes());
    for entry in entries {
        entry.encode(&mut out)?;
    }
    Ok(out)
}

/// Parses an index. `base` is the index offset, used in error positions.
///
/// Entries must lie between the start header and `data_end`.
pub fn parse_index(buf: &[u8], base: u64, data_end: u64) -> Result<Vec<IndexEntry>> {
    let mut cur = Cursor { buf, pos: 0, base };
    let count = cur.u32()? as usize;
    // Each record takes at least 36 bytes; reject counts the buffer cannot hold.
    if count > buf.len() / 36 + 1 {
        return Err(Error::corrupt_header(base, format!("entry count {} too large", count)));
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let at = cur.offset();
        let len = cur.u16()? as usize;
        let path = std::str::from_utf8(cur.take(len)?)
            .map_err(|_| Error::corrupt_header(at, "path is not UTF-8"))?
            .to_string();
        let flags = cur.u8()?;
        let attributes = cur.u32()?;
        let mtime = if flags & FLAG_MTIME != 0 { Some(cur.u64()?) } else { None };
        let ctime = if flags & FLAG_CTIME != 0 { Some(cur.u64()?) } else { None };
        let atime = if flags & FLAG_ATIME != 0 { Some(cur.u64()?) } else { None };
        let precision = decode_precision(cur.u8()?);
        let size = cur.u64()?;
        let packed = cur.u64()?;
        let offset = cur.u64()?;
        let method_at = cur.offset();
        let method = Method::from_id(cur.u8()?)
            .ok_or_else(|| Error::corrupt_header(method_at, "unknown method"))?;
        let crc = cur.u32()?;

        let end = offset.checked_add(packed);
        if offset < HEADER_SIZE || end.is_none_or(|end| end > data_end) {
            return Err(Error::corrupt_header(at, format!("entry '{}' data out of range", path)));
        }
        entries.push(IndexEntry {
            path,
            flags,
            attributes,
            mtime,
            ctime,
            atime,
            precision,
            size,
            packed,
            offset,
            method,
            crc,
        });
    }
    Ok(entries)
}

fn encode_precision(p: TimePrecision) -> u8 {
    match p {
        TimePrecision::Unknown => 0,
        TimePrecision::Windows => 1,
        TimePrecision::Unix => 2,
        TimePrecision::Dos => 3,
        TimePrecision::HighPrecision => 4,
        TimePrecision::Digits(n) => 10 + n.min(9),
    }
}

fn decode_precision(b: u8) -> TimePrecision {
    match b {
        1 => TimePrecision::Windows,
        2 => TimePrecision::Unix,
        3 => TimePrecision::Dos,
        4 => TimePrecision::HighPrecision,
        10..=19 => TimePrecision::Digits(b - 10),
        _ => TimePrecision::Unknown,
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

/// Bounds-checked little-endian reader over the index bytes.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Cursor<'a> {
    fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::corrupt_header(self.offset(), "index truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(read_u32(self.take(4)?, 0))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(read_u64(self.take(8)?, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_crc_detects_corruption() {
        let header = StartHeader {
            flags: 0,
            index_offset: 100,
            index_size: 20,
            index_crc: 0xDEADBEEF,
        };
        let mut bytes = header.to_bytes();
        assert_eq!(StartHeader::parse(&bytes).unwrap(), header);
        bytes[10] ^= 0xFF;
        assert!(matches!(
            StartHeader::parse(&bytes),
            Err(Error::CorruptHeader { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = StartHeader::default().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(StartHeader::parse(&bytes), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_index_entry_with_optional_times() {
        let entry = IndexEntry {
            path: "dir/a.txt".into(),
            flags: 0,
            attributes: 0x20,
            mtime: Some(42),
            atime: Some(7),
            precision: TimePrecision::Digits(3),
            size: 5,
            packed: 5,
            offset: HEADER_SIZE,
            crc: 1,
            ..Default::default()
        };
        let bytes = encode_index(std::slice::from_ref(&entry)).unwrap();
        let parsed = parse_index(&bytes, 0, HEADER_SIZE + 5).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].mtime, Some(42));
        assert_eq!(parsed[0].ctime, None);
        assert_eq!(parsed[0].atime, Some(7));
        assert_eq!(parsed[0].precision, TimePrecision::Digits(3));
        assert_eq!(parsed[0].path, entry.path);
    }

    #[test]
    fn test_index_rejects_out_of_range_data() {
        let entry = IndexEntry {
            path: "a".into(),
            packed: 100,
            offset: HEADER_SIZE,
            ..Default::default()
        };
        let bytes = encode_index(&[entry]).unwrap();
        assert!(parse_index(&bytes, 0, HEADER_SIZE + 10).is_err());
    }

    #[test]
    fn test_index_truncated() {
        let entry = IndexEntry {
            path: "abc".into(),
            offset: HEADER_SIZE,
            ..Default::default()
        };
        let bytes = encode_index(&[entry]).unwrap();
        let err = parse_index(&bytes[..bytes.len() - 2], 0, HEADER_SIZE).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
