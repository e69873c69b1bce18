//! Writing AUPK archives from an update callback.

use std::io::{self, Read, SeekFrom, Write};

use super::SimpleFormat;
use super::header::{self, FLAG_ALT_STREAM, FLAG_DIR, HEADER_SIZE, IndexEntry, Method, StartHeader};
use super::reader::SimpleArchive;
use crate::codec::{OperationResult, UpdateCallback, UpdateItemProps};
use crate::stream::OutputStream;
use crate::timestamp::TimePrecision;
use crate::{Error, Result};

/// Counts bytes written through it.
struct CountingWriter<'a> {
    inner: &'a mut dyn OutputStream,
    written: u64,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hashes and counts bytes read through it.
struct HashingReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
    read: u64,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

/// Result of encoding one stream.
struct Encoded {
    size: u64,
    packed: u64,
    crc: u32,
}

fn encode(
    input: &mut dyn Read,
    output: &mut dyn OutputStream,
    method: Method,
    level: u32,
) -> Result<Encoded> {
    let mut src = HashingReader {
        inner: input,
        hasher: crc32fast::Hasher::new(),
        read: 0,
    };
    let mut sink = CountingWriter {
        inner: output,
        written: 0,
    };
    match method {
        Method::Store => {
            io::copy(&mut src, &mut sink)?;
        }
        #[cfg(feature = "deflate")]
        Method::Deflate => {
            let mut encoder =
                flate2::write::DeflateEncoder::new(&mut sink, flate2::Compression::new(level));
            io::copy(&mut src, &mut encoder)?;
            encoder.finish()?;
        }
        #[cfg(not(feature = "deflate"))]
        Method::Deflate => {
            let _ = level;
            return Err(Error::Unsupported("deflate support is disabled"));
        }
    }
    Ok(Encoded {
        size: src.read,
        packed: sink.written,
        crc: src.hasher.finalize(),
    })
}

fn apply_props(entry: &mut IndexEntry, props: &UpdateItemProps, precision: TimePrecision) {
    entry.path = props.path.clone();
    entry.flags = 0;
    if props.is_dir {
        entry.flags |= FLAG_DIR;
    }
    if props.is_alt_stream {
        entry.flags |= FLAG_ALT_STREAM;
    }
    entry.attributes = props.attributes.raw();
    entry.mtime = props.mtime.map(|t| t.as_filetime());
    entry.ctime = props.ctime.map(|t| t.as_filetime());
    entry.atime = props.atime.map(|t| t.as_filetime());
    entry.precision = precision;
}

/// Writes a complete archive. See [`ArchiveFormat::update_items`].
///
/// [`ArchiveFormat::update_items`]: crate::codec::ArchiveFormat::update_items
pub(super) fn write_archive(
    format: &SimpleFormat,
    old: Option<&SimpleArchive>,
    output: &mut dyn OutputStream,
    callback: &mut dyn UpdateCallback,
) -> Result<()> {
    output.seek(SeekFrom::Start(0))?;
    output.write_all(&[0u8; HEADER_SIZE as usize])?;
    let mut pos = HEADER_SIZE;
    let mut in_total = 0u64;
    let mut entries = Vec::with_capacity(callback.len());

    for index in 0..callback.len() {
        let props = callback.props(index)?;
        if props.is_anti {
            // The container has no deletion records; absence is enough.
            callback.set_operation_result(index, OperationResult::Ok)?;
            continue;
        }

        let mut result = OperationResult::Ok;
        let entry = if !props.new_data {
            let old_index = props.archive_index.ok_or_else(|| {
                Error::InvalidPlan(format!("item {} has neither new data nor an archive index", index))
            })?;
            let old = old.ok_or_else(|| {
                Error::InvalidPlan(format!("item {} refers to an archive that is not open", index))
            })?;
            let mut entry = old.index_entry(old_index)?.clone();
            if props.new_props {
                let precision = entry.precision;
                apply_props(&mut entry, &props, precision);
            }
            if format.convert_kept && entry.method != format.method && !entry.is_dir() {
                let mut stream = callback.open_stream(index)?.ok_or_else(|| {
                    Error::InvalidPlan(format!("no stream for kept item {}", index))
                })?;
                let encoded = encode(&mut stream, output, format.method, format.level)?;
                drop(stream);
                entry.method = format.method;
                entry.packed = encoded.packed;
                entry.crc = encoded.crc;
                entry.size = encoded.size;
            } else {
                old.copy_raw(old_index, output)?;
            }
            in_total += entry.size;
            entry
        } else {
            let mut entry = IndexEntry::default();
            apply_props(&mut entry, &props, format.precision);
            if !props.is_dir {
                let Some(mut stream) = callback.open_stream(index)? else {
                    callback.set_operation_result(index, OperationResult::Skipped)?;
                    continue;
                };
                let encoded = encode(&mut stream, output, format.method, format.level)?;
                drop(stream);
                if encoded.size != props.size {
                    result = OperationResult::DataError;
                    log::warn!(
                        "Size of {} changed while reading: expected {}, read {}",
                        props.path,
                        props.size,
                        encoded.size
                    );
                }
                entry.method = format.method;
                entry.size = encoded.size;
                entry.packed = encoded.packed;
                entry.crc = encoded.crc;
                in_total += encoded.size;
            }
            entry
        };

        let entry = IndexEntry { offset: pos, ..entry };
        pos += entry.packed;
        entries.push(entry);
        callback.set_operation_result(index, result)?;
        callback.report_progress(in_total, pos)?;
    }

    let index = header::encode_index(&entries)?;
    output.seek(SeekFrom::Start(pos))?;
    output.write_all(&index)?;
    let end = pos + index.len() as u64;

    let start = StartHeader {
        flags: 0,
        index_offset: pos,
        index_size: index.len() as u64,
        index_crc: crc32fast::hash(&index),
    };
    output.seek(SeekFrom::Start(0))?;
    output.write_all(&start.to_bytes())?;
    output.set_len(end)?;
    output.seek(SeekFrom::Start(end))?;
    output.flush()?;
    log::debug!("Wrote {} entries, {} bytes", entries.len(), end);
    Ok(())
}
