//! Seekable, resizable output streams.
//!
//! Codecs write through [`OutputStream`]: a `Write + Seek` sink that can
//! also be truncated and measured. The orchestrator hands the codec either a
//! single [`FileStream`] or a [`VolumeStream`](crate::volume::VolumeStream).

use crate::timestamp::Timestamp;
use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Output sink for archive codecs.
pub trait OutputStream: Write + Seek {
    /// Truncates or zero-extends the stream to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Returns the current logical length in bytes.
    fn len(&mut self) -> io::Result<u64>;

    /// Returns true if nothing was written.
    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl OutputStream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds memory"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl<T: OutputStream + ?Sized> OutputStream for &mut T {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn len(&mut self) -> io::Result<u64> {
        (**self).len()
    }
}

impl<T: OutputStream + ?Sized> OutputStream for Box<T> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn len(&mut self) -> io::Result<u64> {
        (**self).len()
    }
}

/// A single output file.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    path: PathBuf,
}

impl FileStream {
    /// Creates `path`, failing if it already exists.
    pub fn create_new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::options().read(true).write(true).create_new(true).open(&path)?;
        Ok(Self { file, path })
    }

    /// Wraps an already open file.
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets the file's modification time.
    pub fn set_mtime(&mut self, mtime: Timestamp) -> io::Result<()> {
        self.file.flush()?;
        filetime::set_file_handle_times(&self.file, None, Some(mtime.as_file_time()))
    }

    /// Flushes and syncs, returning the final size.
    pub fn finish(mut self) -> io::Result<u64> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(self.file.metadata()?.len())
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl OutputStream for FileStream {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_set_len() {
        let mut c = Cursor::new(Vec::new());
        c.write_all(b"hello world").unwrap();
        c.set_len(5).unwrap();
        assert_eq!(OutputStream::len(&mut c).unwrap(), 5);
        assert_eq!(c.get_ref(), b"hello");
    }

    #[test]
    fn test_file_stream_create_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut s = FileStream::create_new(&path).unwrap();
        s.write_all(b"abcdef").unwrap();
        s.seek(SeekFrom::Start(0)).unwrap();
        s.write_all(b"X").unwrap();
        s.set_len(4).unwrap();
        assert_eq!(s.finish().unwrap(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"Xbcd");
        assert!(FileStream::create_new(&path).is_err());
    }

    #[test]
    fn test_file_stream_set_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamped.bin");
        let mut s = FileStream::create_new(&path).unwrap();
        s.write_all(b"data").unwrap();
        let when = Timestamp::from_unix_secs(1_600_000_000).unwrap();
        s.set_mtime(when).unwrap();
        s.finish().unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_600_000_000);
    }
}
