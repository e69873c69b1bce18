//! Multi-volume output stream.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::VolumeConfig;
use crate::stream::OutputStream;
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// One open volume file.
struct Volume {
    path: PathBuf,
    file: BufWriter<File>,
    /// Physical length of the file.
    len: u64,
    /// Position of the OS file cursor, to avoid redundant seeks.
    cursor: u64,
}

impl Volume {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if self.cursor != offset {
            self.file.seek(SeekFrom::Start(offset))?;
        }
        self.file.write_all(buf)?;
        self.cursor = offset + buf.len() as u64;
        self.len = self.len.max(self.cursor);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().set_len(len)?;
        self.len = len;
        Ok(())
    }
}

/// A seekable output stream spread over numbered volume files.
///
/// Bytes are placed by absolute position: position `P` lands in the volume
/// whose declared range covers `P`. Volume files are created in order as the
/// write position first reaches them. A volume that is skipped over is
/// zero-extended to its full declared size, so the concatenation of all
/// volumes is always the logical byte stream.
///
/// Seeking is unrestricted; codecs commonly rewrite a header at offset 0
/// after the body has been written.
///
/// # Example
///
/// ```rust,ignore
/// use arcupdate::volume::{VolumeConfig, VolumeStream};
/// use arcupdate::stream::OutputStream;
/// use std::io::Write;
///
/// let config = VolumeConfig::with_sizes("out.aupk", vec![1000, 1000])?;
/// let mut stream = VolumeStream::create(config)?;
/// stream.write_all(&[0u8; 1500])?; // out.aupk.001 = 1000 bytes, .002 = 500 bytes
/// stream.set_len(800)?;            // .002 deleted, .001 truncated to 800
/// let sizes = stream.finish()?;
/// assert_eq!(sizes, vec![800]);
/// ```
pub struct VolumeStream {
    config: VolumeConfig,
    volumes: Vec<Volume>,
    /// Absolute write position.
    pos: u64,
    /// Logical length of the stream.
    len: u64,
    /// Cached (volume index, volume start) for `pos`; reset by `seek`.
    cursor: (usize, u64),
}

impl VolumeStream {
    /// Creates the first volume file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the first volume
    /// cannot be created. Existing files are never overwritten.
    pub fn create(config: VolumeConfig) -> Result<Self> {
        config.validate()?;
        let mut stream = Self {
            config,
            volumes: Vec::new(),
            pos: 0,
            len: 0,
            cursor: (0, 0),
        };
        stream.open_volume().map_err(|source| Error::Volume {
            volume: 1,
            path: stream.config.volume_path(1),
            source,
        })?;
        Ok(stream)
    }

    /// Creates the next volume file in sequence.
    fn open_volume(&mut self) -> io::Result<()> {
        let number = self.volumes.len() as u32 + 1;
        let path = self.config.volume_path(number);
        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to create volume {}: {}", path.display(), e),
                )
            })?;
        log::debug!("Created volume {}", path.display());
        self.volumes.push(Volume {
            path,
            file: BufWriter::new(file),
            len: 0,
            cursor: 0,
        });
        Ok(())
    }

    /// Makes sure volumes `0..=index` exist and every volume before `index`
    /// is at its full declared size.
    fn ensure_volume(&mut self, index: usize) -> io::Result<()> {
        while self.volumes.len() <= index {
            self.open_volume()?;
        }
        for i in 0..index {
            let full = self.config.declared_size(i).unwrap_or(0);
            let volume = &mut self.volumes[i];
            if volume.len < full {
                volume.set_len(full).map_err(|e| annotate(&volume.path, e))?;
            }
        }
        Ok(())
    }

    /// Number of volume files currently on disk.
    pub fn volume_count(&self) -> u32 {
        self.volumes.len() as u32
    }

    /// Paths of the volume files currently on disk.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.volumes.iter().map(|v| v.path.clone()).collect()
    }

    /// Physical sizes of the volume files.
    pub fn volume_sizes(&self) -> Vec<u64> {
        self.volumes.iter().map(|v| v.len).collect()
    }

    /// The current absolute write position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// The volume configuration.
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Sets the modification time of every volume.
    pub fn set_mtime(&mut self, mtime: Timestamp) -> io::Result<()> {
        let ft = mtime.as_file_time();
        for volume in &mut self.volumes {
            volume.file.flush()?;
            filetime::set_file_handle_times(volume.file.get_ref(), None, Some(ft))
                .map_err(|e| annotate(&volume.path, e))?;
        }
        Ok(())
    }

    /// Flushes and closes all volumes, returning their sizes.
    pub fn finish(mut self) -> Result<Vec<u64>> {
        for (i, volume) in self.volumes.iter_mut().enumerate() {
            volume
                .file
                .flush()
                .and_then(|_| volume.file.get_ref().sync_all())
                .map_err(|source| Error::Volume {
                    volume: i as u32 + 1,
                    path: volume.path.clone(),
                    source,
                })?;
        }
        Ok(self.volumes.iter().map(|v| v.len).collect())
    }

    /// Closes all volumes and deletes their files.
    pub fn discard(self) -> Vec<PathBuf> {
        let paths = self.paths();
        drop(self);
        for path in &paths {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Failed to remove volume {}: {}", path.display(), e);
            }
        }
        paths
    }
}

fn annotate(path: &Path, e: io::Error) -> io::Error {
    io::Error::new(e.kind(), format!("Volume {}: {}", path.display(), e))
}

impl Write for VolumeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (mut index, mut start) = if self.pos >= self.cursor.1 {
            self.cursor
        } else {
            (0, 0)
        };
        let mut written = 0usize;

        while written < buf.len() {
            let pos = self.pos;
            (index, start) = {
                let (i, offset) = self.config.locate_from(index, start, pos);
                (i, pos - offset)
            };
            let offset = pos - start;
            let room = match self.config.declared_size(index) {
                Some(size) => size - offset,
                None => u64::MAX,
            };
            let chunk = (buf.len() - written).min(usize::try_from(room).unwrap_or(usize::MAX));

            self.ensure_volume(index)?;
            let volume = &mut self.volumes[index];
            volume
                .write_at(offset, &buf[written..written + chunk])
                .map_err(|e| annotate(&volume.path, e))?;

            written += chunk;
            self.pos += chunk as u64;
            self.len = self.len.max(self.pos);
        }

        self.cursor = (index, start);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        for volume in &mut self.volumes {
            volume.file.flush()?;
        }
        Ok(())
    }
}

impl Seek for VolumeStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid seek to a negative position")
        })?;
        self.pos = target;
        self.cursor = (0, 0);
        Ok(target)
    }
}

impl OutputStream for VolumeStream {
    /// Truncates or extends the logical stream to `len` bytes.
    ///
    /// Volumes that start at or after `len` are deleted; the first volume is
    /// always kept.
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        // The volume covering the last byte, or volume 0 for an empty stream.
        let (keep, start) = if len == 0 {
            (0, 0)
        } else {
            let (i, offset) = self.config.locate(len - 1);
            (i, len - 1 - offset)
        };

        while self.volumes.len() > keep + 1 {
            if let Some(volume) = self.volumes.pop() {
                let path = volume.path.clone();
                drop(volume);
                fs::remove_file(&path).map_err(|e| annotate(&path, e))?;
                log::debug!("Removed volume {}", path.display());
            }
        }

        self.ensure_volume(keep)?;
        let volume = &mut self.volumes[keep];
        volume
            .set_len(len - start)
            .map_err(|e| annotate(&volume.path, e))?;
        self.len = len;
        self.cursor = (0, 0);
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}

impl std::fmt::Debug for VolumeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeStream")
            .field("config", &self.config)
            .field("volumes", &self.volumes.len())
            .field("pos", &self.pos)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sizes_on_disk(config: &VolumeConfig) -> Vec<u64> {
        (1..)
            .map(|n| config.volume_path(n))
            .take_while(|p| p.exists())
            .map(|p| fs::metadata(p).unwrap().len())
            .collect()
    }

    #[test]
    fn test_single_volume() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 1024);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.write_all(&[42u8; 100]).unwrap();
        assert_eq!(stream.finish().unwrap(), vec![100]);
        assert_eq!(sizes_on_disk(&config), vec![100]);
    }

    #[test]
    fn test_write_splits_at_boundaries() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 100);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        // One call crossing two boundaries.
        assert_eq!(stream.write(&[7u8; 250]).unwrap(), 250);
        assert_eq!(stream.volume_count(), 3);
        assert_eq!(stream.finish().unwrap(), vec![100, 100, 50]);
        assert_eq!(sizes_on_disk(&config), vec![100, 100, 50]);
    }

    #[test]
    fn test_worked_example() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::with_sizes(dir.path().join("t.aupk"), vec![1000, 1000]).unwrap();
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.write_all(&[1u8; 1500]).unwrap();
        stream.flush().unwrap();
        assert_eq!(sizes_on_disk(&config), vec![1000, 500]);

        stream.set_len(800).unwrap();
        assert_eq!(sizes_on_disk(&config), vec![800]);
        assert!(!config.volume_path(2).exists());
        assert_eq!(stream.finish().unwrap(), vec![800]);
    }

    #[test]
    fn test_header_rewrite_after_body() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 10);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.write_all(&[1u8; 25]).unwrap();
        stream.seek(SeekFrom::Start(8)).unwrap();
        stream.write_all(&[2u8; 4]).unwrap();
        assert_eq!(stream.position(), 12);
        stream.finish().unwrap();

        let mut all = Vec::new();
        for n in 1..=3 {
            all.extend(fs::read(config.volume_path(n)).unwrap());
        }
        let mut expected = vec![1u8; 25];
        expected[8..12].copy_from_slice(&[2u8; 4]);
        assert_eq!(all, expected);
    }

    #[test]
    fn test_seek_past_end_zero_fills_skipped_volumes() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 10);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.seek(SeekFrom::Start(25)).unwrap();
        stream.write_all(b"x").unwrap();
        stream.finish().unwrap();
        assert_eq!(sizes_on_disk(&config), vec![10, 10, 6]);
        assert_eq!(fs::read(config.volume_path(1)).unwrap(), vec![0u8; 10]);
    }

    #[test]
    fn test_set_len_to_zero_keeps_first_volume() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 10);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.write_all(&[0u8; 35]).unwrap();
        stream.set_len(0).unwrap();
        assert_eq!(stream.volume_count(), 1);
        assert_eq!(OutputStream::len(&mut stream).unwrap(), 0);
        stream.finish().unwrap();
        assert_eq!(sizes_on_disk(&config), vec![0]);
    }

    #[test]
    fn test_set_len_on_boundary() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 10);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.write_all(&[0u8; 35]).unwrap();
        stream.set_len(20).unwrap();
        stream.finish().unwrap();
        assert_eq!(sizes_on_disk(&config), vec![10, 10]);
    }

    #[test]
    fn test_existing_volume_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 10);
        fs::write(config.volume_path(2), b"keep me").unwrap();
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        let err = stream.write_all(&[0u8; 15]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(err.to_string().contains("t.aupk.002"));
        assert_eq!(fs::read(config.volume_path(2)).unwrap(), b"keep me");
        stream.discard();
        assert!(!config.volume_path(1).exists());
        assert!(config.volume_path(2).exists());
    }

    #[test]
    fn test_set_mtime_on_all_volumes() {
        let dir = TempDir::new().unwrap();
        let config = VolumeConfig::new(dir.path().join("t.aupk"), 10);
        let mut stream = VolumeStream::create(config.clone()).unwrap();
        stream.write_all(&[0u8; 15]).unwrap();
        let ts = Timestamp::from_unix_secs(1_000_000_000).unwrap();
        stream.set_mtime(ts).unwrap();
        stream.finish().unwrap();
        for n in 1..=2 {
            let meta = fs::metadata(config.volume_path(n)).unwrap();
            let mtime = filetime::FileTime::from_last_modification_time(&meta);
            assert_eq!(mtime.unix_seconds(), 1_000_000_000);
        }
    }
}
