//! Reading a volume set back as one stream.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Concatenates `<base>.001`, `<base>.002`, ... into one readable stream.
///
/// Volumes are discovered at open time by probing consecutive numbers until
/// one is missing. Files are opened lazily on first access.
///
/// ```rust,ignore
/// use arcupdate::volume::VolumeReader;
///
/// // Either the base path or the first volume.
/// let reader = VolumeReader::open("backup.aupk.001")?;
/// println!("{} volumes, {} bytes", reader.volume_count(), reader.total_size());
/// ```
pub struct VolumeReader {
    base_path: PathBuf,
    files: Vec<Option<BufReader<File>>>,
    sizes: Vec<u64>,
    total_size: u64,
    position: u64,
}

impl VolumeReader {
    /// Opens a volume set by base path or by the path of any volume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if no `.001` volume exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = detect_base_path(path.as_ref());
        let mut sizes = Vec::new();
        loop {
            let volume = volume_path(&base_path, sizes.len() as u32 + 1);
            match std::fs::metadata(&volume) {
                Ok(meta) => sizes.push(meta.len()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if sizes.is_empty() {
            return Err(Error::InvalidFormat(format!(
                "No volume files found for {}",
                base_path.display()
            )));
        }
        Ok(Self {
            base_path,
            files: sizes.iter().map(|_| None).collect(),
            total_size: sizes.iter().sum(),
            sizes,
            position: 0,
        })
    }

    /// Returns true if `path` names a volume set rather than a single file.
    pub fn is_volume_set(path: impl AsRef<Path>) -> bool {
        volume_path(&detect_base_path(path.as_ref()), 1).exists()
    }

    /// Base path of the set.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of volumes.
    pub fn volume_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    /// Sizes of the volumes.
    pub fn volume_sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Total logical size.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Paths of all volumes.
    pub fn paths(&self) -> Vec<PathBuf> {
        (1..=self.sizes.len() as u32)
            .map(|n| volume_path(&self.base_path, n))
            .collect()
    }

    fn file(&mut self, index: usize) -> io::Result<&mut BufReader<File>> {
        let slot = &mut self.files[index];
        if slot.is_none() {
            let path = volume_path(&self.base_path, index as u32 + 1);
            let file = File::open(&path).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to open volume {}: {}", path.display(), e),
                )
            })?;
            *slot = Some(BufReader::new(file));
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::other("volume file not open"))
    }

    fn locate(&self, pos: u64) -> Option<(usize, u64)> {
        let mut start = 0;
        for (i, &size) in self.sizes.iter().enumerate() {
            if pos < start + size {
                return Some((i, pos - start));
            }
            start += size;
        }
        None
    }
}

fn volume_path(base: &Path, number: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{:03}", number));
    PathBuf::from(name)
}

/// Strips a trailing `.NNN` volume number, if present.
fn detect_base_path(path: &Path) -> PathBuf {
    if let (Some(ext), Some(stem)) = (path.extension(), path.file_stem()) {
        let ext = ext.to_string_lossy();
        if ext.len() >= 3 && ext.chars().all(|c| c.is_ascii_digit()) {
            return path.with_file_name(stem);
        }
    }
    path.to_path_buf()
}

impl Read for VolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let Some((index, offset)) = self.locate(self.position) else {
                break;
            };
            let room = (self.sizes[index] - offset) as usize;
            let want = (buf.len() - filled).min(room);
            let file = self.file(index)?;
            file.seek(SeekFrom::Start(offset))?;
            let n = file.read(&mut buf[filled..filled + want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("volume {} is shorter than expected", index + 1),
                ));
            }
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for VolumeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(d) => self.total_size.checked_add_signed(d),
        };
        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Cannot seek before start of stream")
        })?;
        Ok(self.position)
    }
}

impl std::fmt::Debug for VolumeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeReader")
            .field("base_path", &self.base_path)
            .field("volumes", &self.sizes.len())
            .field("total_size", &self.total_size)
            .field("position", &self.position)
            .finish()
    }
}
