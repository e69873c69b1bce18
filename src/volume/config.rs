//! Volume layout: declared sizes and file naming.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// What happens after the last declared volume size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeTail {
    /// The last declared volume grows without limit.
    #[default]
    Unbounded,
    /// The last declared size repeats for every further volume.
    Repeat,
}

/// Layout of a multi-volume output.
///
/// Volumes are named `<base>.001`, `<base>.002`, ... The declared sizes
/// apply in order; [`VolumeTail`] decides what follows the last one.
///
/// # Example
///
/// ```rust
/// use arcupdate::volume::{VolumeConfig, VolumeTail};
///
/// // One 1000-byte volume; the last declared volume is open-ended.
/// let config = VolumeConfig::with_sizes("backup.aupk", vec![1000, 1000]).unwrap();
/// assert_eq!(config.volume_path(1).to_str().unwrap(), "backup.aupk.001");
/// assert_eq!(config.declared_size(0), Some(1000));
/// assert_eq!(config.declared_size(1), None);
///
/// // Classic split: every volume 100 bytes.
/// let config = VolumeConfig::new("backup.aupk", 100);
/// assert_eq!(config.tail(), VolumeTail::Repeat);
/// assert_eq!(config.declared_size(42), Some(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeConfig {
    base_path: PathBuf,
    sizes: Vec<u64>,
    tail: VolumeTail,
}

impl VolumeConfig {
    /// Splits into equal volumes of `volume_size` bytes.
    ///
    /// A zero size is replaced by one byte; use
    /// [`with_sizes`](Self::with_sizes) to get validation errors instead.
    pub fn new(base_path: impl AsRef<Path>, volume_size: u64) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            sizes: vec![volume_size.max(1)],
            tail: VolumeTail::Repeat,
        }
    }

    /// Uses an explicit list of volume sizes with an open-ended last volume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVolumeSizes`] if the list is empty or holds a
    /// zero size.
    pub fn with_sizes(base_path: impl AsRef<Path>, sizes: Vec<u64>) -> Result<Self> {
        let config = Self {
            base_path: base_path.as_ref().to_path_buf(),
            sizes,
            tail: VolumeTail::Unbounded,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the tail behaviour.
    pub fn with_tail(mut self, tail: VolumeTail) -> Self {
        self.tail = tail;
        self
    }

    /// Returns a copy writing under a different base path.
    pub fn rebased(&self, base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            ..self.clone()
        }
    }

    /// Checks the declared sizes.
    pub fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() {
            return Err(Error::InvalidVolumeSizes("no volume size given".into()));
        }
        if let Some(pos) = self.sizes.iter().position(|&s| s == 0) {
            return Err(Error::InvalidVolumeSizes(format!(
                "volume {} has zero size",
                pos + 1
            )));
        }
        Ok(())
    }

    /// Base path of the volume set.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The declared sizes.
    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// The tail behaviour.
    pub fn tail(&self) -> VolumeTail {
        self.tail
    }

    /// Path of volume `volume_number` (1-indexed).
    ///
    /// The number has at least three digits: `.001`, `.010`, `.1000`.
    pub fn volume_path(&self, volume_number: u32) -> PathBuf {
        let mut name = self.base_path.clone().into_os_string();
        name.push(format!(".{:03}", volume_number));
        PathBuf::from(name)
    }

    /// Capacity of the volume at 0-based `index`; `None` if unbounded.
    pub fn declared_size(&self, index: usize) -> Option<u64> {
        let last = self.sizes.len().checked_sub(1)?;
        match self.sizes.get(index) {
            Some(&size) if index < last || self.tail == VolumeTail::Repeat => Some(size),
            Some(_) => None,
            None => match self.tail {
                VolumeTail::Repeat => Some(self.sizes[last]),
                VolumeTail::Unbounded => None,
            },
        }
    }

    /// Returns the 0-based volume index and in-volume offset of `pos`.
    ///
    /// A position exactly on a boundary belongs to the next volume.
    pub fn locate(&self, pos: u64) -> (usize, u64) {
        self.locate_from(0, 0, pos)
    }

    /// Like [`locate`](Self::locate), starting the walk at a known volume
    /// `index` whose first byte is at `start`.
    pub(crate) fn locate_from(&self, mut index: usize, mut start: u64, pos: u64) -> (usize, u64) {
        while let Some(size) = self.declared_size(index) {
            if pos < start + size {
                break;
            }
            start += size;
            index += 1;
        }
        (index, pos - start)
    }

    /// Absolute offset of the first byte of volume `index`.
    pub fn volume_start(&self, index: usize) -> u64 {
        (0..index).map(|i| self.declared_size(i).unwrap_or(0)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_path_generation() {
        let config = VolumeConfig::new("test.aupk", 1024);
        assert_eq!(config.volume_path(1), PathBuf::from("test.aupk.001"));
        assert_eq!(config.volume_path(10), PathBuf::from("test.aupk.010"));
        assert_eq!(config.volume_path(999), PathBuf::from("test.aupk.999"));
        assert_eq!(config.volume_path(1000), PathBuf::from("test.aupk.1000"));
    }

    #[test]
    fn test_volume_path_with_directory() {
        let config = VolumeConfig::new("/path/to/archive.aupk", 1024);
        assert_eq!(config.volume_path(1), PathBuf::from("/path/to/archive.aupk.001"));
    }

    #[test]
    fn test_unbounded_tail() {
        let config = VolumeConfig::with_sizes("a", vec![10, 20]).unwrap();
        assert_eq!(config.declared_size(0), Some(10));
        assert_eq!(config.declared_size(1), None);
        assert_eq!(config.locate(9), (0, 9));
        assert_eq!(config.locate(10), (1, 0));
        assert_eq!(config.locate(1_000_000), (1, 999_990));
    }

    #[test]
    fn test_repeat_tail() {
        let config = VolumeConfig::new("a", 100);
        assert_eq!(config.locate(250), (2, 50));
        assert_eq!(config.volume_start(3), 300);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            VolumeConfig::with_sizes("a", vec![]),
            Err(Error::InvalidVolumeSizes(_))
        ));
        assert!(VolumeConfig::with_sizes("a", vec![5, 0, 5]).is_err());
    }

    #[test]
    fn test_rebased_keeps_sizes() {
        let config = VolumeConfig::with_sizes("a", vec![1, 2]).unwrap();
        let tmp = config.rebased("b.tmp");
        assert_eq!(tmp.sizes(), config.sizes());
        assert_eq!(tmp.volume_path(2), PathBuf::from("b.tmp.002"));
    }
}
