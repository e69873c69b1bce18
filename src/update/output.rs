//! The sink an update run writes to: one file or a volume set.

use super::temp;
use crate::stream::{FileStream, OutputStream};
use crate::timestamp::Timestamp;
use crate::volume::{VolumeConfig, VolumeStream};
use crate::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};

pub(crate) enum Output {
    File(FileStream),
    Volumes(VolumeStream),
}

/// A closed output: where it is and how big each file came out.
#[derive(Debug)]
pub(crate) struct Finished {
    pub paths: Vec<PathBuf>,
    pub sizes: Vec<u64>,
}

impl Output {
    /// Opens the output for `target`.
    ///
    /// With `use_temp` the output gets a fresh temporary name; otherwise the
    /// final path is created and must not exist yet.
    pub(crate) fn open(
        target: &Path,
        volumes: Option<&VolumeConfig>,
        use_temp: bool,
        working_dir: Option<&Path>,
    ) -> Result<Self> {
        match (volumes, use_temp) {
            (None, true) => Ok(Output::File(temp::create_temp_file(target, working_dir)?)),
            (Some(config), true) => Ok(Output::Volumes(temp::create_temp_volumes(config, working_dir)?)),
            (None, false) => match FileStream::create_new(target) {
                Ok(stream) => Ok(Output::File(stream)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::TargetExists {
                    path: target.to_path_buf(),
                }),
                Err(e) => Err(Error::Io(e)),
            },
            (Some(config), false) => match VolumeStream::create(config.clone()) {
                Ok(stream) => Ok(Output::Volumes(stream)),
                Err(Error::Volume { path, source, .. }) if source.kind() == io::ErrorKind::AlreadyExists => {
                    Err(Error::TargetExists { path })
                }
                Err(e) => Err(e),
            },
        }
    }

    pub(crate) fn stream(&mut self) -> &mut dyn OutputStream {
        match self {
            Output::File(file) => file,
            Output::Volumes(volumes) => volumes,
        }
    }

    /// Files currently making up the output.
    pub(crate) fn paths(&self) -> Vec<PathBuf> {
        match self {
            Output::File(file) => vec![file.path().to_path_buf()],
            Output::Volumes(volumes) => volumes.paths(),
        }
    }

    pub(crate) fn set_mtime(&mut self, mtime: Timestamp) -> io::Result<()> {
        match self {
            Output::File(file) => file.set_mtime(mtime),
            Output::Volumes(volumes) => volumes.set_mtime(mtime),
        }
    }

    /// Flushes, syncs and closes the output.
    pub(crate) fn finish(self) -> Result<Finished> {
        match self {
            Output::File(file) => {
                let path = file.path().to_path_buf();
                let size = file.finish()?;
                Ok(Finished {
                    paths: vec![path],
                    sizes: vec![size],
                })
            }
            Output::Volumes(volumes) => {
                let paths = volumes.paths();
                let sizes = volumes.finish()?;
                Ok(Finished { paths, sizes })
            }
        }
    }

    pub(crate) fn is_volumes(&self) -> bool {
        matches!(self, Output::Volumes(_))
    }
}

impl Finished {
    pub(crate) fn total_size(&self) -> u64 {
        self.sizes.iter().sum()
    }
}
