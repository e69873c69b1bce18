//! Temporary output files and the guard that removes them.

use crate::stream::FileStream;
use crate::volume::{VolumeConfig, VolumeStream};
use crate::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How many `.tmpN` names are tried before giving up.
const MAX_TEMP_ATTEMPTS: u32 = 1000;

/// Files created for an update run that must not outlive a failure.
///
/// On drop every registered path is deleted unless [`keep`](Self::keep) was
/// called. Paths that no longer exist are ignored.
#[derive(Debug, Default)]
pub(crate) struct TempFiles {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl TempFiles {
    pub(crate) fn new() -> Self {
        Self {
            paths: Vec::new(),
            armed: true,
        }
    }

    pub(crate) fn push(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub(crate) fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            self.push(path);
        }
    }

    pub(crate) fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Disarms the guard; the files stay where they are.
    pub(crate) fn keep(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => log::debug!("removed temporary file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("failed to remove temporary file {}: {}", path.display(), e),
            }
        }
    }
}

/// Candidate temporary paths for `target`: `<name>.tmp`, `<name>.tmp1`, ...
///
/// Candidates live next to the target, or in `working_dir` when one is set.
pub(crate) fn temp_candidates(target: &Path, working_dir: Option<&Path>) -> impl Iterator<Item = PathBuf> {
    let name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("archive"));
    let dir = match working_dir {
        Some(dir) => dir.to_path_buf(),
        None => target.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    (0..MAX_TEMP_ATTEMPTS).map(move |n| {
        let mut file_name = name.clone();
        if n == 0 {
            file_name.push(".tmp");
        } else {
            file_name.push(format!(".tmp{}", n));
        }
        dir.join(file_name)
    })
}

/// Creates a fresh temporary file for `target`.
pub(crate) fn create_temp_file(target: &Path, working_dir: Option<&Path>) -> Result<FileStream> {
    for candidate in temp_candidates(target, working_dir) {
        match FileStream::create_new(&candidate) {
            Ok(stream) => {
                log::debug!("writing to temporary file {}", candidate.display());
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Err(exhausted(target))
}

/// Creates a fresh temporary volume set for `config`.
///
/// Only the first volume is created here; the stream adds the rest as the
/// codec writes.
pub(crate) fn create_temp_volumes(config: &VolumeConfig, working_dir: Option<&Path>) -> Result<VolumeStream> {
    for candidate in temp_candidates(config.base_path(), working_dir) {
        match VolumeStream::create(config.rebased(&candidate)) {
            Ok(stream) => {
                log::debug!("writing to temporary volumes {}.NNN", candidate.display());
                return Ok(stream);
            }
            Err(Error::Volume { source, .. }) if source.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(exhausted(config.base_path()))
}

fn exhausted(target: &Path) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free temporary file name for {}", target.display()),
    ))
}

/// Moves `from` to `to`, falling back to copy-and-delete across devices.
pub(crate) fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            log::debug!(
                "rename {} -> {} failed ({}), copying instead",
                from.display(),
                to.display(),
                rename_err
            );
            let mtime = fs::metadata(from).ok().map(|m| filetime::FileTime::from_last_modification_time(&m));
            if let Err(copy_err) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(copy_err);
            }
            if let Some(mtime) = mtime {
                filetime::set_file_mtime(to, mtime)?;
            }
            fs::remove_file(from)
        }
    }
}
