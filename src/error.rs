//! Error types for archive update operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes of an update run, along with a convenient [`Result<T>`]
//! type alias.
//!
//! # Error Categories
//!
//! Every error belongs to one [`ErrorCategory`]. The category tells the
//! caller what state the filesystem is in after the failure:
//!
//! | Category | Fatal | Original archive | Temp output |
//! |----------|-------|------------------|-------------|
//! | [`Scan`][ErrorCategory::Scan] | no | untouched | n/a |
//! | [`Plan`][ErrorCategory::Plan] | yes | untouched | never created |
//! | [`Open`][ErrorCategory::Open] | yes | untouched | never created |
//! | [`Write`][ErrorCategory::Write] | yes | untouched | deleted |
//! | [`Leak`][ErrorCategory::Leak] | yes | untouched | deleted |
//! | [`Commit`][ErrorCategory::Commit] | yes | maybe deleted | kept |
//! | [`Cancelled`][ErrorCategory::Cancelled] | yes | untouched | deleted |
//!
//! ```rust
//! use arcupdate::{Error, ErrorCategory};
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error.category() {
//!         ErrorCategory::Commit => "new archive was written but could not be moved into place",
//!         ErrorCategory::Cancelled => "cancelled by user",
//!         _ => "archive was not produced",
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

/// Which side of the pairing a duplicate name was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameOrigin {
    /// Two disk items map to the same logical path.
    Disk,
    /// Two archive entries share the same path.
    Archive,
}

impl std::fmt::Display for NameOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disk => write!(f, "on disk"),
            Self::Archive => write!(f, "in archive"),
        }
    }
}

/// Broad classification of errors.
///
/// See the module documentation for what each category implies about the
/// state of the target archive and temporary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A path could not be scanned; accumulated, never aborts a run.
    Scan,
    /// The inputs cannot be turned into a consistent plan.
    Plan,
    /// The existing archive (or an input it needs) cannot be opened.
    Open,
    /// Writing the new archive failed.
    Write,
    /// The codec finished but left an input stream open.
    Leak,
    /// The finished archive could not be moved into place.
    Commit,
    /// The user requested cancellation.
    Cancelled,
}

/// The main error type for archive update operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while writing output or reading input.
    ///
    /// This wraps [`std::io::Error`]. Check the underlying
    /// [`std::io::ErrorKind`] for specific handling.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive data is not in the format the codec expects.
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// The archive index is corrupt or truncated.
    ///
    /// The offset points at the byte where the problem was detected.
    #[error("Corrupt archive at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The existing archive could not be opened.
    ///
    /// Nothing has been written when this error is returned.
    #[error("Cannot open archive '{}': {source}", path.display())]
    OpenArchive {
        /// Path of the archive.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A disk item could not be opened for reading and the run was
    /// configured to stop on such errors.
    #[error("Cannot open file '{}': {source}", path.display())]
    OpenItem {
        /// Physical path of the item.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A path could not be scanned.
    ///
    /// Scan errors are normally accumulated in
    /// [`DiskItems`](crate::item::DiskItems); this variant exists for
    /// callers that want to treat the first one as fatal.
    #[error("Cannot scan '{}': {source}", path.display())]
    Scan {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A logical path is not usable inside an archive.
    #[error("Invalid archive path: {0}")]
    InvalidPath(String),

    /// An include or exclude pattern could not be parsed.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern text.
        pattern: String,
        /// Parser message.
        reason: String,
    },

    /// The same logical name appears twice on one side of the pairing.
    #[error("Duplicate filename {origin}:\n{first}\n{second}")]
    DuplicateName {
        /// Which side the duplicate was found on.
        origin: NameOrigin,
        /// The first occurrence.
        first: String,
        /// The second occurrence.
        second: String,
    },

    /// A disk item matches an archive entry that was excluded by the filter.
    #[error("Internal file name collision (file on disk, file in archive):\n{disk}\n{archive}")]
    NameCollision {
        /// The disk item name.
        disk: String,
        /// The archive entry name.
        archive: String,
    },

    /// A rename rule is not usable (wildcards, empty name).
    #[error("Invalid rename rule '{old}' -> '{new}': {reason}")]
    InvalidRenameRule {
        /// Old name of the rule.
        old: String,
        /// New name of the rule.
        new: String,
        /// Why the rule was rejected.
        reason: &'static str,
    },

    /// Renaming would produce two entries with the same name.
    #[error("Rename conflict: '{first}' and '{second}' both resolve to '{path}'")]
    RenameConflict {
        /// The ambiguous resulting name.
        path: String,
        /// Original name of the first entry.
        first: String,
        /// Original name of the second entry.
        second: String,
    },

    /// The archive being updated is also one of the inputs.
    #[error("It is not allowed to include archive to itself: {}", path.display())]
    ArchiveIncludesItself {
        /// Path of the archive.
        path: PathBuf,
    },

    /// The output file already exists and is not being updated.
    #[error("The file already exists: {}", path.display())]
    TargetExists {
        /// The path that already exists.
        path: PathBuf,
    },

    /// The volume size list is not usable.
    #[error("Invalid volume sizes: {0}")]
    InvalidVolumeSizes(String),

    /// A volume file could not be created or written.
    #[error("Volume {volume} failed at '{}': {source}", path.display())]
    Volume {
        /// The volume number (1-indexed).
        volume: u32,
        /// Path of the volume file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The codec returned while input streams were still open.
    ///
    /// This is a correctness bug in the codec, never an I/O condition.
    #[error("There are unclosed input files: {}", format_paths(paths))]
    UnclosedStreams {
        /// Paths of the streams that were not closed.
        paths: Vec<PathBuf>,
    },

    /// The original archive could not be deleted before moving the new one
    /// into place.
    #[error(
        "Cannot delete the file '{}': {source} (the new archive is at '{}')",
        path.display(),
        temp.display()
    )]
    CommitDelete {
        /// The original archive.
        path: PathBuf,
        /// The temporary file holding the new archive.
        temp: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The temporary archive could not be moved into place.
    ///
    /// The temporary file is kept: it holds the complete new archive and can
    /// be renamed manually.
    #[error(
        "Cannot move the file '{}' to '{}': {source}. The temporary file holds the valid new archive",
        temp.display(),
        target.display()
    )]
    Commit {
        /// The temporary file holding the new archive.
        temp: PathBuf,
        /// The intended final path.
        target: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The requested operation is not supported for this target.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An entry was not found in the archive.
    #[error("Entry not found: index {index}")]
    EntryNotFound {
        /// The entry index that was requested.
        index: usize,
    },

    /// The plan handed to the orchestrator violates an invariant.
    #[error("Invalid update plan: {0}")]
    InvalidPlan(String),

    /// The operation was cancelled by the user.
    ///
    /// Returned when the [`CancelFlag`](crate::context::CancelFlag) was
    /// raised. Temporary output is deleted; the original is untouched.
    #[error("Operation cancelled")]
    Cancelled,
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Scan { .. } => ErrorCategory::Scan,
            Error::DuplicateName { .. }
            | Error::InvalidPath(_)
            | Error::InvalidPattern { .. }
            | Error::NameCollision { .. }
            | Error::InvalidRenameRule { .. }
            | Error::RenameConflict { .. }
            | Error::ArchiveIncludesItself { .. }
            | Error::InvalidVolumeSizes(_)
            | Error::InvalidPlan(_)
            | Error::Unsupported(_) => ErrorCategory::Plan,
            Error::OpenArchive { .. }
            | Error::InvalidFormat(_)
            | Error::CorruptHeader { .. }
            | Error::EntryNotFound { .. }
            | Error::OpenItem { .. } => ErrorCategory::Open,
            Error::UnclosedStreams { .. } => ErrorCategory::Leak,
            Error::CommitDelete { .. } | Error::Commit { .. } => ErrorCategory::Commit,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Io(_) | Error::TargetExists { .. } | Error::Volume { .. } => {
                ErrorCategory::Write
            }
        }
    }

    /// Returns `true` if the operation can simply be run again.
    ///
    /// Cancellation and transient I/O errors are recoverable; a commit error
    /// is not, because the original archive may already be gone.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns the OS error code of the underlying I/O error, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e)
            | Error::OpenItem { source: e, .. }
            | Error::Scan { source: e, .. }
            | Error::Volume { source: e, .. }
            | Error::CommitDelete { source: e, .. }
            | Error::Commit { source: e, .. } => e.raw_os_error(),
            Error::OpenArchive { source, .. } => source.os_error(),
            _ => None,
        }
    }

    /// Returns the paths involved in this error.
    ///
    /// For commit errors this is `[temp, target]` so the caller can recover
    /// manually.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Error::OpenArchive { path, .. }
            | Error::OpenItem { path, .. }
            | Error::Scan { path, .. }
            | Error::ArchiveIncludesItself { path }
            | Error::TargetExists { path }
            | Error::Volume { path, .. } => vec![path.clone()],
            Error::CommitDelete { path, temp, .. } => vec![path.clone(), temp.clone()],
            Error::Commit { temp, target, .. } => vec![temp.clone(), target.clone()],
            Error::UnclosedStreams { paths } => paths.clone(),
            _ => Vec::new(),
        }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn open_archive(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::OpenArchive {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// A specialized Result type for update operations.
pub type Result<T> = std::result::Result<T, Error>;
