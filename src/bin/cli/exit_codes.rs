//! Exit codes for the CLI tool.

use arcupdate::{Error, ErrorCategory};

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Operation completed with warnings (skipped or damaged items)
pub const WARNING: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Archive format error
pub const BAD_ARCHIVE: i32 = 3;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// The new archive was written but could not be moved into place
pub const COMMIT_ERROR: i32 = 6;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Warning,
    FatalError,
    BadArchive,
    IoError,
    CommitError,
    UserInterrupt,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Warning => WARNING,
            Self::FatalError => FATAL_ERROR,
            Self::BadArchive => BAD_ARCHIVE,
            Self::IoError => IO_ERROR,
            Self::CommitError => COMMIT_ERROR,
            Self::UserInterrupt => USER_INTERRUPT,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts an arcupdate error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::InvalidPattern { .. } | Error::InvalidRenameRule { .. } | Error::InvalidVolumeSizes(_) => {
            ExitCode::BadArgs
        }
        Error::InvalidFormat(_) | Error::CorruptHeader { .. } | Error::OpenArchive { .. } => ExitCode::BadArchive,
        _ => category_to_exit_code(error.category()),
    }
}

fn category_to_exit_code(category: ErrorCategory) -> ExitCode {
    match category {
        ErrorCategory::Scan | ErrorCategory::Open | ErrorCategory::Write => ExitCode::IoError,
        ErrorCategory::Plan | ErrorCategory::Leak => ExitCode::FatalError,
        ErrorCategory::Commit => ExitCode::CommitError,
        ErrorCategory::Cancelled => ExitCode::UserInterrupt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_mapping() {
        assert_eq!(error_to_exit_code(&Error::Cancelled), ExitCode::UserInterrupt);
        assert_eq!(
            error_to_exit_code(&Error::InvalidVolumeSizes("empty".into())),
            ExitCode::BadArgs
        );
        assert_eq!(
            error_to_exit_code(&Error::InvalidFormat("bad magic".into())),
            ExitCode::BadArchive
        );
        assert_eq!(
            error_to_exit_code(&Error::TargetExists {
                path: PathBuf::from("a.aupk")
            }),
            ExitCode::IoError
        );
        assert_eq!(ExitCode::CommitError.code(), 6);
    }
}
