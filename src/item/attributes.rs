//! File attribute bits.
//!
//! Attributes follow the Windows layout. On Unix the permission bits are
//! carried in the high 16 bits, flagged with [`Attributes::UNIX_EXTENSION`].

/// Windows-style attribute word, optionally carrying a Unix mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attributes(u32);

impl Attributes {
    /// Read-only file.
    pub const READONLY: u32 = 0x01;
    /// Hidden file.
    pub const HIDDEN: u32 = 0x02;
    /// System file.
    pub const SYSTEM: u32 = 0x04;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Archive bit.
    pub const ARCHIVE: u32 = 0x20;
    /// Reparse point (symbolic link, junction).
    pub const REPARSE_POINT: u32 = 0x400;
    /// High 16 bits hold a Unix mode.
    pub const UNIX_EXTENSION: u32 = 0x8000;

    /// Wraps a raw attribute word.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Attributes of a plain file.
    pub const fn file() -> Self {
        Self(Self::ARCHIVE)
    }

    /// Attributes of a directory.
    pub const fn directory() -> Self {
        Self(Self::DIRECTORY)
    }

    /// Returns the raw attribute word.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns a copy with the Unix mode stored in the high bits.
    pub const fn with_unix_mode(self, mode: u32) -> Self {
        Self((self.0 & 0xFFFF) | Self::UNIX_EXTENSION | ((mode & 0xFFFF) << 16))
    }

    /// Returns the Unix mode, if one is stored.
    pub const fn unix_mode(self) -> Option<u32> {
        if self.0 & Self::UNIX_EXTENSION != 0 {
            Some(self.0 >> 16)
        } else {
            None
        }
    }

    /// Returns true if `flag` is set.
    #[inline]
    pub const fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Returns true for directories.
    pub const fn is_dir(self) -> bool {
        self.has(Self::DIRECTORY)
    }

    /// Returns true for reparse points.
    pub const fn is_reparse_point(self) -> bool {
        self.has(Self::REPARSE_POINT)
    }

    /// Returns true for read-only items.
    pub const fn is_readonly(self) -> bool {
        self.has(Self::READONLY)
    }

    /// Builds attributes from filesystem metadata.
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mut raw = if meta.is_dir() {
            Self::DIRECTORY
        } else {
            Self::ARCHIVE
        };
        if meta.permissions().readonly() {
            raw |= Self::READONLY;
        }
        if meta.file_type().is_symlink() {
            raw |= Self::REPARSE_POINT;
        }
        let attrs = Self(raw);
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            attrs.with_unix_mode(meta.mode())
        }
        #[cfg(not(unix))]
        {
            attrs
        }
    }
}
