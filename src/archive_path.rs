//! Logical archive paths and name ordering.
//!
//! Inside an archive every item is addressed by a logical path: components
//! joined with `/`, relative, with no `.` or `..` segments. An alternate data
//! stream is addressed as `host:stream`.
//!
//! Whether two names are "the same" depends on the filesystem the disk items
//! come from. [`NameMode`] captures that rule and is carried by the
//! [`UpdateContext`](crate::context::UpdateContext) instead of being a process
//! global.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::path::{Component, Path};

/// Maximum length for logical paths (in bytes).
const MAX_PATH_LENGTH: usize = 32768;

/// Separator between a host file name and its alternate stream name.
pub const ALT_STREAM_SEPARATOR: char = ':';

/// How names are compared when pairing disk items with archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameMode {
    /// Names match only when byte-identical.
    CaseSensitive,
    /// Names match ignoring case (case-preserving filesystems).
    CaseInsensitive,
}

impl NameMode {
    /// The rule of the host platform's default filesystem.
    pub fn native() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            NameMode::CaseInsensitive
        } else {
            NameMode::CaseSensitive
        }
    }
}

impl Default for NameMode {
    fn default() -> Self {
        Self::native()
    }
}

/// Compares two logical names under `mode`.
///
/// In case-insensitive mode characters are compared by their lowercase
/// form; names that differ only in case compare equal.
pub fn compare_names(a: &str, b: &str, mode: NameMode) -> Ordering {
    match mode {
        NameMode::CaseSensitive => a.cmp(b),
        NameMode::CaseInsensitive => {
            let mut lhs = a.chars().flat_map(char::to_lowercase);
            let mut rhs = b.chars().flat_map(char::to_lowercase);
            loop {
                match (lhs.next(), rhs.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => match x.cmp(&y) {
                        Ordering::Equal => {}
                        other => return other,
                    },
                }
            }
        }
    }
}

/// Returns true if `a` and `b` name the same item under `mode`.
#[inline]
pub fn names_equal(a: &str, b: &str, mode: NameMode) -> bool {
    compare_names(a, b, mode) == Ordering::Equal
}

/// Returns true if `prefix` is a whole-component prefix of `path`.
///
/// `"dir"` is a prefix of `"dir"` and `"dir/file"`, but not of `"dirt"`.
pub fn starts_with_components(path: &str, prefix: &str, mode: NameMode) -> bool {
    if prefix.is_empty() {
        return true;
    }
    if path.len() < prefix.len() || !path.is_char_boundary(prefix.len()) {
        // Case folding can change byte lengths; fall back to the char walk.
        return starts_with_components_slow(path, prefix, mode);
    }
    let (head, tail) = path.split_at(prefix.len());
    names_equal(head, prefix, mode) && (tail.is_empty() || tail.starts_with('/'))
}

fn starts_with_components_slow(path: &str, prefix: &str, mode: NameMode) -> bool {
    let mut path_parts = path.split('/');
    for part in prefix.split('/') {
        match path_parts.next() {
            Some(p) if names_equal(p, part, mode) => {}
            _ => return false,
        }
    }
    true
}

/// Splits `host:stream` into its host name and stream name.
///
/// Only the last path component is considered, so a colon inside a
/// directory name is not mistaken for a stream separator.
pub fn split_alt_stream(name: &str) -> Option<(&str, &str)> {
    let file_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let colon = name[file_start..].find(ALT_STREAM_SEPARATOR)? + file_start;
    Some((&name[..colon], &name[colon + 1..]))
}

/// Validates a logical path.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] if the path is empty, absolute, contains a
/// NUL byte, an empty segment, or a `.`/`..` segment.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPath("empty path".into()));
    }
    if name.contains('\0') {
        return Err(Error::InvalidPath(format!("'{}' contains NUL byte", name.escape_debug())));
    }
    if name.len() > MAX_PATH_LENGTH {
        return Err(Error::InvalidPath(format!(
            "path exceeds maximum length of {} bytes",
            MAX_PATH_LENGTH
        )));
    }
    if name.starts_with('/') {
        return Err(Error::InvalidPath(format!("'{}' is absolute", name)));
    }
    for segment in name.split('/') {
        match segment {
            "" => return Err(Error::InvalidPath(format!("'{}' has an empty segment", name))),
            "." | ".." => {
                return Err(Error::InvalidPath(format!(
                    "'{}' has a '{}' segment",
                    name, segment
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Builds a logical path from a relative filesystem path.
///
/// `.` components are dropped; `..`, roots and prefixes are rejected.
pub fn from_relative(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    Error::InvalidPath(format!("'{}' is not valid UTF-8", path.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath(format!(
                    "'{}' is not a relative path inside the archive",
                    path.display()
                )));
            }
        }
    }
    let name = parts.join("/");
    validate(&name)?;
    Ok(name)
}

/// Returns the parent of a logical path, if any.
pub fn parent(name: &str) -> Option<&str> {
    name.rfind('/').map(|i| &name[..i])
}
