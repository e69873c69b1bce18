//! Include/exclude filtering of archive entries.
//!
//! The filter decides which existing archive entries are *censored*, i.e.
//! take part in pairing. Entries the filter rejects are carried over
//! untouched and never matched against disk items.
//!
//! ```rust
//! use arcupdate::filter::{PathFilter, PatternFilter};
//!
//! let filter = PatternFilter::new(&["*.txt"], &["tmp/*"]).unwrap();
//! assert!(filter.check("notes.txt", false));
//! assert!(!filter.check("tmp/scratch.txt", false));
//! assert!(!filter.check("image.png", false));
//! ```

use crate::archive_path::NameMode;
use crate::{Error, Result};
use glob::{MatchOptions, Pattern};

/// A path predicate applied to archive entries.
pub trait PathFilter {
    /// Returns true if the entry at `path` is selected.
    fn check(&self, path: &str, is_dir: bool) -> bool;

    /// Returns true if every path is selected.
    ///
    /// The enumerator skips calling [`check`](Self::check) in that case.
    fn allows_all(&self) -> bool {
        false
    }
}

/// A filter that selects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PathFilter for AllowAll {
    fn check(&self, _path: &str, _is_dir: bool) -> bool {
        true
    }

    fn allows_all(&self) -> bool {
        true
    }
}

impl<F: Fn(&str, bool) -> bool> PathFilter for F {
    fn check(&self, path: &str, is_dir: bool) -> bool {
        self(path, is_dir)
    }
}

/// Glob based include/exclude filter.
///
/// A path is selected when no include pattern is given or one of them
/// matches, and no exclude pattern matches. A pattern also matches
/// everything below a matching directory, so `docs` selects `docs/a.txt`.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    options: MatchOptions,
}

impl PatternFilter {
    /// Compiles include and exclude patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for the first pattern that fails to
    /// parse.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            options: MatchOptions {
                case_sensitive: true,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    /// Applies the case rule of `mode` to matching.
    pub fn name_mode(mut self, mode: NameMode) -> Self {
        self.options.case_sensitive = mode == NameMode::CaseSensitive;
        self
    }

    /// Returns true if neither include nor exclude patterns are set.
    pub fn is_trivial(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    fn any_match(&self, patterns: &[Pattern], path: &str) -> bool {
        patterns.iter().any(|p| {
            if p.matches_with(path, self.options) {
                return true;
            }
            // Match against each ancestor so a directory pattern covers its contents.
            path.match_indices('/')
                .any(|(i, _)| p.matches_with(&path[..i], self.options))
        })
    }
}

impl PathFilter for PatternFilter {
    fn check(&self, path: &str, _is_dir: bool) -> bool {
        if !self.include.is_empty() && !self.any_match(&self.include, path) {
            return false;
        }
        !self.any_match(&self.exclude, path)
    }

    fn allows_all(&self) -> bool {
        self.is_trivial()
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            let p = p.as_ref();
            Pattern::new(p).map_err(|e| Error::InvalidPattern {
                pattern: p.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_patterns() {
        let filter = PatternFilter::new(&["*.txt", "docs/*"], &[]).unwrap();
        assert!(filter.check("readme.txt", false));
        assert!(filter.check("docs/manual.pdf", false));
        assert!(!filter.check("image.png", false));
    }

    #[test]
    fn test_exclude_patterns() {
        let filter = PatternFilter::new(&[], &["*.log", "tmp"]).unwrap();
        assert!(filter.check("readme.txt", false));
        assert!(!filter.check("debug.log", false));
        assert!(!filter.check("tmp/cache.dat", false));
        assert!(!filter.check("tmp", true));
    }

    #[test]
    fn test_trivial_allows_all() {
        let filter = PatternFilter::new::<&str>(&[], &[]).unwrap();
        assert!(filter.allows_all());
        assert!(filter.check("any/path/file.ext", false));
    }

    #[test]
    fn test_case_insensitive() {
        let filter = PatternFilter::new(&["*.TXT"], &[])
            .unwrap()
            .name_mode(NameMode::CaseInsensitive);
        assert!(filter.check("a.txt", false));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternFilter::new(&["[unclosed"], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_closure_filter() {
        let filter = |path: &str, _dir: bool| path.starts_with("keep");
        assert!(filter.check("keep/me", false));
        assert!(!filter.allows_all());
    }
}
