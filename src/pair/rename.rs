//! Rename rules applied to entries of an existing archive.
//!
//! A rule replaces a leading run of whole path components. `docs` renames
//! `docs` and everything under `docs/`, but not `docs2`. A rule whose old
//! name ends with `/` only matches a folder and its contents.
//!
//! ```rust
//! use arcupdate::archive_path::NameMode;
//! use arcupdate::pair::RenameRule;
//!
//! let rule = RenameRule::new("docs", "manual").unwrap();
//! let mode = NameMode::CaseSensitive;
//! assert_eq!(rule.apply("docs/intro.md", false, mode).as_deref(), Some("manual/intro.md"));
//! assert_eq!(rule.apply("docs2/intro.md", false, mode), None);
//! ```

use crate::archive_path::{self, NameMode};
use crate::item::ArchiveItem;
use crate::plan::{UpdatePlan, UpdatePlanEntry};
use crate::{Error, Result};

/// Replaces the path prefix `old` with `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    old: String,
    new: String,
}

impl RenameRule {
    /// Creates a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRenameRule`] if either name is empty or `old`
    /// contains a wildcard.
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Result<Self> {
        let old = old.into();
        let mut new = new.into();
        let invalid = |reason| Error::InvalidRenameRule {
            old: old.clone(),
            new: new.clone(),
            reason,
        };
        if old.is_empty() || old == "/" {
            return Err(invalid("old name is empty"));
        }
        if new.is_empty() || new == "/" {
            return Err(invalid("new name is empty"));
        }
        if old.contains(['*', '?']) {
            return Err(invalid("wildcards are not allowed"));
        }
        if old.ends_with('/') && !new.ends_with('/') {
            new.push('/');
        }
        Ok(Self { old, new })
    }

    /// The name being replaced.
    pub fn old(&self) -> &str {
        &self.old
    }

    /// The replacement.
    pub fn new_name(&self) -> &str {
        &self.new
    }

    /// Returns the renamed path, or `None` if the rule does not match `name`.
    pub fn apply(&self, name: &str, is_dir: bool, mode: NameMode) -> Option<String> {
        let (old_end, src_end) = common_prefix(&self.old, name, mode);
        let old_rest = &self.old[old_end..];
        let src_rest = &name[src_end..];

        if old_rest.is_empty() {
            let at_boundary = src_rest.is_empty()
                || src_rest.starts_with('/')
                || name[..src_end].ends_with('/');
            if !at_boundary {
                return None;
            }
        } else if !(is_dir && src_rest.is_empty() && old_rest == "/") {
            return None;
        }

        let mut dest = format!("{}{}", self.new, src_rest);
        if dest.ends_with('/') {
            dest.pop();
        }
        Some(dest)
    }
}

/// Byte lengths of the longest common prefix of `a` and `b` under `mode`.
fn common_prefix(a: &str, b: &str, mode: NameMode) -> (usize, usize) {
    let mut lhs = a.char_indices();
    let mut rhs = b.char_indices();
    loop {
        match (lhs.next(), rhs.next()) {
            (Some((i, x)), Some((j, y))) => {
                let same = x == y
                    || (mode == NameMode::CaseInsensitive
                        && x.to_lowercase().eq(y.to_lowercase()));
                if !same {
                    return (i, j);
                }
            }
            (Some((i, _)), None) => return (i, b.len()),
            (None, Some((j, _))) => return (a.len(), j),
            (None, None) => return (a.len(), b.len()),
        }
    }
}

/// Applies the first matching rule to one archive item.
///
/// Alternate streams follow their host: `a.txt:zone` is renamed when a rule
/// renames `a.txt`.
pub fn rename_item(item: &ArchiveItem, rules: &[RenameRule], mode: NameMode) -> Option<String> {
    for rule in rules {
        if let Some(dest) = rule.apply(&item.name, item.is_dir, mode) {
            return Some(dest);
        }
        if item.is_alt_stream {
            if let Some((host, stream)) = archive_path::split_alt_stream(&item.name) {
                if let Some(dest) = rule.apply(host, false, mode) {
                    return Some(format!("{}{}{}", dest, archive_path::ALT_STREAM_SEPARATOR, stream));
                }
            }
        }
    }
    None
}

/// Builds a plan that keeps every archive entry and renames the censored
/// ones matched by `rules`.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] if a rule produces an invalid name and
/// [`Error::RenameConflict`] if two entries would end up with the same name.
pub fn plan_renames(archive: &[ArchiveItem], rules: &[RenameRule], mode: NameMode) -> Result<UpdatePlan> {
    let mut plan = UpdatePlan::new();
    // (final name, original name, renamed)
    let mut names: Vec<(String, &str, bool)> = Vec::with_capacity(archive.len());

    for (i, item) in archive.iter().enumerate() {
        let dest = if item.censored {
            rename_item(item, rules, mode)
        } else {
            None
        };
        match dest {
            Some(dest) => {
                archive_path::validate(&dest)?;
                log::debug!("rename '{}' -> '{}'", item.name, dest);
                names.push((dest.clone(), &item.name, true));
                let target = plan.add_name(dest);
                plan.push(UpdatePlanEntry::rename(i, target));
            }
            None => {
                names.push((item.name.clone(), &item.name, false));
                plan.push(UpdatePlanEntry::keep(i));
            }
        }
    }

    names.sort_by(|a, b| archive_path::compare_names(&a.0, &b.0, mode));
    for pair in names.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if (first.2 || second.2) && archive_path::names_equal(&first.0, &second.0, mode) {
            return Err(Error::RenameConflict {
                path: second.0.clone(),
                first: first.1.to_string(),
                second: second.1.to_string(),
            });
        }
    }
    Ok(plan)
}
