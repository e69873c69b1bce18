//! Update policies and their per-state action tables.

use super::state::PairState;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// What to do with one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairAction {
    /// Produce nothing.
    Ignore,
    /// Keep the archive entry as it is.
    Copy,
    /// Compress the disk item.
    Compress,
    /// Write an anti entry that deletes the archive entry.
    Tombstone,
}

/// A named update policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// Add new files; never overwrite archive entries.
    #[default]
    Add,
    /// Add new files and replace entries whose disk copy is newer.
    Update,
    /// Only replace entries whose disk copy is newer.
    Fresh,
    /// Make the archive mirror the disk.
    Sync,
    /// Delete every selected archive entry.
    Delete,
}

impl Policy {
    /// Every policy.
    pub const ALL: [Policy; 5] = [
        Policy::Add,
        Policy::Update,
        Policy::Fresh,
        Policy::Sync,
        Policy::Delete,
    ];

    /// The action table for this policy.
    pub fn action_set(self) -> ActionSet {
        use PairAction::*;
        // NotMasked, OnlyInArchive, OnlyOnDisk, NewInArchive, OldInArchive,
        // SameFiles, UnknownNewerFiles
        let actions = match self {
            Policy::Add => [Copy, Copy, Compress, Copy, Copy, Copy, Copy],
            Policy::Update => [Copy, Copy, Compress, Copy, Compress, Copy, Compress],
            Policy::Fresh => [Copy, Copy, Ignore, Copy, Compress, Copy, Copy],
            Policy::Sync => [Copy, Tombstone, Compress, Copy, Compress, Copy, Compress],
            Policy::Delete => [
                Copy, Tombstone, Ignore, Tombstone, Tombstone, Tombstone, Tombstone,
            ],
        };
        ActionSet { actions }
    }

    /// Returns the policy name.
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Add => "add",
            Policy::Update => "update",
            Policy::Fresh => "fresh",
            Policy::Sync => "sync",
            Policy::Delete => "delete",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Policy::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidPlan(format!("unknown update policy '{}'", s)))
    }
}

/// A total mapping from [`PairState`] to [`PairAction`].
///
/// ```rust
/// use arcupdate::pair::{PairAction, PairState, Policy};
///
/// let update = Policy::Update.action_set();
/// assert_eq!(update.action(PairState::OldInArchive), PairAction::Compress);
/// assert_eq!(update.action(PairState::NewInArchive), PairAction::Copy);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSet {
    actions: [PairAction; 7],
}

impl Default for ActionSet {
    fn default() -> Self {
        Policy::default().action_set()
    }
}

impl From<Policy> for ActionSet {
    fn from(policy: Policy) -> Self {
        policy.action_set()
    }
}

impl ActionSet {
    /// Returns the action for `state`.
    #[inline]
    pub fn action(&self, state: PairState) -> PairAction {
        self.actions[state.index()]
    }

    /// Overrides the action for one state.
    pub fn with_action(mut self, state: PairState, action: PairAction) -> Self {
        self.actions[state.index()] = action;
        self
    }

    /// Checks that every action is possible for its state.
    ///
    /// Archive-only states cannot be compressed and a disk-only item cannot
    /// be copied from the archive. Excluded entries are always kept.
    pub fn validate(&self) -> Result<()> {
        for state in PairState::ALL {
            let action = self.action(state);
            let ok = match action {
                PairAction::Copy => state.has_archive(),
                PairAction::Compress => state.has_disk(),
                PairAction::Ignore | PairAction::Tombstone => state != PairState::NotMasked,
            };
            if !ok {
                return Err(Error::InvalidPlan(format!(
                    "action {:?} is not possible for state {}",
                    action, state
                )));
            }
        }
        Ok(())
    }

    /// Returns true if some state reads data from disk.
    pub fn needs_disk_items(&self) -> bool {
        self.actions.contains(&PairAction::Compress)
    }

    /// Returns true if some state deletes archive entries.
    pub fn deletes(&self) -> bool {
        PairState::ALL.iter().any(|&s| {
            s.has_archive() && matches!(self.action(s), PairAction::Tombstone | PairAction::Ignore)
        })
    }
}
