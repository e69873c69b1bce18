//! Pairing engine: matches disk items against archive entries.
//!
//! The engine sorts both sides by logical name, walks them in lockstep and
//! classifies every name into a [`PairState`]. A [`Policy`] then maps each
//! state to a [`PairAction`] and [`produce`] turns the actions into an
//! [`UpdatePlan`](crate::plan::UpdatePlan).
//!
//! # Example
//!
//! ```rust
//! use arcupdate::item::{ArchiveItem, DiskItem};
//! use arcupdate::pair::{self, NoDeleteNotify, PairingOptions, Policy};
//! use arcupdate::scan::DiskItemsBuilder;
//! use arcupdate::timestamp::{ItemTime, Timestamp};
//!
//! let t = Timestamp::from_unix_secs(1_700_000_000).unwrap();
//! let mut disk = DiskItemsBuilder::new();
//! disk.push(DiskItem::file("a.txt", "/src/a.txt", 5, t));
//! let disk = disk.build();
//!
//! let archive = vec![ArchiveItem {
//!     name: "a.txt".into(),
//!     size: Some(5),
//!     mtime: Some(ItemTime::windows(t)),
//!     is_dir: false,
//!     is_alt_stream: false,
//!     censored: true,
//!     index: 0,
//! }];
//!
//! let options = PairingOptions::new(Policy::Update);
//! let plan = pair::pair(&disk, &archive, &options, &mut NoDeleteNotify).unwrap();
//! assert!(plan.entries()[0].is_kept());
//! ```

mod action;
mod produce;
mod rename;
mod state;

pub use action::{ActionSet, PairAction, Policy};
pub use produce::{produce, DeleteNotifier, NoDeleteNotify};
pub use rename::{plan_renames, rename_item, RenameRule};
pub use state::{PairState, TimeRelation, UpdatePair};

use crate::archive_path::{self, NameMode, ALT_STREAM_SEPARATOR};
use crate::error::NameOrigin;
use crate::item::{ArchiveItem, DiskItems};
use crate::plan::UpdatePlan;
use crate::timestamp::{compare_times, TimePrecision};
use crate::{Error, Result};
use std::cmp::Ordering;

/// Options for one pairing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingOptions {
    actions: ActionSet,
    time_precision: TimePrecision,
    name_mode: NameMode,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}

impl PairingOptions {
    /// Options for `policy` with Windows time precision and native names.
    pub fn new(policy: Policy) -> Self {
        Self {
            actions: policy.action_set(),
            time_precision: TimePrecision::Windows,
            name_mode: NameMode::native(),
        }
    }

    /// Uses a custom action table.
    pub fn actions(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }

    /// Sets the codec's time precision, used for entries without their own.
    pub fn time_precision(mut self, precision: TimePrecision) -> Self {
        self.time_precision = precision;
        self
    }

    /// Sets the name comparison rule.
    pub fn name_mode(mut self, mode: NameMode) -> Self {
        self.name_mode = mode;
        self
    }

    /// Returns the action table.
    pub fn action_set(&self) -> &ActionSet {
        &self.actions
    }

    /// Returns the name comparison rule.
    pub fn names(&self) -> NameMode {
        self.name_mode
    }

    /// Returns the codec time precision.
    pub fn precision(&self) -> TimePrecision {
        self.time_precision
    }
}

/// Pairs disk items with archive items and produces the plan.
///
/// `notifier` hears about every archive entry the plan deletes.
///
/// # Errors
///
/// - [`Error::DuplicateName`] if a name appears twice on disk, or twice in
///   the archive while also present on disk.
/// - [`Error::NameCollision`] if a disk item matches an excluded archive entry.
/// - [`Error::InvalidPlan`] if the action table is inconsistent.
pub fn pair(
    disk: &DiskItems,
    archive: &[ArchiveItem],
    options: &PairingOptions,
    notifier: &mut dyn DeleteNotifier,
) -> Result<UpdatePlan> {
    let pairs = pair_items(disk, archive, options)?;
    log::debug!(
        "paired {} disk items with {} archive items into {} pairs",
        disk.len(),
        archive.len(),
        pairs.len()
    );
    produce(&pairs, &options.actions, archive, notifier)
}

/// Runs the merge walk and returns one [`UpdatePair`] per distinct name.
///
/// Pairs come out in name order. Within one name an archive directory sorts
/// before an archive file, and a disk item only matches an archive entry of
/// the same kind.
pub fn pair_items(disk: &DiskItems, archive: &[ArchiveItem], options: &PairingOptions) -> Result<Vec<UpdatePair>> {
    let mode = options.name_mode;

    let mut arc_order: Vec<usize> = (0..archive.len()).collect();
    arc_order.sort_by(|&a, &b| compare_archive_items(&archive[a], &archive[b], mode).then(a.cmp(&b)));
    let mut duplicate: Vec<Option<usize>> = vec![None; arc_order.len()];
    for i in 1..arc_order.len() {
        let (prev, cur) = (arc_order[i - 1], arc_order[i]);
        if compare_archive_items(&archive[prev], &archive[cur], mode) == Ordering::Equal {
            duplicate[i - 1] = Some(cur);
            duplicate[i] = Some(prev);
        }
    }

    let mut disk_order: Vec<usize> = (0..disk.len()).collect();
    disk_order.sort_by(|&a, &b| archive_path::compare_names(&disk[a].name, &disk[b].name, mode).then(a.cmp(&b)));
    for w in disk_order.windows(2) {
        let (first, second) = (&disk[w[0]].name, &disk[w[1]].name);
        if archive_path::names_equal(first, second, mode) {
            return Err(Error::DuplicateName {
                origin: NameOrigin::Disk,
                first: first.clone(),
                second: second.clone(),
            });
        }
    }

    let mut pairs = Vec::with_capacity(disk.len().max(archive.len()));
    let (mut d, mut a) = (0, 0);
    let mut host: Option<(usize, &str)> = None;

    while d < disk_order.len() || a < arc_order.len() {
        let disk_item = disk_order.get(d).map(|&i| (i, &disk[i]));
        let arc_item = arc_order.get(a).map(|&i| (i, &archive[i]));

        let order = match (disk_item, arc_item) {
            (Some((_, di)), Some((_, ai))) => {
                match archive_path::compare_names(&di.name, &ai.name, mode) {
                    Ordering::Equal if di.is_dir() != ai.is_dir => {
                        if ai.is_dir {
                            Ordering::Greater
                        } else {
                            Ordering::Less
                        }
                    }
                    other => other,
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };

        let (pair, name, is_alt) = match (order, disk_item, arc_item) {
            (Ordering::Less, Some((di_index, di)), _) => {
                d += 1;
                (UpdatePair::disk_only(di_index), di.name.as_str(), di.is_alt_stream)
            }
            (Ordering::Greater, _, Some((ai_index, ai))) => {
                a += 1;
                (UpdatePair::archive_only(ai_index, ai.censored), ai.name.as_str(), ai.is_alt_stream)
            }
            (Ordering::Equal, Some((di_index, di)), Some((ai_index, ai))) => {
                if let Some(other) = duplicate[a] {
                    return Err(Error::DuplicateName {
                        origin: NameOrigin::Archive,
                        first: ai.name.clone(),
                        second: archive[other].name.clone(),
                    });
                }
                if !ai.censored {
                    return Err(Error::NameCollision {
                        disk: di.name.clone(),
                        archive: ai.name.clone(),
                    });
                }
                let state = match &ai.mtime {
                    None => PairState::UnknownNewerFiles,
                    Some(arc_time) => match compare_times(options.time_precision, &di.mtime_item(), arc_time) {
                        Ordering::Less => PairState::NewInArchive,
                        Ordering::Greater => PairState::OldInArchive,
                        Ordering::Equal if ai.has_size(di.size) => PairState::SameFiles,
                        Ordering::Equal => PairState::UnknownNewerFiles,
                    },
                };
                d += 1;
                a += 1;
                (
                    UpdatePair::matched(state, di_index, ai_index),
                    di.name.as_str(),
                    di.is_alt_stream || ai.is_alt_stream,
                )
            }
            _ => return Err(Error::InvalidPlan("pairing walk out of sync".into())),
        };

        let mut pair = pair;
        if is_alt {
            if let Some((host_pair, host_name)) = host {
                if is_stream_of(name, host_name, mode) {
                    pair.host_index = Some(host_pair);
                }
            }
        } else {
            host = Some((pairs.len(), name));
        }
        pairs.push(pair);
    }

    Ok(pairs)
}

fn compare_archive_items(a: &ArchiveItem, b: &ArchiveItem, mode: NameMode) -> Ordering {
    archive_path::compare_names(&a.name, &b.name, mode).then_with(|| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    })
}

/// Returns true if `name` is `host:stream` for the given host.
fn is_stream_of(name: &str, host: &str, mode: NameMode) -> bool {
    name.len() > host.len()
        && name.is_char_boundary(host.len())
        && name[host.len()..].starts_with(ALT_STREAM_SEPARATOR)
        && archive_path::names_equal(&name[..host.len()], host, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DiskItem;
    use crate::scan::DiskItemsBuilder;
    use crate::timestamp::{ItemTime, Timestamp};

    const CS: NameMode = NameMode::CaseSensitive;

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn disk(items: Vec<DiskItem>) -> DiskItems {
        let mut builder = DiskItemsBuilder::new();
        for item in items {
            builder.push(item);
        }
        builder.build()
    }

    fn arc(name: &str, size: u64, mtime: Option<i64>, index: usize) -> ArchiveItem {
        ArchiveItem {
            name: name.into(),
            size: Some(size),
            mtime: mtime.map(|s| ItemTime::windows(t(s))),
            is_dir: false,
            is_alt_stream: name.contains(':'),
            censored: true,
            index,
        }
    }

    fn states(pairs: &[UpdatePair]) -> Vec<PairState> {
        pairs.iter().map(|p| p.state).collect()
    }

    fn options() -> PairingOptions {
        PairingOptions::new(Policy::Update).name_mode(CS)
    }

    #[test]
    fn test_classification() {
        let disk = disk(vec![
            DiskItem::file("a", "/a", 5, t(100)),
            DiskItem::file("b", "/b", 5, t(200)),
            DiskItem::file("c", "/c", 5, t(100)),
            DiskItem::file("d", "/d", 5, t(100)),
            DiskItem::file("e", "/e", 5, t(100)),
        ]);
        let archive = vec![
            arc("b", 5, Some(100), 0),
            arc("c", 5, Some(200), 1),
            arc("d", 5, Some(100), 2),
            arc("e", 6, Some(100), 3),
            arc("f", 5, Some(100), 4),
        ];
        let pairs = pair_items(&disk, &archive, &options()).unwrap();
        assert_eq!(
            states(&pairs),
            vec![
                PairState::OnlyOnDisk,
                PairState::OldInArchive,
                PairState::NewInArchive,
                PairState::SameFiles,
                PairState::UnknownNewerFiles,
                PairState::OnlyInArchive,
            ]
        );
    }

    #[test]
    fn test_missing_archive_time_is_incomparable() {
        let disk = disk(vec![DiskItem::file("a", "/a", 5, t(100))]);
        let archive = vec![arc("a", 5, None, 0)];
        let pairs = pair_items(&disk, &archive, &options()).unwrap();
        assert_eq!(pairs[0].state, PairState::UnknownNewerFiles);
    }

    #[test]
    fn test_unknown_size_is_incomparable() {
        let disk = disk(vec![DiskItem::file("a", "/a", 5, t(100))]);
        let mut item = arc("a", 5, Some(100), 0);
        item.size = None;
        let pairs = pair_items(&disk, &[item], &options()).unwrap();
        assert_eq!(pairs[0].state, PairState::UnknownNewerFiles);
    }

    #[test]
    fn test_dir_and_file_with_same_name_differ() {
        let disk = disk(vec![DiskItem::file("x", "/x", 1, t(1))]);
        let mut dir = arc("x", 0, Some(1), 0);
        dir.is_dir = true;
        let file = arc("x", 1, Some(1), 1);
        let pairs = pair_items(&disk, &[file, dir], &options()).unwrap();
        assert_eq!(states(&pairs), vec![PairState::OnlyInArchive, PairState::SameFiles]);
        assert_eq!(pairs[0].archive_index, Some(1));
        assert_eq!(pairs[1].archive_index, Some(0));
    }

    #[test]
    fn test_duplicate_disk_name() {
        let disk = disk(vec![
            DiskItem::file("A", "/1/A", 1, t(1)),
            DiskItem::file("a", "/2/a", 1, t(1)),
        ]);
        let options = options().name_mode(NameMode::CaseInsensitive);
        let err = pair_items(&disk, &[], &options).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { origin: NameOrigin::Disk, .. }));
        assert!(pair_items(&disk, &[], &options.name_mode(CS)).is_ok());
    }

    #[test]
    fn test_duplicate_archive_name_only_fails_when_matched() {
        let archive = vec![arc("a", 1, Some(1), 0), arc("a", 1, Some(1), 1)];
        let pairs = pair_items(&DiskItems::empty(), &archive, &options()).unwrap();
        assert_eq!(pairs.len(), 2);

        let disk = disk(vec![DiskItem::file("a", "/a", 1, t(1))]);
        let err = pair_items(&disk, &archive, &options()).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { origin: NameOrigin::Archive, .. }));
    }

    #[test]
    fn test_uncensored_collision() {
        let disk = disk(vec![DiskItem::file("a", "/a", 1, t(1))]);
        let mut item = arc("a", 1, Some(1), 0);
        item.censored = false;
        let err = pair_items(&disk, &[item.clone()], &options()).unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }));

        let pairs = pair_items(&DiskItems::empty(), &[item], &options()).unwrap();
        assert_eq!(pairs[0].state, PairState::NotMasked);
    }

    #[test]
    fn test_case_insensitive_match() {
        let disk = disk(vec![DiskItem::file("README", "/README", 1, t(1))]);
        let archive = vec![arc("readme", 1, Some(1), 0)];
        let pairs = pair_items(&disk, &archive, &options().name_mode(NameMode::CaseInsensitive)).unwrap();
        assert_eq!(states(&pairs), vec![PairState::SameFiles]);
        let pairs = pair_items(&disk, &archive, &options()).unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_alt_stream_host_index() {
        let disk = disk(vec![
            DiskItem::file("a.txt", "/a.txt", 1, t(1)),
            DiskItem::alt_stream("a.txt:zone", "/a.txt:zone", 1, t(1)),
        ]);
        let archive = vec![arc("a.txt:old", 1, Some(1), 0)];
        let pairs = pair_items(&disk, &archive, &options()).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].host_index, None);
        assert_eq!(pairs[1].host_index, Some(0));
        assert_eq!(pairs[2].host_index, Some(0));
    }

    #[test]
    fn test_precision_tolerates_sub_second_noise() {
        let disk = disk(vec![
            DiskItem::file("a", "/a", 1, t(100)).with_time_precision(TimePrecision::Unix),
        ]);
        let archive = vec![ArchiveItem {
            mtime: Some(ItemTime::windows(t(100)).with_offset_100ns(5_000_000)),
            ..arc("a", 1, None, 0)
        }];
        let pairs = pair_items(&disk, &archive, &options()).unwrap();
        assert_eq!(pairs[0].state, PairState::SameFiles);
    }

    #[test]
    fn test_pair_produces_plan() {
        let disk = disk(vec![
            DiskItem::file("new", "/new", 1, t(1)),
            DiskItem::file("old", "/old", 1, t(9)),
        ]);
        let archive = vec![arc("gone", 1, Some(1), 0), arc("old", 1, Some(1), 1)];
        let mut deleted = 0;
        let mut notify = |_: &ArchiveItem| -> Result<()> {
            deleted += 1;
            Ok(())
        };
        let options = PairingOptions::new(Policy::Sync).name_mode(CS);
        let plan = pair(&disk, &archive, &options, &mut notify).unwrap();
        assert_eq!(deleted, 1);
        let summary = plan.summary(&disk);
        assert_eq!((summary.added, summary.updated, summary.deleted), (1, 1, 1));
        plan.validate(&disk, &archive, CS).unwrap();
    }
}
