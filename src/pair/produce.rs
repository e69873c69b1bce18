//! Turning pairs and an action table into an update plan.

use super::action::{ActionSet, PairAction};
use super::state::{PairState, UpdatePair};
use crate::item::ArchiveItem;
use crate::plan::{UpdatePlan, UpdatePlanEntry};
use crate::{Error, Result};

/// Receives every archive entry the plan removes.
///
/// Each deleted entry is reported exactly once, while the plan is produced.
pub trait DeleteNotifier {
    /// Called for an archive entry that will not be in the new archive.
    fn on_delete(&mut self, item: &ArchiveItem) -> Result<()>;
}

/// A notifier that ignores deletions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeleteNotify;

impl DeleteNotifier for NoDeleteNotify {
    fn on_delete(&mut self, _item: &ArchiveItem) -> Result<()> {
        Ok(())
    }
}

impl<F: FnMut(&ArchiveItem) -> Result<()>> DeleteNotifier for F {
    fn on_delete(&mut self, item: &ArchiveItem) -> Result<()> {
        self(item)
    }
}

/// Produces the plan for `pairs` under `actions`.
///
/// `keep` entries pass archive entries through, except an archive-only
/// alternate stream whose host file is being recompressed, which is dropped
/// along with its host's old data. `compress` entries read from disk.
/// `tombstone` entries become anti entries. `ignore` produces nothing.
pub fn produce(
    pairs: &[UpdatePair],
    actions: &ActionSet,
    archive: &[ArchiveItem],
    notifier: &mut dyn DeleteNotifier,
) -> Result<UpdatePlan> {
    actions.validate()?;
    let mut plan = UpdatePlan::new();

    for pair in pairs {
        let action = actions.action(pair.state);
        match action {
            PairAction::Ignore => {
                if let Some(i) = pair.archive_index {
                    notifier.on_delete(archive_item(archive, i)?)?;
                }
            }
            PairAction::Copy => {
                let index = pair.archive_index.ok_or_else(|| collision(pair))?;
                if pair.state == PairState::OnlyInArchive {
                    let host_recompressed = pair
                        .host_index
                        .and_then(|h| pairs.get(h))
                        .is_some_and(|host| actions.action(host.state) == PairAction::Compress);
                    if host_recompressed {
                        log::debug!(
                            "dropping stream '{}' of a replaced host",
                            archive_item(archive, index)?.name
                        );
                        continue;
                    }
                }
                let mut entry = UpdatePlanEntry::keep(index).with_disk_item(pair.disk_index);
                entry.is_same_time = pair.state == PairState::SameFiles;
                plan.push(entry);
            }
            PairAction::Compress => {
                let disk = pair.disk_index.ok_or_else(|| collision(pair))?;
                let mut entry = UpdatePlanEntry::compress(disk, pair.archive_index);
                entry.is_same_time = pair.state == PairState::SameFiles;
                plan.push(entry);
            }
            PairAction::Tombstone => match pair.archive_index {
                Some(i) => {
                    notifier.on_delete(archive_item(archive, i)?)?;
                    plan.push(UpdatePlanEntry::tombstone(i));
                }
                None => {
                    let disk = pair.disk_index.ok_or_else(|| collision(pair))?;
                    plan.push(UpdatePlanEntry {
                        is_anti: true,
                        disk_index: Some(disk),
                        ..UpdatePlanEntry::default()
                    });
                }
            },
        }
    }
    Ok(plan)
}

fn archive_item(archive: &[ArchiveItem], index: usize) -> Result<&ArchiveItem> {
    archive
        .get(index)
        .ok_or_else(|| Error::InvalidPlan(format!("archive index {} out of range", index)))
}

fn collision(pair: &UpdatePair) -> Error {
    Error::InvalidPlan(format!("update action set collision for state {}", pair.state))
}
