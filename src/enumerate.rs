//! Listing the entries of an existing archive for pairing.

use crate::codec::InArchive;
use crate::filter::PathFilter;
use crate::item::ArchiveItem;
use crate::timestamp::ItemTime;
use crate::Result;

/// Reads every entry of `archive` into an [`ArchiveItem`].
///
/// Entries without a stored modification time inherit `archive_mtime`, the
/// time of the archive file itself, when one is given. Each item is marked
/// `censored` if `filter` accepts it; a filter that
/// [allows everything](PathFilter::allows_all) is not consulted per item.
///
/// # Errors
///
/// Propagates codec errors while reading entry metadata.
pub fn enumerate(
    archive: &dyn InArchive,
    archive_mtime: Option<ItemTime>,
    filter: &dyn PathFilter,
) -> Result<Vec<ArchiveItem>> {
    let count = archive.len();
    let allow_all = filter.allows_all();
    let mut items = Vec::with_capacity(count);

    for index in 0..count {
        let entry = archive.entry(index)?;
        let mtime = entry
            .mtime
            .map(|time| ItemTime::new(time, entry.time_precision))
            .or(archive_mtime);
        let censored = allow_all || filter.check(&entry.path, entry.is_dir);
        items.push(ArchiveItem {
            name: entry.path,
            size: entry.size,
            mtime,
            is_dir: entry.is_dir,
            is_alt_stream: entry.is_alt_stream,
            censored,
            index,
        });
    }

    log::debug!(
        "enumerated {} archive items ({} selected)",
        items.len(),
        items.iter().filter(|i| i.censored).count()
    );
    Ok(items)
}
