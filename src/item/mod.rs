//! Item model shared by the scanner, the enumerator and the pairing engine.
//!
//! - [`DiskItem`] / [`DiskItems`]: what is on disk, produced by
//!   [`scan`](crate::scan).
//! - [`ArchiveItem`]: what is in the existing archive, produced by
//!   [`enumerate`](crate::enumerate).

mod archive;
mod attributes;
mod disk;

pub use archive::ArchiveItem;
pub use attributes::Attributes;
pub use disk::{DiskItem, DiskItems, ScanError, ScanStats};
