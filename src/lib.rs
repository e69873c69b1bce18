//! # arcupdate
//!
//! An archive update engine: it compares files on disk with the entries of an
//! existing archive, decides per entry what to keep, recompress, delete or
//! rename, and writes the new archive atomically, as one file or split into
//! numbered volumes.
//!
//! The archive layout itself is a pluggable codec ([`codec::ArchiveFormat`]).
//! The crate ships a small reference container, [`codec::simple`], that is
//! used to drive and test the pipeline.
//!
//! ## Quick Start
//!
//! ### Updating an Archive from a Directory
//!
//! ```rust,no_run
//! use arcupdate::codec::simple::SimpleFormat;
//! use arcupdate::filter::AllowAll;
//! use arcupdate::pair::Policy;
//! use arcupdate::progress::StatisticsReporter;
//! use arcupdate::scan::DirScanner;
//! use arcupdate::update::{ArchiveUpdater, UpdateJob, UpdateOptions};
//! use arcupdate::Result;
//!
//! fn main() -> Result<()> {
//!     let disk = DirScanner::new().scan(&["project"]);
//!     let job = UpdateJob::new("project.aupk")
//!         .options(UpdateOptions::new().policy(Policy::Sync));
//!
//!     let mut stats = StatisticsReporter::new();
//!     let outcome = ArchiveUpdater::new(SimpleFormat::new()).update(&job, &disk, &AllowAll, &mut stats)?;
//!     println!("{} bytes, {} entries deleted", outcome.output_size, stats.deleted.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Splitting into Volumes
//!
//! ```rust,no_run
//! use arcupdate::update::UpdateOptions;
//!
//! // project.aupk.001, project.aupk.002, ... of 64 MiB each
//! let options = UpdateOptions::new().volumes(vec![64 * 1024 * 1024]);
//! ```
//!
//! ### Renaming Entries
//!
//! ```rust,no_run
//! use arcupdate::pair::RenameRule;
//! use arcupdate::update::UpdateOptions;
//!
//! # fn main() -> arcupdate::Result<()> {
//! // Rename mode ignores the disk items.
//! let options = UpdateOptions::new().rename(RenameRule::new("docs", "manual")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Policies
//!
//! | Policy | New on disk | Newer on disk | Only in archive |
//! |--------|-------------|---------------|-----------------|
//! | [`Add`](pair::Policy::Add) | add | keep | keep |
//! | [`Update`](pair::Policy::Update) | add | replace | keep |
//! | [`Fresh`](pair::Policy::Fresh) | ignore | replace | keep |
//! | [`Sync`](pair::Policy::Sync) | add | replace | delete |
//! | [`Delete`](pair::Policy::Delete) | ignore | delete | delete |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `deflate` | Yes | Deflate entries in the reference container |
//! | `scanner` | Yes | `walkdir` based [`scan::DirScanner`] |
//! | `cli` | No | Command-line interface tool |
//!
//! ## Logging
//!
//! The library logs through the [`log`](https://docs.rs/log) facade and never
//! installs a logger.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod archive_path;
pub mod codec;
pub mod context;
pub mod enumerate;
pub mod error;
pub mod filter;
pub mod item;
pub mod pair;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod stream;
pub mod timestamp;
pub mod update;
pub mod volume;

pub use archive_path::NameMode;
pub use context::{CancelFlag, UpdateContext};
pub use error::{Error, ErrorCategory, Result};
pub use timestamp::{TimePrecision, Timestamp};

// Re-export the update API at crate root for convenience
pub use pair::{Policy, RenameRule};
pub use plan::{PlanSummary, UpdatePlan, UpdatePlanEntry};
pub use update::{ArchiveUpdater, UpdateJob, UpdateOptions, UpdateOutcome, UpdateReport};

// Re-export progress API
pub use progress::{NoProgress, StatisticsReporter, UpdateReporter, UpdateStage};

// Re-export volume API
pub use volume::{VolumeConfig, VolumeReader, VolumeStream, VolumeTail};
