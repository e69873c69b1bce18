//! Multi-volume output.
//!
//! A volume set splits one logical byte stream across numbered files
//! (`archive.aupk.001`, `archive.aupk.002`, ...). The codec writes to a
//! [`VolumeStream`] exactly as it would write to a single file, including
//! seeking back to rewrite headers; the stream maps every absolute position
//! to the volume covering it.
//!
//! # Volume Layout
//!
//! With declared sizes `[s0, s1, ..., sn-1]` and an unbounded tail, after
//! writing `T` bytes volume `i` holds
//! `min(si, max(0, T - (s0 + ... + si-1)))` bytes; the last volume takes
//! whatever remains.
//!
//! # Writing
//!
//! ```rust,ignore
//! use arcupdate::volume::{VolumeConfig, VolumeStream};
//! use std::io::Write;
//!
//! let config = VolumeConfig::new("archive.aupk", 100 * 1024 * 1024);
//! let mut stream = VolumeStream::create(config)?;
//! stream.write_all(&data)?;
//! let sizes = stream.finish()?;
//! println!("Created {} volumes", sizes.len());
//! ```
//!
//! # Reading
//!
//! [`VolumeReader`] concatenates an existing set so a codec can open it
//! like a single file.

mod config;
mod reader;
mod writer;

pub use config::{VolumeConfig, VolumeTail};
pub use reader::VolumeReader;
pub use writer::VolumeStream;
