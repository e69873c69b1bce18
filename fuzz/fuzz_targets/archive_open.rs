//! Fuzz target for opening an AUPK container from arbitrary bytes.
//!
//! Exercises start header and index parsing, then enumeration and entry
//! decoding. Looks for panics, hangs and oversized allocations.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use arcupdate::codec::simple::SimpleFormat;
use arcupdate::codec::{ArchiveFormat, InArchive};
use arcupdate::enumerate::enumerate;
use arcupdate::filter::AllowAll;
use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    let format = SimpleFormat::new();
    let Ok(archive) = format.open(Box::new(Cursor::new(data.to_vec()))) else {
        return;
    };

    // Enumeration reads every entry's metadata
    let _ = enumerate(&archive, None, &AllowAll);

    for index in 0..archive.len() {
        let Ok(entry) = archive.entry(index) else {
            continue;
        };
        let _ = entry.path.len();
        if let Ok(mut stream) = archive.open_entry(index) {
            // Bound the read so huge declared sizes cannot stall the fuzzer
            let mut buf = Vec::new();
            let _ = stream.by_ref().take(1 << 20).read_to_end(&mut buf);
        }
    }
});
