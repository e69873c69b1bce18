//! Fuzz target for name comparison and rename rules.
//!
//! The input is split at the first two NUL bytes into an old prefix, a new
//! prefix and an entry name.
//!
//! Run with: cargo +nightly fuzz run rename_rule
//!
//! Properties checked:
//! - name comparison is reflexive and antisymmetric
//! - a matching rule never produces an empty name
//! - a name only matches a rule whose old name is a component prefix of it

#![no_main]

use arcupdate::archive_path::{NameMode, compare_names, names_equal, starts_with_components};
use arcupdate::pair::RenameRule;
use libfuzzer_sys::fuzz_target;
use std::cmp::Ordering;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut parts = text.splitn(3, '\0');
    let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return;
    };

    for mode in [NameMode::CaseSensitive, NameMode::CaseInsensitive] {
        assert_eq!(compare_names(name, name, mode), Ordering::Equal);
        assert!(names_equal(name, name, mode));
        assert_eq!(
            compare_names(old, name, mode),
            compare_names(name, old, mode).reverse()
        );

        let Ok(rule) = RenameRule::new(old, new) else {
            continue;
        };
        for is_dir in [false, true] {
            let Some(renamed) = rule.apply(name, is_dir, mode) else {
                continue;
            };
            assert!(!renamed.is_empty());
            if mode == NameMode::CaseSensitive {
                let old = rule.old().trim_end_matches('/');
                assert!(old.is_empty() || starts_with_components(name, old, mode));
            }
        }
    }
});
