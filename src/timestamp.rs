//! Timestamps and precision-aware time comparison.
//!
//! Item times are kept as Windows FILETIME values ([`Timestamp`]), which give
//! 100-nanosecond resolution. Archive formats store times at very different
//! resolutions, so every archive time is paired with a [`TimePrecision`] in
//! an [`ItemTime`], and comparisons between a disk file and an archive entry
//! go through [`compare_times`], which first reduces both sides to the
//! coarser of the two precisions.
//!
//! # Example
//!
//! ```rust
//! use arcupdate::timestamp::{compare_times, ItemTime, TimePrecision, Timestamp};
//! use std::cmp::Ordering;
//!
//! let disk = ItemTime::new(Timestamp::from_unix_secs(100).unwrap(), TimePrecision::HighPrecision)
//!     .with_offset_100ns(1234);
//! let archived = ItemTime::new(Timestamp::from_unix_secs(100).unwrap(), TimePrecision::Unix);
//!
//! // Sub-second difference is invisible at Unix precision.
//! assert_eq!(compare_times(TimePrecision::Windows, &disk, &archived), Ordering::Equal);
//! ```

use std::cmp::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME epoch (1601-01-01) and the Unix epoch in
/// 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// A file timestamp with 100-nanosecond resolution.
///
/// Wraps a raw FILETIME value (100-nanosecond intervals since 1601-01-01 UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Returns `None` if the value cannot be represented.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Self::from_unix_secs_nanos(secs, 0)
    }

    /// Creates a timestamp from Unix seconds plus nanoseconds.
    ///
    /// Nanoseconds are truncated to 100 ns.
    pub fn from_unix_secs_nanos(secs: i64, nanos: u32) -> Option<Self> {
        let intervals = i128::from(secs) * i128::from(INTERVALS_PER_SECOND)
            + i128::from(nanos / 100)
            + i128::from(FILETIME_UNIX_DIFF);
        u64::try_from(intervals).ok().map(Self::from_filetime)
    }

    /// Creates a timestamp from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::from_unix_secs_nanos(i64::try_from(d.as_secs()).ok()?, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                let intervals = d.as_secs().checked_mul(INTERVALS_PER_SECOND)?
                    + u64::from(d.subsec_nanos() / 100);
                FILETIME_UNIX_DIFF
                    .checked_sub(intervals)
                    .map(Self::from_filetime)
            }
        }
    }

    /// Returns the raw FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns whole Unix seconds, rounding towards negative infinity.
    pub fn as_unix_secs(&self) -> i64 {
        let rel = i128::from(self.filetime) - i128::from(FILETIME_UNIX_DIFF);
        rel.div_euclid(i128::from(INTERVALS_PER_SECOND)) as i64
    }

    /// Unix seconds saturated to the unsigned 32-bit range.
    ///
    /// This is how formats with a 32-bit time field store out-of-range times.
    pub fn as_unix_secs_u32(&self) -> u32 {
        self.as_unix_secs().clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Returns the time in two-second DOS units, rounded up.
    ///
    /// FAT and ZIP style timestamps have a two second granularity; a file
    /// stored with such a time always carries the next even second.
    pub fn as_dos_units(&self) -> i64 {
        let rel = i128::from(self.filetime) - i128::from(FILETIME_UNIX_DIFF);
        let unit = i128::from(INTERVALS_PER_SECOND) * 2;
        (rel + unit - 1).div_euclid(unit) as i64
    }

    /// Converts to a `SystemTime`, preserving the full 100 ns resolution.
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            let intervals = self.filetime - FILETIME_UNIX_DIFF;
            UNIX_EPOCH
                + Duration::new(
                    intervals / INTERVALS_PER_SECOND,
                    ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
                )
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            UNIX_EPOCH
                - Duration::new(
                    intervals / INTERVALS_PER_SECOND,
                    ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
                )
        }
    }

    /// Converts to a [`filetime::FileTime`] for stamping files on disk.
    pub fn as_file_time(&self) -> filetime::FileTime {
        filetime::FileTime::from_system_time(self.as_system_time())
    }

    /// Returns the sub-second part in 100 ns intervals.
    #[inline]
    pub fn sub_second_100ns(&self) -> u32 {
        (self.filetime % INTERVALS_PER_SECOND) as u32
    }

    /// Truncates the timestamp to a multiple of `unit` 100 ns intervals.
    fn truncate(&self, unit: u64) -> u64 {
        if unit <= 1 {
            self.filetime
        } else {
            self.filetime / unit
        }
    }
}

impl Default for Timestamp {
    /// Returns the Unix epoch.
    fn default() -> Self {
        Self::from_filetime(FILETIME_UNIX_DIFF)
    }
}

impl From<u64> for Timestamp {
    fn from(filetime: u64) -> Self {
        Self::from_filetime(filetime)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

/// Resolution at which a timestamp is meaningful.
///
/// A codec reports its default precision through
/// [`ArchiveFormat::time_precision`](crate::codec::ArchiveFormat::time_precision);
/// individual archive entries may carry their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimePrecision {
    /// No information; the codec default applies.
    #[default]
    Unknown,
    /// FILETIME, 100 ns.
    Windows,
    /// Whole Unix seconds, stored as 32-bit values.
    Unix,
    /// DOS two-second granularity.
    Dos,
    /// Nanosecond sources; compared at 100 ns since that is the storage limit.
    HighPrecision,
    /// A given number of decimal fractional-second digits (0..=9).
    Digits(u8),
}

impl TimePrecision {
    /// Number of fractional digits represented, for the digit-based classes.
    fn digits(self) -> Option<u8> {
        match self {
            TimePrecision::Windows => Some(7),
            TimePrecision::HighPrecision => Some(9),
            TimePrecision::Digits(n) => Some(n.min(9)),
            _ => None,
        }
    }

    /// Unit size in 100 ns intervals for a digit count.
    fn unit_for_digits(digits: u8) -> u64 {
        if digits >= 7 {
            1
        } else {
            10u64.pow(u32::from(7 - digits))
        }
    }
}

/// A timestamp together with the precision it was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemTime {
    /// The timestamp value.
    pub time: Timestamp,
    /// Precision of the value.
    pub precision: TimePrecision,
}

impl ItemTime {
    /// Creates an item time.
    pub fn new(time: Timestamp, precision: TimePrecision) -> Self {
        Self { time, precision }
    }

    /// A FILETIME-precision value, as produced by disk scans on Windows.
    pub fn windows(time: Timestamp) -> Self {
        Self::new(time, TimePrecision::Windows)
    }

    /// Adds a number of 100 ns intervals to the time.
    pub fn with_offset_100ns(mut self, offset: u64) -> Self {
        self.time = Timestamp::from_filetime(self.time.as_filetime().saturating_add(offset));
        self
    }
}

/// Compares a disk time against an archive time.
///
/// `default_precision` is the codec's precision; it is used when the archive
/// entry does not declare its own. The disk precision caps the comparison,
/// so a disk with whole-second times never looks newer than an archive entry
/// that stored the same second with sub-second digits.
///
/// Returns `Greater` when the disk file is newer.
pub fn compare_times(
    default_precision: TimePrecision,
    disk: &ItemTime,
    archive: &ItemTime,
) -> Ordering {
    let precision = match archive.precision {
        TimePrecision::Unknown => default_precision,
        p => p,
    };

    match precision {
        TimePrecision::Dos => {
            return disk.time.as_dos_units().cmp(&archive.time.as_dos_units());
        }
        TimePrecision::Unix => {
            let archived = archive.time.as_unix_secs();
            if archived <= 0 || archived >= i64::from(u32::MAX) {
                // The archive value was probably saturated to 32 bits.
                return disk
                    .time
                    .as_unix_secs_u32()
                    .cmp(&archive.time.as_unix_secs_u32());
            }
            return disk.time.as_unix_secs().cmp(&archived);
        }
        _ => {}
    }

    let mut digits = precision.digits().unwrap_or(7);
    let disk_digits = match disk.precision {
        TimePrecision::Unix | TimePrecision::Dos => Some(0),
        p => p.digits(),
    };
    if let Some(disk_digits) = disk_digits {
        digits = digits.min(disk_digits);
    }
    let unit = TimePrecision::unit_for_digits(digits);
    disk.time.truncate(unit).cmp(&archive.time.truncate(unit))
}
