//! Per-process settings passed explicitly through an update run.
//!
//! [`UpdateContext`] replaces what would otherwise be global state: the
//! filename comparison rule, the time comparison precision and the
//! cancellation flag. It is cheap to clone; clones share the same
//! [`CancelFlag`].

use crate::archive_path::NameMode;
use crate::timestamp::TimePrecision;
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default number of bytes read between cancellation checks.
pub const DEFAULT_POLL_INTERVAL: u64 = 1 << 20;

/// A shared cancellation flag.
///
/// Raising the flag does not interrupt anything by itself; the orchestrator
/// checks it before opening each item and periodically while reading.
///
/// ```rust
/// use arcupdate::context::CancelFlag;
///
/// let flag = CancelFlag::new();
/// let handle = flag.clone();
/// handle.cancel();
/// assert!(flag.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lowers the flag again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns `Err(Error::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Explicit context for an update run.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    name_mode: NameMode,
    time_precision: Option<TimePrecision>,
    cancel: CancelFlag,
    poll_interval: u64,
}

impl Default for UpdateContext {
    fn default() -> Self {
        Self {
            name_mode: NameMode::native(),
            time_precision: None,
            cancel: CancelFlag::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl UpdateContext {
    /// Creates a context with the native name rule and a fresh cancel flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name comparison rule.
    pub fn name_mode(mut self, mode: NameMode) -> Self {
        self.name_mode = mode;
        self
    }

    /// Compares disk and archive times at `precision`, ignoring the
    /// precision the codec and its entries declare.
    pub fn time_precision(mut self, precision: TimePrecision) -> Self {
        self.time_precision = Some(precision);
        self
    }

    /// Uses an existing cancel flag, e.g. one wired to a Ctrl+C handler.
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Sets how many bytes may be read between cancellation checks.
    ///
    /// Zero is treated as one.
    pub fn poll_interval(mut self, bytes: u64) -> Self {
        self.poll_interval = bytes.max(1);
        self
    }

    /// Returns the name comparison rule.
    pub fn names(&self) -> NameMode {
        self.name_mode
    }

    /// Returns the forced time comparison precision, if any.
    pub fn precision_override(&self) -> Option<TimePrecision> {
        self.time_precision
    }

    /// Returns the cancel flag.
    pub fn cancel(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Returns the cancellation poll interval in bytes.
    pub fn poll_bytes(&self) -> u64 {
        self.poll_interval
    }
}
