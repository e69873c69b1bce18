//! Options for update runs.

use crate::context::UpdateContext;
use crate::pair::{ActionSet, Policy, RenameRule};
use crate::volume::{VolumeConfig, VolumeTail};
use crate::Result;
use std::path::{Path, PathBuf};

/// Options controlling one update run.
///
/// ```rust
/// use arcupdate::pair::Policy;
/// use arcupdate::update::UpdateOptions;
///
/// let options = UpdateOptions::new()
///     .policy(Policy::Sync)
///     .volumes(vec![64 * 1024 * 1024])
///     .stop_after_open_error(false);
/// assert_eq!(options.get_policy(), Policy::Sync);
/// ```
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub(crate) policy: Policy,
    pub(crate) actions: Option<ActionSet>,
    pub(crate) rename_rules: Vec<RenameRule>,
    pub(crate) volume_sizes: Option<Vec<u64>>,
    pub(crate) volume_tail: Option<VolumeTail>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) set_archive_mtime: bool,
    pub(crate) stop_after_open_error: bool,
    pub(crate) delete_after_compressing: bool,
    pub(crate) context: UpdateContext,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            actions: None,
            rename_rules: Vec::new(),
            volume_sizes: None,
            volume_tail: None,
            working_dir: None,
            set_archive_mtime: true,
            stop_after_open_error: true,
            delete_after_compressing: false,
            context: UpdateContext::default(),
        }
    }
}

impl UpdateOptions {
    /// Creates default options: [`Policy::Add`], single output file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the update policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Uses a custom action table instead of the policy's.
    pub fn actions(mut self, actions: ActionSet) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Adds a rename rule. Any rule switches the run to rename mode, where
    /// disk items are ignored.
    pub fn rename(mut self, rule: RenameRule) -> Self {
        self.rename_rules.push(rule);
        self
    }

    /// Replaces all rename rules.
    pub fn rename_rules(mut self, rules: Vec<RenameRule>) -> Self {
        self.rename_rules = rules;
        self
    }

    /// Splits the output into volumes of the given sizes.
    ///
    /// With one size every volume gets that size; with several the last
    /// volume is unbounded unless [`volume_tail`](Self::volume_tail) says
    /// otherwise.
    pub fn volumes(mut self, sizes: Vec<u64>) -> Self {
        self.volume_sizes = Some(sizes);
        self
    }

    /// Sets how volumes past the declared sizes are handled.
    pub fn volume_tail(mut self, tail: VolumeTail) -> Self {
        self.volume_tail = Some(tail);
        self
    }

    /// Writes the temporary archive into `dir` instead of next to the target.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Stamps the archive with the newest entry time (default on).
    pub fn set_archive_mtime(mut self, enabled: bool) -> Self {
        self.set_archive_mtime = enabled;
        self
    }

    /// Fails the run when a disk item cannot be opened (default on). When
    /// off, the item is skipped and recorded as a failure.
    pub fn stop_after_open_error(mut self, stop: bool) -> Self {
        self.stop_after_open_error = stop;
        self
    }

    /// Deletes disk files once they are safely in the committed archive.
    pub fn delete_after_compressing(mut self, enabled: bool) -> Self {
        self.delete_after_compressing = enabled;
        self
    }

    /// Sets the name rule, cancel flag and poll interval.
    pub fn context(mut self, context: UpdateContext) -> Self {
        self.context = context;
        self
    }

    /// Returns the policy.
    pub fn get_policy(&self) -> Policy {
        self.policy
    }

    /// Returns the action table in effect.
    pub fn action_set(&self) -> ActionSet {
        self.actions.unwrap_or_else(|| self.policy.action_set())
    }

    /// Returns the rename rules.
    pub fn get_rename_rules(&self) -> &[RenameRule] {
        &self.rename_rules
    }

    /// Returns true if the run renames entries.
    pub fn is_rename(&self) -> bool {
        !self.rename_rules.is_empty()
    }

    /// Returns the context.
    pub fn get_context(&self) -> &UpdateContext {
        &self.context
    }

    /// Returns the working directory, if set.
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Builds the volume configuration for `archive`, if volumes are enabled.
    pub fn volume_config(&self, archive: &Path) -> Result<Option<VolumeConfig>> {
        let Some(sizes) = &self.volume_sizes else {
            return Ok(None);
        };
        let default_tail = if sizes.len() == 1 {
            VolumeTail::Repeat
        } else {
            VolumeTail::Unbounded
        };
        let config = VolumeConfig::with_sizes(archive, sizes.clone())?
            .with_tail(self.volume_tail.unwrap_or(default_tail));
        Ok(Some(config))
    }
}

/// One archive to update: target path plus options.
#[derive(Debug, Clone)]
pub struct UpdateJob {
    pub(crate) archive: PathBuf,
    pub(crate) options: UpdateOptions,
}

impl UpdateJob {
    /// Creates a job for `archive` with default options.
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            options: UpdateOptions::default(),
        }
    }

    /// Sets the options.
    pub fn options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// The target archive path (the volume base path for split archives).
    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// The options.
    pub fn get_options(&self) -> &UpdateOptions {
        &self.options
    }
}
