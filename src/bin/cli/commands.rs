//! Command implementations for the CLI tool.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use arcupdate::codec::simple::SimpleFormat;
use arcupdate::codec::{ArchiveEntry, ArchiveFormat, InArchive, ReadSeek};
use arcupdate::filter::{AllowAll, PathFilter, PatternFilter};
use arcupdate::item::DiskItems;
use arcupdate::scan::DirScanner;
use arcupdate::{
    ArchiveUpdater, CancelFlag, Error, Policy, RenameRule, UpdateContext, UpdateJob, UpdateOptions, UpdateReport,
    VolumeReader,
};

use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::output::create_formatter;
use crate::progress::CliProgress;
use crate::{OutputArgs, OutputFormat, UpdateArgs};

/// Settings shared by every command.
pub struct Session {
    pub format: OutputFormat,
    pub quiet: bool,
    pub cancel: CancelFlag,
}

impl Session {
    fn context(&self) -> UpdateContext {
        UpdateContext::new().cancel_flag(self.cancel.clone())
    }

    fn progress(&self) -> CliProgress {
        // JSON goes to stdout; keep the terminal free of bars in that mode.
        CliProgress::new(self.quiet || self.format == OutputFormat::Json)
    }
}

/// Add/update command implementation
pub fn update(session: &Session, args: &UpdateArgs, policy: Policy) -> ExitCode {
    let filter = match PatternFilter::new(&args.include, &args.exclude) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::BadArgs;
        }
    };

    let disk = DirScanner::new()
        .recursive(args.recursive)
        .exclude_path(&args.archive)
        .scan_filtered(&args.files, &filter);
    for err in disk.errors() {
        eprintln!("Warning: cannot scan {}: {}", err.path.display(), err.message);
    }

    let options = base_options(session, &args.output)
        .policy(policy)
        .stop_after_open_error(!args.skip_unreadable)
        .delete_after_compressing(args.delete_after);

    run(session, &args.archive, options, &args.output, &disk, &filter)
}

/// Delete command implementation
pub fn delete(session: &Session, archive: &Path, patterns: &[String], output: &OutputArgs) -> ExitCode {
    if !archive_exists(archive) {
        eprintln!("Error: archive not found: {}", archive.display());
        return ExitCode::IoError;
    }
    let filter = match PatternFilter::new(patterns, &[]) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::BadArgs;
        }
    };

    let options = base_options(session, output).policy(Policy::Delete);
    run(session, archive, options, output, &DiskItems::empty(), &filter)
}

/// Rename command implementation
pub fn rename(session: &Session, archive: &Path, pairs: &[String], output: &OutputArgs) -> ExitCode {
    if pairs.len() % 2 != 0 {
        eprintln!("Error: rename expects pairs of OLD NEW names");
        return ExitCode::BadArgs;
    }
    if !archive_exists(archive) {
        eprintln!("Error: archive not found: {}", archive.display());
        return ExitCode::IoError;
    }

    let rules: Result<Vec<_>, Error> = pairs
        .chunks_exact(2)
        .map(|pair| RenameRule::new(pair[0].as_str(), pair[1].as_str()))
        .collect();
    let rules = match rules {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };

    let options = base_options(session, output).rename_rules(rules);
    run(session, archive, options, output, &DiskItems::empty(), &AllowAll)
}

/// List command implementation
pub fn list(session: &Session, archive: &Path, technical: bool) -> ExitCode {
    let formatter = create_formatter(session.format);
    match read_entries(archive) {
        Ok(entries) => {
            print!("{}", formatter.format_list(&entries, technical));
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            error_to_exit_code(&e)
        }
    }
}

fn base_options(session: &Session, output: &OutputArgs) -> UpdateOptions {
    let mut options = UpdateOptions::new()
        .context(session.context())
        .set_archive_mtime(!output.keep_archive_time);
    if !output.volumes.is_empty() {
        options = options.volumes(output.volumes.clone());
    }
    if let Some(dir) = &output.working_dir {
        options = options.working_dir(dir);
    }
    options
}

fn run(
    session: &Session,
    archive: &Path,
    options: UpdateOptions,
    output: &OutputArgs,
    disk: &DiskItems,
    filter: &dyn PathFilter,
) -> ExitCode {
    let formatter = create_formatter(session.format);
    let format = SimpleFormat::new().method(output.method.into()).level(output.level);
    let updater = ArchiveUpdater::new(format);
    let job = UpdateJob::new(archive).options(options);

    let mut progress = session.progress();
    let result = updater.update(&job, disk, filter, &mut progress);
    let report = UpdateReport::from_result(&result);
    print!("{}", formatter.format_update(&report));

    match result {
        Ok(outcome) if outcome.is_clean() && progress.warnings() == 0 => ExitCode::Success,
        Ok(_) => ExitCode::Warning,
        Err(e) => error_to_exit_code(&e),
    }
}

fn archive_exists(archive: &Path) -> bool {
    archive.is_file() || VolumeReader::is_volume_set(archive)
}

fn read_entries(archive: &Path) -> arcupdate::Result<Vec<ArchiveEntry>> {
    let reader: Box<dyn ReadSeek + Send> = if archive.is_file() {
        Box::new(BufReader::new(File::open(archive)?))
    } else {
        Box::new(VolumeReader::open(archive)?)
    };
    let opened = SimpleFormat::new().open(reader)?;
    (0..opened.len()).map(|index| opened.entry(index)).collect()
}
