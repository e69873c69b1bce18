//! CLI tool for arcupdate archive operations.

mod commands;
mod exit_codes;
mod output;
mod progress;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use arcupdate::CancelFlag;
use exit_codes::ExitCode;

/// Atomic archive update tool
#[derive(Parser)]
#[command(name = "arcupdate")]
#[command(author, version, about = "Atomic archive update tool", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add files, keeping entries that already exist (alias: a)
    #[command(alias = "a")]
    Add {
        #[command(flatten)]
        update: UpdateArgs,
    },

    /// Update the archive from disk (alias: u)
    #[command(alias = "u")]
    Update {
        #[command(flatten)]
        update: UpdateArgs,

        /// Which entries to touch
        #[arg(long, value_enum, default_value = "update")]
        mode: UpdateMode,
    },

    /// Delete entries matching patterns (alias: d)
    #[command(alias = "d")]
    Delete {
        /// Archive file
        archive: PathBuf,

        /// Entry patterns to delete (glob patterns supported)
        #[arg(required = true)]
        patterns: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rename entries (alias: rn)
    #[command(alias = "rn")]
    Rename {
        /// Archive file
        archive: PathBuf,

        /// Pairs of old and new names
        #[arg(required = true, num_args = 2.., value_names = ["OLD", "NEW"])]
        pairs: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List archive contents (alias: l)
    #[command(alias = "l")]
    List {
        /// Archive file (or its first volume)
        archive: PathBuf,

        /// Show technical details
        #[arg(long)]
        technical: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments shared by commands that read files from disk.
#[derive(Args)]
pub struct UpdateArgs {
    /// Archive file to create or update
    archive: PathBuf,

    /// Files and directories to add
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Include patterns (matched against names inside the archive)
    #[arg(short = 'i', long)]
    include: Vec<String>,

    /// Exclude patterns
    #[arg(short = 'x', long)]
    exclude: Vec<String>,

    /// Recursive directory scanning
    #[arg(short = 'r', long, default_value = "true", action = clap::ArgAction::Set)]
    recursive: bool,

    /// Skip files that cannot be opened instead of failing
    #[arg(long)]
    skip_unreadable: bool,

    /// Delete files from disk once they are in the archive
    #[arg(long)]
    delete_after: bool,

    #[command(flatten)]
    output: OutputArgs,
}

/// Arguments that control how the new archive is written.
#[derive(Args)]
pub struct OutputArgs {
    /// Volume sizes, e.g. `-v 100m` or `-v 10m -v 50m`
    #[arg(short = 'v', long = "volume", value_parser = parse_size)]
    volumes: Vec<u64>,

    /// Directory for the temporary archive
    #[arg(short = 'w', long)]
    working_dir: Option<PathBuf>,

    /// Compression method
    #[arg(short = 'm', long, value_enum, default_value = "deflate")]
    method: CompressionMethod,

    /// Compression level (0-9)
    #[arg(short = 'l', long, default_value = "6")]
    level: u32,

    /// Do not set the archive time to the newest entry time
    #[arg(long)]
    keep_archive_time: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum UpdateMode {
    /// Add new files and replace older entries
    Update,
    /// Only replace older entries
    Fresh,
    /// Like update, and delete entries missing on disk
    Sync,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CompressionMethod {
    Store,
    Deflate,
}

impl From<CompressionMethod> for arcupdate::codec::simple::Method {
    fn from(method: CompressionMethod) -> Self {
        match method {
            CompressionMethod::Store => arcupdate::codec::simple::Method::Store,
            CompressionMethod::Deflate => arcupdate::codec::simple::Method::Deflate,
        }
    }
}

impl From<UpdateMode> for arcupdate::Policy {
    fn from(mode: UpdateMode) -> Self {
        match mode {
            UpdateMode::Update => arcupdate::Policy::Update,
            UpdateMode::Fresh => arcupdate::Policy::Fresh,
            UpdateMode::Sync => arcupdate::Policy::Sync,
        }
    }
}

/// Parses sizes like `1500`, `64k`, `100m` or `2g` (binary units).
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last().map(|c| c.to_ascii_lowercase()) {
        Some('b') => (&s[..s.len() - 1], 1),
        Some('k') => (&s[..s.len() - 1], 1 << 10),
        Some('m') => (&s[..s.len() - 1], 1 << 20),
        Some('g') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    let value: u64 = digits.parse().map_err(|_| format!("invalid size: {}", s))?;
    match value.checked_mul(multiplier) {
        Some(0) => Err("volume size must be positive".to_string()),
        Some(size) => Ok(size),
        None => Err(format!("size too large: {}", s)),
    }
}

fn main() {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    // First Ctrl+C asks the update to stop and clean up; the second exits.
    ctrlc::set_handler(move || {
        if handler_flag.is_cancelled() {
            std::process::exit(exit_codes::USER_INTERRUPT);
        }
        eprintln!("\nInterrupted, cleaning up...");
        handler_flag.cancel();
    })
    .ok();

    let cli = Cli::parse();
    let session = commands::Session {
        format: cli.format,
        quiet: cli.quiet,
        cancel,
    };

    let exit_code = match cli.command {
        Commands::Add { update } => commands::update(&session, &update, arcupdate::Policy::Add),
        Commands::Update { update, mode } => commands::update(&session, &update, mode.into()),
        Commands::Delete {
            archive,
            patterns,
            output,
        } => commands::delete(&session, &archive, &patterns, &output),
        Commands::Rename {
            archive,
            pairs,
            output,
        } => commands::rename(&session, &archive, &pairs, &output),
        Commands::List { archive, technical } => commands::list(&session, &archive, technical),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
