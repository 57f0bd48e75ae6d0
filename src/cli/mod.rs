//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Larder - content-addressed dedup store and git publishing pipeline
#[derive(Parser, Debug)]
#[command(name = "larder", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.larder/config.json)
    #[arg(long, global = true, env = "LARDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Content store operations
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Publish output files to the data repository
    Publish {
        #[command(subcommand)]
        command: PublishCommands,
    },

    /// Database exports
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },

    /// Show store, publisher and ratchet status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Store Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// Store content and print its hash and status
    Put {
        /// File to read, or `-` for stdin
        #[arg(default_value = "-")]
        file: PathBuf,

        /// Metadata JSON object stored with the content
        #[arg(long, short)]
        metadata: Option<String>,
    },

    /// Record a processed result for a hash
    Result {
        /// Content hash
        hash: String,

        /// Job that produced the result
        job_id: String,

        /// File to read, or `-` for stdin
        #[arg(default_value = "-")]
        file: PathBuf,
    },

    /// Show the result and index record for a hash
    Get {
        /// Content hash
        hash: String,
    },

    /// Link a hash to a processing job
    Link {
        /// Content hash
        hash: String,

        /// Job id
        job_id: String,
    },

    /// Clear the job link of a hash
    Unlink {
        /// Content hash
        hash: String,
    },

    /// Show index counts and store size
    Stats,
}

// ============================================================================
// Publish Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum PublishCommands {
    /// Run a single publish cycle
    Once,

    /// Run publish cycles until interrupted
    Run {
        /// Seconds between cycles (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },
}

// ============================================================================
// Export Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ExportCommands {
    /// Write one SQL dump into the repository's dump directory
    Dump {
        /// Publish even if the record count is below the ratchet
        #[arg(long)]
        force: bool,

        /// Dump directory (default: <repo>/<export.dump_dir>)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
