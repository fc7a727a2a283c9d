//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// plugdeps - Git-backed plugin manager
#[derive(Parser, Debug)]
#[command(
    name = "pd",
    about = "Install, update and snapshot Git-backed plugins",
    version,
    after_help = "Logs are written to: ~/.local/share/plugdeps/logs/plugdeps.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Accept confirmation reports without opening an editor
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register plugins, installing those not on disk
    Add {
        /// `owner/repo`, a URI, a path, or a plugin name
        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// Fetch and check out plugins (all when no names are given)
    Update {
        /// Plugin names
        names: Vec<String>,

        /// Check out without confirmation and append the report to the update log
        #[arg(short, long)]
        force: bool,

        /// Do not download from `origin`
        #[arg(short, long)]
        offline: bool,
    },

    /// Delete plugin directories not in the session
    Clean {
        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Drop a plugin from the session
    Remove {
        name: String,

        /// Also delete its directory
        #[arg(short, long)]
        delete: bool,
    },

    /// Snapshot commands
    Snap {
        #[command(subcommand)]
        command: SnapCommand,
    },

    /// Print the registered plugins
    Session,

    /// Print the active plugin directories
    Path,

    /// Show the update log
    Log {
        /// Number of lines to show
        #[arg(short, long)]
        lines: Option<usize>,
    },
}

/// Snapshot subcommands
#[derive(Subcommand, Debug)]
pub enum SnapCommand {
    /// Print the current name to commit mapping
    Get,

    /// Check out plugins to the commits in a snapshot file
    Set { file: PathBuf },

    /// Save the current snapshot (to the configured file by default)
    Save { path: Option<PathBuf> },

    /// Apply a saved snapshot (from the configured file by default)
    Load { path: Option<PathBuf> },
}

/// Path of the diagnostic log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plugdeps")
        .join("logs")
        .join("plugdeps.log")
}
