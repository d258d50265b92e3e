//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Paths are accepted in either form: absolute (`/storage/emulated/0/Music`)
//!   or simple (`primary:Music`).
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use duofs::config::LogLevel;
use duofs::{ConflictResolution, FolderConflictResolution};

/// CLI wrapper for the duofs library.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Copy, move and zip files across raw and document-tree storage"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(
        short = 'd',
        long,
        help = "Enable debug logging (shorthand for --log-level debug)"
    )]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Override the log file path (normally configured via XML).
    #[arg(long, help = "Write logs to this file in addition to stdout")]
    pub log_file: Option<PathBuf>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, help = "Emit logs in structured JSON")]
    pub json: bool,

    /// Print where duofs will look for the config file (or DUOFS_CONFIG if set), then exit.
    #[arg(long, help = "Print the config file location used by duofs and exit")]
    pub print_config: bool,

    /// Progress report interval in milliseconds (0 disables reporting).
    #[arg(
        long,
        default_value_t = 500,
        help = "Progress report interval in milliseconds (0 = off)"
    )]
    pub interval: i64,

    /// Non-interactive answer for name collisions.
    #[arg(
        long,
        value_enum,
        default_value_t = OnConflict::CreateNew,
        help = "Resolution for name collisions: replace, create-new, skip, merge"
    )]
    pub on_conflict: OnConflict,

    /// Skip the destination free-space check.
    #[arg(long, help = "Skip the destination free-space check")]
    pub skip_space_check: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Copy a file or folder into a destination folder.
    Copy {
        source: String,
        dest: String,
        /// Rename on arrival.
        #[arg(long)]
        new_name: Option<String>,
    },
    /// Move a file or folder into a destination folder.
    Move {
        source: String,
        dest: String,
        /// Rename on arrival.
        #[arg(long)]
        new_name: Option<String>,
    },
    /// Compress files and folders into a zip archive.
    Zip {
        /// Entry files/folders followed by the target zip path.
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
        /// Delete the entries once the archive is complete.
        #[arg(long)]
        delete_entries: bool,
    },
    /// Extract a zip archive into a destination folder.
    Unzip {
        zip: String,
        dest: String,
        /// Delete the archive after a successful extraction.
        #[arg(long)]
        delete_zip: bool,
    },
}

/// Conflict policy for non-interactive runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Replace,
    CreateNew,
    Skip,
    Merge,
}

impl OnConflict {
    pub fn file_resolution(self) -> ConflictResolution {
        match self {
            OnConflict::Replace => ConflictResolution::Replace,
            OnConflict::Skip => ConflictResolution::Skip,
            // Merge has no file-level meaning; fall back to the default.
            OnConflict::CreateNew | OnConflict::Merge => ConflictResolution::CreateNew,
        }
    }

    pub fn folder_resolution(self, can_merge: bool) -> FolderConflictResolution {
        match self {
            OnConflict::Replace => FolderConflictResolution::Replace,
            OnConflict::Skip => FolderConflictResolution::Skip,
            OnConflict::Merge if can_merge => FolderConflictResolution::Merge,
            _ => FolderConflictResolution::CreateNew,
        }
    }
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }
}

pub fn parse() -> Args {
    Args::parse()
}
