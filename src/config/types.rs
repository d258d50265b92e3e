//! Core configuration types.
//! - Config maps storage identifiers onto host directories and carries
//!   log settings.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::{FsDocumentProvider, Storage};
use crate::location::{
    DATA_ROOT_DEFAULT, PRIMARY_ROOT_DEFAULT, StorageLocation, StorageRegistry,
};

use super::paths;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// One removable-volume mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    pub serial: String,
    pub root: PathBuf,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host directory standing in for the primary shared volume.
    pub primary_root: PathBuf,
    /// Host directory standing in for the app-private data area.
    pub data_root: PathBuf,
    /// Removable volumes by serial.
    pub volumes: Vec<VolumeMapping>,
    /// Document tree grants, in simple-path form (`primary:Documents`).
    pub grants: Vec<String>,
    /// Whether the shared volumes may be touched without a grant.
    pub full_raw_access: bool,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_root: PathBuf::from(PRIMARY_ROOT_DEFAULT),
            data_root: PathBuf::from(DATA_ROOT_DEFAULT),
            volumes: Vec::new(),
            grants: Vec::new(),
            full_raw_access: true,
            log_level: LogLevel::Normal,
            log_file: paths::default_log_path(),
        }
    }
}

impl Config {
    /// Mount table derived from the configured roots.
    pub fn registry(&self) -> StorageRegistry {
        let mut registry = StorageRegistry::new(
            self.primary_root.to_string_lossy(),
            self.data_root.to_string_lossy(),
        );
        for volume in &self.volumes {
            registry.add_volume(volume.serial.clone(), volume.root.to_string_lossy());
        }
        registry
    }

    /// Build the storage facade: raw backend over the mount table, tree
    /// backend over the configured grants. Grants naming unresolvable
    /// locations are dropped with a warning.
    pub fn storage(&self) -> Storage {
        let registry = self.registry();
        let mut provider = FsDocumentProvider::new();
        let mut granted = false;
        for grant in &self.grants {
            let loc = registry.parse(grant);
            if !loc.is_resolvable() {
                tracing::warn!(grant = %grant, "ignoring unresolvable grant");
                continue;
            }
            let backing = registry.absolute_path(&loc);
            provider = provider.grant(loc, backing);
            granted = true;
        }
        let mut storage =
            Storage::new(registry).with_full_raw_access(self.full_raw_access);
        if granted {
            storage = storage.with_provider(Arc::new(provider));
        }
        storage
    }

    /// Locations of all granted tree roots.
    pub fn granted_locations(&self) -> Vec<StorageLocation> {
        let registry = self.registry();
        self.grants
            .iter()
            .map(|g| registry.parse(g))
            .filter(StorageLocation::is_resolvable)
            .collect()
    }
}
