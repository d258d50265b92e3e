//! Configuration: mount table, document grants, and log settings.
//! Loaded from XML with an env-var override, template created on first run.

pub mod paths;
pub mod types;
pub mod xml;

pub use paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use xml::{create_template_config, ensure_default_config_exists, load_config};

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "DUOFS_CONFIG";
