//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - Creates a secure template if missing (unless DUOFS_CONFIG is set).
//! - Exposes helpers to ensure a default config exists.
//!
//! Notes:
//! - Unknown XML fields cause a hard failure to surface misconfigurations early.

use anyhow::{Context, Result};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::location::{DATA_ROOT_DEFAULT, PRIMARY_ROOT_DEFAULT};

use super::paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel, VolumeMapping};
use super::CONFIG_ENV;

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    primary_root: Option<String>,
    data_root: Option<String>,
    #[serde(rename = "volume", default)]
    volumes: Vec<XmlVolume>,
    #[serde(rename = "grant", default)]
    grants: Vec<String>,
    full_raw_access: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlVolume {
    #[serde(rename = "@serial")]
    serial: String,
    #[serde(rename = "@root")]
    root: String,
}

fn xml_to_config(parsed: XmlConfig) -> Config {
    let mut cfg = Config::default();

    if let Some(s) = parsed.primary_root.as_deref() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            cfg.primary_root = PathBuf::from(trimmed);
        }
    }
    if let Some(s) = parsed.data_root.as_deref() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            cfg.data_root = PathBuf::from(trimmed);
        }
    }
    cfg.volumes = parsed
        .volumes
        .into_iter()
        .map(|v| VolumeMapping {
            serial: v.serial.trim().to_string(),
            root: PathBuf::from(v.root.trim()),
        })
        .collect();
    cfg.grants = parsed
        .grants
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();
    if let Some(raw) = parsed.full_raw_access {
        cfg.full_raw_access = raw;
    }
    if let Some(s) = parsed.log_level.as_deref() {
        if let Ok(level) = s.trim().parse::<LogLevel>() {
            cfg.log_level = level;
        }
    }
    if let Some(s) = parsed.log_file.as_deref() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            cfg.log_file = Some(PathBuf::from(trimmed));
        }
    }
    cfg
}

/// Load a Config from a specific XML file path (quick_xml).
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    Ok(xml_to_config(parsed))
}

/// Resolve and load the effective configuration.
///
/// Search order:
///  - $DUOFS_CONFIG (explicit; parse failures are hard errors)
///  - OS-appropriate default path; missing file gets a template created
///    and built-in defaults are used for this run.
pub fn load_config() -> Result<Config> {
    if let Some(p) = env::var_os(CONFIG_ENV) {
        return load_config_from_path(Path::new(&p));
    }
    let Some(cfg_path) = default_config_path() else {
        return Ok(Config::default());
    };
    if !cfg_path.exists() {
        let _ = create_template_config(&cfg_path);
        return Ok(Config::default());
    }
    match load_config_from_path(&cfg_path) {
        Ok(cfg) => Ok(cfg),
        Err(e) => {
            debug!(path = %cfg_path.display(), error = %e, "config unusable, using defaults");
            Ok(Config::default())
        }
    }
}

/// Create default template config file and parent directory.
/// Refuses to write through a symlinked ancestor.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        return Err(anyhow::anyhow!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/path/to/duofs.log".into());

    let content = format!(
        "<!--\n  duofs configuration (XML)\n\n  Fields:\n    primary_root     -> host directory backing the `primary` storage id\n    data_root        -> host directory backing the `data` storage id\n    volume           -> removable volume mapping, e.g. <volume serial=\"9016-4EF8\" root=\"/media/sd\"/>\n    grant            -> document tree grant in simple-path form, e.g. <grant>primary:Documents</grant>\n    full_raw_access  -> true to allow direct access to shared volumes without a grant\n    log_level        -> quiet | normal | info | debug\n    log_file         -> path to log file (optional; stdout still used)\n\n  Notes:\n    - CLI flags override XML values.\n-->\n<config>\n  <primary_root>{PRIMARY_ROOT_DEFAULT}</primary_root>\n  <data_root>{DATA_ROOT_DEFAULT}</data_root>\n  <full_raw_access>true</full_raw_access>\n  <log_level>normal</log_level>\n  <log_file>{suggested_log}</log_file>\n</config>\n"
    );

    fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    info!("Created template config at {}", path.display());
    Ok(())
}

/// Create default config if DUOFS_CONFIG not set; return created path so the CLI can inform the user.
pub fn ensure_default_config_exists() -> Option<PathBuf> {
    if env::var_os(CONFIG_ENV).is_some() {
        return None;
    }
    let cfg_path = default_config_path()?;
    if cfg_path.exists() {
        return None;
    }
    if let Ok(true) = path_has_symlink_ancestor(&cfg_path) {
        eprintln!(
            "Refusing to create template config because an existing ancestor is a symlink: {}",
            cfg_path.display()
        );
        return None;
    }
    match create_template_config(&cfg_path) {
        Ok(()) => Some(cfg_path),
        Err(e) => {
            eprintln!(
                "Failed to create template config at {}: {}",
                cfg_path.display(),
                e
            );
            None
        }
    }
}
