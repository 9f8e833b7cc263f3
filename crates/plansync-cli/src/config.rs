//! Configuration file management for plansync.
//!
//! The config file lives at `~/.config/plansync/config.toml` and doubles as
//! the coordinator's settings store. Values resolve through the chain:
//! CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use plansync_core::{ConfigFile, OfflineDefaults, SyncPolicy};

/// Env var naming an alternative config file.
pub const CONFIG_ENV: &str = "PLANSYNC_CONFIG";

/// Env var overriding `policy.allow_monitor_upload`.
pub const ALLOW_MONITOR_UPLOAD_ENV: &str = "PLANSYNC_ALLOW_MONITOR_UPLOAD";

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the plansync config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/plansync` or
/// `~/.config/plansync`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("plansync");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("plansync")
}

/// Return the default config file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Config file path: `cli_path` > `PLANSYNC_CONFIG` > default.
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_path(),
    }
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq)]
pub struct PlansyncConfig {
    /// File the settings were read from and will be written to.
    pub path: PathBuf,
    /// Whether `path` existed at resolution time.
    pub file_found: bool,
    pub offline: OfflineDefaults,
    pub policy: SyncPolicy,
}

impl PlansyncConfig {
    /// Resolve configuration.
    ///
    /// - Path: `cli_path` > `PLANSYNC_CONFIG` env > `~/.config/plansync/config.toml`
    /// - Monitor upload: `PLANSYNC_ALLOW_MONITOR_UPLOAD` env > `policy.allow_monitor_upload` > `true`
    /// - Offline defaults: config file > PX4 multirotor
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path);
        let file_found = path.exists();
        let file = if file_found {
            ConfigFile::load(&path)?
        } else {
            ConfigFile::default()
        };

        let mut policy = file.policy;
        if let Ok(value) = std::env::var(ALLOW_MONITOR_UPLOAD_ENV) {
            policy.allow_monitor_upload = parse_bool(ALLOW_MONITOR_UPLOAD_ENV, &value)?;
        }

        Ok(Self {
            path,
            file_found,
            offline: file.offline,
            policy,
        })
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{name} must be a boolean (true/false), got {other:?}"),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
