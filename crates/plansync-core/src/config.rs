//! Persistent settings: offline-editing defaults and sync policy.
//!
//! Settings live in a TOML file (see `plansync init`). The coordinator only
//! touches them through [`SettingsStore`]: it reads the offline-editing
//! defaults when it builds the offline placeholder vehicle and writes them
//! back whenever a real vehicle becomes active.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::vehicle::{FirmwareType, VehicleType};

/// Platform used as the template for plans edited without a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OfflineDefaults {
    #[serde(default)]
    pub firmware: FirmwareType,
    #[serde(default)]
    pub vehicle_type: VehicleType,
}

/// Policy knobs for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Permit `send_to_vehicle` in monitor mode.
    #[serde(default = "default_allow_monitor_upload")]
    pub allow_monitor_upload: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            allow_monitor_upload: default_allow_monitor_upload(),
        }
    }
}

fn default_allow_monitor_upload() -> bool {
    true
}

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub offline: OfflineDefaults,
    #[serde(default)]
    pub policy: SyncPolicy,
}

impl ConfigFile {
    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))
    }

    /// Serialize and write a settings file, creating parent dirs as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config file at {}", path.display()))?;
        Ok(())
    }
}

/// Where the coordinator reads and records offline-editing defaults.
pub trait SettingsStore: Send + Sync {
    fn offline_defaults(&self) -> OfflineDefaults;

    fn store_offline_defaults(&self, defaults: OfflineDefaults) -> Result<()>;
}

/// [`SettingsStore`] backed by the TOML settings file.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    config: Mutex<ConfigFile>,
}

impl FileSettingsStore {
    /// Open the settings file at `path`. A missing file yields defaults and
    /// is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            ConfigFile::load(&path)?
        } else {
            ConfigFile::default()
        };
        Ok(Self {
            path,
            config: Mutex::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the full settings file.
    pub fn config(&self) -> ConfigFile {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for FileSettingsStore {
    fn offline_defaults(&self) -> OfflineDefaults {
        self.config().offline
    }

    fn store_offline_defaults(&self, defaults: OfflineDefaults) -> Result<()> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        if config.offline == defaults && self.path.exists() {
            return Ok(());
        }
        config.offline = defaults;
        config.save(&self.path)
    }
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    defaults: Mutex<OfflineDefaults>,
}

impl MemorySettingsStore {
    pub fn new(defaults: OfflineDefaults) -> Self {
        Self {
            defaults: Mutex::new(defaults),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn offline_defaults(&self) -> OfflineDefaults {
        *self.defaults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_offline_defaults(&self, defaults: OfflineDefaults) -> Result<()> {
        *self.defaults.lock().unwrap_or_else(PoisonError::into_inner) = defaults;
        Ok(())
    }
}
