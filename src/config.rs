//! Configuration types for the runtime.
//!
//! Loaded from `config.toml`; every section and field falls back to its
//! default when missing.
//!
//! ```toml
//! [scheduler]
//! anr_timeout_ms = 15000
//! suspend_timeout_ms = 5000
//!
//! [apps]
//! dirs = ["/opt/apps"]
//! ```

use crate::error::{Result, VuiError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// App process supervision.
    pub scheduler: SchedulerConfig,
    /// App discovery.
    pub apps: AppsConfig,
    /// Inbound event routing.
    pub dispatcher: DispatcherConfig,
}

/// App process supervision settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Idle time after which an app counts as hung.
    pub anr_timeout_ms: u64,
    /// Period of the hang sentinel.
    pub anr_check_interval_ms: u64,
    /// Bound on a graceful suspend.
    pub suspend_timeout_ms: u64,
    /// Delay before a daemon app is relaunched after it exited.
    pub daemon_restart_delay_ms: u64,
    /// Ping running apps on every sentinel pass so responsive apps stay alive.
    pub probe_liveness: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            anr_timeout_ms: 15_000,
            anr_check_interval_ms: 5_000,
            suspend_timeout_ms: 5_000,
            daemon_restart_delay_ms: 3_000,
            probe_liveness: true,
        }
    }
}

impl SchedulerConfig {
    /// Hang threshold.
    pub fn anr_timeout(&self) -> Duration {
        Duration::from_millis(self.anr_timeout_ms)
    }

    /// Hang sentinel period. Never zero.
    pub fn anr_check_interval(&self) -> Duration {
        Duration::from_millis(self.anr_check_interval_ms.max(1))
    }

    /// Graceful suspend bound.
    pub fn suspend_timeout(&self) -> Duration {
        Duration::from_millis(self.suspend_timeout_ms)
    }

    /// Daemon relaunch delay.
    pub fn daemon_restart_delay(&self) -> Duration {
        Duration::from_millis(self.daemon_restart_delay_ms)
    }
}

/// App discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsConfig {
    /// Directories whose subdirectories are app homes. Empty means the
    /// platform default from [`crate::runtime_dirs::apps_dir`].
    pub dirs: Vec<PathBuf>,
    /// Launch manifest-declared daemons when the runtime starts.
    pub launch_daemons_on_start: bool,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            launch_daemons_on_start: true,
        }
    }
}

impl AppsConfig {
    /// Directories to scan, falling back to the platform default.
    pub fn scan_dirs(&self) -> Vec<PathBuf> {
        if self.dirs.is_empty() {
            vec![crate::runtime_dirs::apps_dir()]
        } else {
            self.dirs.clone()
        }
    }
}

/// Inbound event routing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Whether inbound events are routed at all when the runtime starts.
    pub enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VuiError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| VuiError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (see [`crate::runtime_dirs::config_file`]).
    pub fn default_config_path() -> PathBuf {
        crate::runtime_dirs::config_file()
    }
}
