//! Filesystem locations used by the runtime.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Config | `~/.config/yoda-vui/` | `~/Library/Application Support/yoda-vui/` |
//! | Data (installed apps) | `~/.local/share/yoda-vui/` | `~/Library/Application Support/yoda-vui/` |
//!
//! # Environment Overrides
//!
//! - `VUI_CONFIG_DIR` overrides [`config_dir`]
//! - `VUI_DATA_DIR` overrides [`data_dir`]

use std::path::PathBuf;

const APP_DIR_NAME: &str = "yoda-vui";

/// Environment variable overriding [`config_dir`].
pub const CONFIG_DIR_ENV: &str = "VUI_CONFIG_DIR";

/// Environment variable overriding [`data_dir`].
pub const DATA_DIR_ENV: &str = "VUI_DATA_DIR";

/// Runtime config directory, holding `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/yoda-vui-config"))
}

/// Runtime data directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/yoda-vui-data"))
}

/// Default directory scanned for installed apps (`data_dir()/apps/`).
#[must_use]
pub fn apps_dir() -> PathBuf {
    data_dir().join("apps")
}

/// Default config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
