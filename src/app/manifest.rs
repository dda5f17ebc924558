//! App package manifest (`manifest.toml`).
//!
//! Every app home directory carries a `manifest.toml` describing how the app
//! is launched and which voice skills it serves.
//!
//! # Example `manifest.toml`
//!
//! ```toml
//! id = "com.example.player"
//! type = "process"
//! exec = "bin/player"
//! args = ["--quiet"]
//! skill_ids = ["music", "podcast"]
//! daemon = false
//! anr_enabled = true
//! ```

use crate::error::{Result, VuiError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Manifest file name inside an app home.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// How an app's worker is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    /// In-process async task.
    Light,
    /// External executable speaking the worker line protocol on stdio.
    Process,
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => f.write_str("light"),
            Self::Process => f.write_str("process"),
        }
    }
}

/// Per-app launch options, seeded from the manifest and mutable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Keep the process alive and relaunch it after it exits.
    pub daemon: bool,
    /// Subject the app to the hang sentinel.
    pub anr_enabled: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            daemon: false,
            anr_enabled: true,
        }
    }
}

/// Parsed contents of an app's `manifest.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppManifest {
    /// Stable app identifier.
    #[serde(rename = "id")]
    pub app_id: String,

    /// Worker hosting type.
    #[serde(rename = "type", default = "default_app_type")]
    pub app_type: AppType,

    /// App home directory. Filled in by the loader, never read from the file.
    #[serde(skip)]
    pub home: PathBuf,

    /// Executable path relative to `home` (required for `process` apps).
    #[serde(default)]
    pub exec: Option<String>,

    /// Extra arguments passed to `exec`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Voice skill ids routed to this app.
    #[serde(default)]
    pub skill_ids: Vec<String>,

    /// Default daemon flag.
    #[serde(default)]
    pub daemon: bool,

    /// Default hang-sentinel flag.
    #[serde(default = "default_anr_enabled")]
    pub anr_enabled: bool,
}

fn default_app_type() -> AppType {
    AppType::Process
}

fn default_anr_enabled() -> bool {
    true
}

impl AppManifest {
    /// Builds an in-process manifest with default launch options.
    pub fn light(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_type: AppType::Light,
            home: PathBuf::new(),
            exec: None,
            args: Vec::new(),
            skill_ids: Vec::new(),
            daemon: false,
            anr_enabled: true,
        }
    }

    /// Adds a served skill id.
    #[must_use]
    pub fn with_skill(mut self, skill_id: impl Into<String>) -> Self {
        self.skill_ids.push(skill_id.into());
        self
    }

    /// Sets the default daemon flag.
    #[must_use]
    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Sets the default hang-sentinel flag.
    #[must_use]
    pub fn with_anr_enabled(mut self, anr_enabled: bool) -> Self {
        self.anr_enabled = anr_enabled;
        self
    }

    /// Default launch options declared by this manifest.
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            daemon: self.daemon,
            anr_enabled: self.anr_enabled,
        }
    }

    /// Absolute path of the executable, if any.
    pub fn exec_path(&self) -> Option<PathBuf> {
        self.exec.as_ref().map(|exec| self.home.join(exec))
    }

    /// Loads and parses `manifest.toml` from `dir`, recording `dir` as home.
    ///
    /// # Errors
    ///
    /// Returns [`VuiError::Manifest`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| VuiError::Manifest(format!("cannot read {}: {e}", path.display())))?;
        let mut manifest: Self = toml::from_str(&raw)
            .map_err(|e| VuiError::Manifest(format!("invalid {}: {e}", path.display())))?;
        manifest.home = dir.to_path_buf();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates that the manifest fields are well-formed.
    ///
    /// # Errors
    ///
    /// - [`VuiError::Manifest`] if `id` is empty or contains whitespace.
    /// - [`VuiError::Manifest`] if a `process` app has no `exec`.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(VuiError::Manifest("`id` cannot be empty".to_owned()));
        }
        if self.app_id.chars().any(char::is_whitespace) {
            return Err(VuiError::Manifest(format!(
                "`id` `{}` must not contain whitespace",
                self.app_id
            )));
        }
        if self.app_type == AppType::Process
            && self.exec.as_deref().is_none_or(|e| e.trim().is_empty())
        {
            return Err(VuiError::Manifest(format!(
                "process app `{}` must declare `exec`",
                self.app_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn write_manifest(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).expect("create dir");
        std::fs::write(dir.join(MANIFEST_FILE), content).expect("write manifest");
    }

    #[test]
    fn parse_full_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"
id = "player"
type = "process"
exec = "bin/player"
args = ["--quiet"]
skill_ids = ["music", "podcast"]
daemon = true
anr_enabled = false
"#,
        );

        let manifest = AppManifest::load_from_dir(dir.path()).expect("load");
        assert_eq!(manifest.app_id, "player");
        assert_eq!(manifest.app_type, AppType::Process);
        assert_eq!(manifest.home, dir.path());
        assert_eq!(manifest.exec_path(), Some(dir.path().join("bin/player")));
        assert_eq!(manifest.args, vec!["--quiet".to_owned()]);
        assert_eq!(manifest.skill_ids.len(), 2);
        assert_eq!(
            manifest.launch_options(),
            LaunchOptions {
                daemon: true,
                anr_enabled: false
            }
        );
    }

    #[test]
    fn light_manifest_needs_no_exec() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "id = \"timer\"\ntype = \"light\"\n");

        let manifest = AppManifest::load_from_dir(dir.path()).expect("load");
        assert_eq!(manifest.app_type, AppType::Light);
        assert!(manifest.anr_enabled);
        assert!(!manifest.daemon);
    }

    #[test]
    fn process_manifest_without_exec_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "id = \"broken\"\n");

        let err = AppManifest::load_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("must declare `exec`"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let manifest = AppManifest::light("  ");
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn missing_manifest_file_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppManifest::load_from_dir(dir.path()).is_err());
    }
}
