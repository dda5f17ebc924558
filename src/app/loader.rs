//! App manifest lookup.

use super::manifest::{AppManifest, MANIFEST_FILE};
use std::collections::HashMap;
use std::path::Path;

/// Resolves app ids and skill ids to manifests.
pub trait AppLoader: Send + Sync + 'static {
    /// Manifest for `app_id`, if installed.
    fn manifest(&self, app_id: &str) -> Option<AppManifest>;

    /// App that serves `skill_id`, if any.
    fn app_id_for_skill(&self, skill_id: &str) -> Option<String>;

    /// Every installed app id.
    fn app_ids(&self) -> Vec<String>;

    /// Apps whose manifest declares them as daemons.
    fn daemon_app_ids(&self) -> Vec<String> {
        self.app_ids()
            .into_iter()
            .filter(|id| self.manifest(id).is_some_and(|m| m.daemon))
            .collect()
    }
}

/// In-memory manifest registry.
#[derive(Debug, Default, Clone)]
pub struct ManifestRegistry {
    manifests: HashMap<String, AppManifest>,
    skills: HashMap<String, String>,
}

impl ManifestRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-parsed manifests.
    pub fn from_manifests(manifests: impl IntoIterator<Item = AppManifest>) -> Self {
        let mut registry = Self::new();
        for manifest in manifests {
            registry.insert(manifest);
        }
        registry
    }

    /// Scan each directory in `roots` for app homes containing a manifest.
    ///
    /// Unreadable roots and invalid manifests are skipped with a warning.
    pub fn scan<P: AsRef<Path>>(roots: &[P]) -> Self {
        let mut registry = Self::new();
        for root in roots {
            let root = root.as_ref();
            let entries = match std::fs::read_dir(root) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(dir = %root.display(), error = %e, "cannot read app directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let home = entry.path();
                if !home.join(MANIFEST_FILE).is_file() {
                    continue;
                }
                match AppManifest::load_from_dir(&home) {
                    Ok(manifest) => {
                        registry.insert(manifest);
                    }
                    Err(e) => {
                        tracing::warn!(home = %home.display(), error = %e, "skipping invalid app");
                    }
                }
            }
        }
        tracing::info!(apps = registry.len(), "app manifests loaded");
        registry
    }

    /// Register `manifest`, returning `false` if its id was already taken.
    ///
    /// Skill ids already claimed by another app are not re-routed.
    pub fn insert(&mut self, manifest: AppManifest) -> bool {
        if self.manifests.contains_key(&manifest.app_id) {
            tracing::warn!(app_id = %manifest.app_id, "duplicate app id ignored");
            return false;
        }
        for skill in &manifest.skill_ids {
            if let Some(owner) = self.skills.get(skill) {
                tracing::warn!(skill_id = %skill, owner = %owner, app_id = %manifest.app_id, "skill already routed");
                continue;
            }
            self.skills.insert(skill.clone(), manifest.app_id.clone());
        }
        self.manifests.insert(manifest.app_id.clone(), manifest);
        true
    }

    /// Number of registered apps.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Whether no app is registered.
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

impl AppLoader for ManifestRegistry {
    fn manifest(&self, app_id: &str) -> Option<AppManifest> {
        self.manifests.get(app_id).cloned()
    }

    fn app_id_for_skill(&self, skill_id: &str) -> Option<String> {
        self.skills.get(skill_id).cloned()
    }

    fn app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.manifests.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn skill_routes_to_first_owner() {
        let registry = ManifestRegistry::from_manifests([
            AppManifest::light("player").with_skill("music"),
            AppManifest::light("radio").with_skill("music").with_skill("fm"),
        ]);
        assert_eq!(registry.app_id_for_skill("music").as_deref(), Some("player"));
        assert_eq!(registry.app_id_for_skill("fm").as_deref(), Some("radio"));
        assert!(registry.app_id_for_skill("weather").is_none());
    }

    #[test]
    fn duplicate_app_id_is_ignored() {
        let mut registry = ManifestRegistry::new();
        assert!(registry.insert(AppManifest::light("a")));
        assert!(!registry.insert(AppManifest::light("a").with_daemon(true)));
        assert!(!registry.manifest("a").unwrap().daemon);
    }

    #[test]
    fn daemon_ids_follow_manifests() {
        let registry = ManifestRegistry::from_manifests([
            AppManifest::light("b").with_daemon(true),
            AppManifest::light("a"),
        ]);
        assert_eq!(registry.app_ids(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(registry.daemon_app_ids(), vec!["b".to_owned()]);
    }

    #[test]
    fn scan_skips_invalid_homes() {
        let root = tempfile::tempdir().unwrap();
        let good = root.path().join("good");
        let bad = root.path().join("bad");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        std::fs::write(
            good.join(MANIFEST_FILE),
            "id = \"good\"\nexec = \"run.sh\"\nskill_ids = [\"chat\"]\n",
        )
        .unwrap();
        std::fs::write(bad.join(MANIFEST_FILE), "id = \"bad\"\n").unwrap();

        let registry = ManifestRegistry::scan(&[root.path()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.manifest("good").unwrap().home, good);
        assert_eq!(registry.app_id_for_skill("chat").as_deref(), Some("good"));
    }

    #[test]
    fn scan_tolerates_missing_root() {
        let registry = ManifestRegistry::scan(&["/nonexistent/yoda-vui/apps"]);
        assert!(registry.is_empty());
    }
}
