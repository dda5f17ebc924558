//! App identity, manifests, and manifest lookup.

pub mod loader;
pub mod manifest;

pub use loader::{AppLoader, ManifestRegistry};
pub use manifest::{AppManifest, AppType, LaunchOptions};
