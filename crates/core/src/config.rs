//! TOML configuration for grove.
//!
//! Every field has a default, so a missing `grove.toml` is not an error and
//! an empty file behaves like no file at all.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;

/// Tool configuration, loaded from `grove.toml` in the working-tree root (or
/// any explicit path).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroveConfig {
    /// Name of the manifest file inside the working tree.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Namespace prefix for checkpoint marker labels.
    #[serde(default = "default_tag_namespace")]
    pub tag_namespace: String,

    /// Remote used by push and pull.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_manifest_file() -> String {
    "Grovefile".into()
}
fn default_tag_namespace() -> String {
    "grove".into()
}
fn default_remote() -> String {
    "origin".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
            tag_namespace: default_tag_namespace(),
            remote: default_remote(),
            log_level: default_log_level(),
        }
    }
}

impl GroveConfig {
    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load `grove.toml` from the working-tree root, falling back to
    /// defaults when the file does not exist.
    pub fn load_or_default(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join("grove.toml");
        match Self::load(&path) {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::FileNotFound(_)) => {
                debug!(root = %root.display(), "no grove.toml, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GroveConfig::default();
        assert_eq!(cfg.manifest_file, "Grovefile");
        assert_eq!(cfg.tag_namespace, "grove");
        assert_eq!(cfg.remote, "origin");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.toml");
        std::fs::write(&path, "remote = \"upstream\"\n").unwrap();
        let cfg = GroveConfig::load(&path).unwrap();
        assert_eq!(cfg.remote, "upstream");
        assert_eq!(cfg.manifest_file, "Grovefile");
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GroveConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(cfg, GroveConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.toml");
        std::fs::write(&path, "remote = [broken\n").unwrap();
        assert!(matches!(
            GroveConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
