//! Webhook configuration
//!
//! The label key, annotation key, and ignored namespaces are injectable so the
//! same binary can be deployed under a different domain. Every field defaults
//! to the well-known values, so an empty file is a valid configuration.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, DEFAULT_ENABLED_LABEL, DEFAULT_PATHS_ANNOTATION};

/// Namespaces that are never mutated unless configured otherwise
pub const DEFAULT_IGNORED_NAMESPACES: &[&str] = &["kube-system", "kube-public"];

/// Keys and namespaces the resolver consults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ProtectionConfig {
    /// Label that opts an object in; its value must parse as a boolean
    pub enabled_label: String,
    /// Annotation holding the comma separated list of protected paths
    pub paths_annotation: String,
    /// Namespaces whose objects are always left alone
    pub ignored_namespaces: BTreeSet<String>,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            enabled_label: DEFAULT_ENABLED_LABEL.to_string(),
            paths_annotation: DEFAULT_PATHS_ANNOTATION.to_string(),
            ignored_namespaces: DEFAULT_IGNORED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
        }
    }
}

impl ProtectionConfig {
    /// Parse a YAML configuration document
    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        // serde_yaml maps an empty document to unit, not to an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Reject configurations that could never match an object
    pub fn validate(&self) -> crate::Result<()> {
        if self.enabled_label.trim().is_empty() {
            return Err(Error::config("enabledLabel must not be empty"));
        }
        if self.paths_annotation.trim().is_empty() {
            return Err(Error::config("pathsAnnotation must not be empty"));
        }
        Ok(())
    }
}
