//! Eligibility checks and protected path extraction
//!
//! An object opts in through the enabling label and lists the paths it wants
//! protected in the paths annotation:
//!
//! ```yaml
//! metadata:
//!   labels:
//!     path-protector.wish.com/enabled: "true"
//!   annotations:
//!     path-protector.wish.com/paths: /spec/replicas, /metadata/labels/tier
//! ```
//!
//! The label is used rather than an annotation so the webhook configuration can
//! narrow traffic with an `objectSelector`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ProtectionConfig;

/// Metadata subset of the incoming object the resolver needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Namespace of the object (empty for cluster-scoped objects)
    pub namespace: String,
    /// Name of the object (may be empty when `generateName` is used)
    pub name: String,
    /// Object labels
    pub labels: BTreeMap<String, String>,
    /// Object annotations
    pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ObjectWithMeta {
    #[serde(default)]
    metadata: ObjectMeta,
}

impl ObjectMetadata {
    /// Decode only the `metadata` block of a raw object
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let object: ObjectWithMeta = serde_json::from_slice(raw)?;
        Ok(Self::from(object.metadata))
    }
}

impl From<ObjectMeta> for ObjectMetadata {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.unwrap_or_default(),
            name: meta.name.unwrap_or_default(),
            labels: meta.labels.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
        }
    }
}

/// Why an object was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The object lives in a platform namespace
    IgnoredNamespace,
    /// The enabling label is not set
    NoLabel,
    /// The enabling label is explicitly false
    LabelDisabled,
}

impl SkipReason {
    /// Short description used in log events
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::IgnoredNamespace => "ignored namespace",
            SkipReason::NoLabel => "enabling label not set",
            SkipReason::LabelDisabled => "enabling label disabled",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// The object is not subject to protection
    Skipped(SkipReason),
    /// The object opted in; protect these paths in order (possibly none)
    Eligible(Vec<String>),
}

/// The enabling label value is not a boolean
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parsing {value:?}: invalid boolean syntax")]
pub struct ParseBoolError {
    /// The rejected input
    pub value: String,
}

/// Hard failures while resolving eligibility
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The enabling label is present but unparseable
    #[error("malformed label {label}: {source}")]
    MalformedLabel {
        /// Label key that failed to parse
        label: String,
        /// Underlying parse error
        #[source]
        source: ParseBoolError,
    },
}

/// Parse a label value as a boolean
///
/// Accepts `1`, `t`, `T`, `TRUE`, `true`, `True` and `0`, `f`, `F`, `FALSE`,
/// `false`, `False`. Surrounding whitespace and other spellings are rejected.
pub fn parse_bool(value: &str) -> Result<bool, ParseBoolError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ParseBoolError {
            value: value.to_string(),
        }),
    }
}

/// Split a paths annotation into protected paths
///
/// Entries are comma separated and trimmed. Order is preserved and empty
/// entries are kept.
pub fn split_paths(annotation: &str) -> Vec<String> {
    annotation
        .split(',')
        .map(|path| path.trim().to_string())
        .collect()
}

/// Decide whether `metadata` is eligible for protection and which paths apply
///
/// Checks run in order and the first match wins: ignored namespace, missing
/// label, malformed label, disabled label, then the paths annotation.
pub fn resolve(
    config: &ProtectionConfig,
    metadata: &ObjectMetadata,
) -> Result<Eligibility, ResolveError> {
    if config.ignored_namespaces.contains(&metadata.namespace) {
        return Ok(Eligibility::Skipped(SkipReason::IgnoredNamespace));
    }

    let Some(value) = metadata.labels.get(&config.enabled_label) else {
        return Ok(Eligibility::Skipped(SkipReason::NoLabel));
    };

    let enabled = parse_bool(value).map_err(|source| ResolveError::MalformedLabel {
        label: config.enabled_label.clone(),
        source,
    })?;
    if !enabled {
        return Ok(Eligibility::Skipped(SkipReason::LabelDisabled));
    }

    let paths = metadata
        .annotations
        .get(&config.paths_annotation)
        .map(|annotation| split_paths(annotation))
        .unwrap_or_default();

    Ok(Eligibility::Eligible(paths))
}
