//! Field protection for apply-managed objects
//!
//! Given an admission request for a create or update, decide whether the object
//! opted into protection and build the JSON patch that puts every protected
//! path back to its prior value. Everything here is a pure function of the
//! request bytes and the [`ProtectionConfig`]; there is no I/O and no shared
//! state, so requests can be processed fully in parallel.
//!
//! Failures are reported as [`MutationOutcome::Rejected`]. The webhook turns
//! that into an allowed response carrying the message: this hook must never
//! block unrelated cluster operations because of its own errors.

pub mod patch;
pub mod record;
pub mod resolver;

use json_patch::PatchOperation;
use tracing::{debug, info, warn};

use crate::config::ProtectionConfig;

pub use patch::diff_path;
pub use record::Record;
pub use resolver::{resolve, Eligibility, ObjectMetadata, ResolveError, SkipReason};

/// Input to a single mutation decision
#[derive(Debug, Clone, Default)]
pub struct ProtectionRequest {
    /// Correlation id copied into the response
    pub uid: String,
    /// Kind of the object, e.g. `apps/v1/Deployment`
    pub kind: String,
    /// Admission operation (`CREATE`, `UPDATE`)
    pub operation: String,
    /// Raw JSON of the incoming object
    pub object: Vec<u8>,
    /// Raw JSON of the stored object; absent on create
    pub old_object: Option<Vec<u8>>,
}

/// Result of a mutation decision
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Admit with these patches applied, in order (possibly none)
    Allowed(Vec<PatchOperation>),
    /// The request could not be processed; the message explains why
    Rejected(String),
}

impl MutationOutcome {
    /// Allowed with nothing to change
    pub fn unchanged() -> Self {
        Self::Allowed(Vec::new())
    }

    /// Patches to apply; empty for rejected outcomes
    pub fn patches(&self) -> &[PatchOperation] {
        match self {
            Self::Allowed(patches) => patches,
            Self::Rejected(_) => &[],
        }
    }
}

/// Build the patches that restore protected paths on `request`
pub fn mutate(config: &ProtectionConfig, request: &ProtectionRequest) -> MutationOutcome {
    let uid = request.uid.as_str();

    let metadata = match ObjectMetadata::from_slice(&request.object) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(uid, error = %e, "Could not decode object metadata");
            return MutationOutcome::Rejected(e.to_string());
        }
    };

    debug!(
        uid,
        kind = %request.kind,
        operation = %request.operation,
        namespace = %metadata.namespace,
        name = %metadata.name,
        "Evaluating object for path protection"
    );

    let paths = match resolve(config, &metadata) {
        Ok(Eligibility::Eligible(paths)) => paths,
        Ok(Eligibility::Skipped(reason)) => {
            debug!(
                uid,
                namespace = %metadata.namespace,
                name = %metadata.name,
                %reason,
                "Skipping mutation"
            );
            return MutationOutcome::unchanged();
        }
        Err(e) => {
            warn!(
                uid,
                namespace = %metadata.namespace,
                name = %metadata.name,
                error = %e,
                "Skipping mutation due to error"
            );
            return MutationOutcome::Rejected(e.to_string());
        }
    };

    if paths.is_empty() {
        debug!(
            uid,
            namespace = %metadata.namespace,
            name = %metadata.name,
            "Skipping mutation because no paths are defined"
        );
        return MutationOutcome::unchanged();
    }

    if paths.iter().any(String::is_empty) {
        warn!(
            uid,
            namespace = %metadata.namespace,
            name = %metadata.name,
            "Paths annotation contains an empty entry, it will never match"
        );
    }

    let old = match request.old_object.as_deref() {
        Some(raw) => match Record::from_slice(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(uid, error = %e, "Could not decode old object");
                return MutationOutcome::Rejected(e.to_string());
            }
        },
        None => Record::empty(),
    };

    let new = match Record::from_slice(&request.object) {
        Ok(record) => record,
        Err(e) => {
            warn!(uid, error = %e, "Could not decode object");
            return MutationOutcome::Rejected(e.to_string());
        }
    };

    let patches: Vec<PatchOperation> = paths
        .iter()
        .filter_map(|path| diff_path(path, &old, &new))
        .collect();

    if !patches.is_empty() {
        info!(
            uid,
            namespace = %metadata.namespace,
            name = %metadata.name,
            patch_ops = patches.len(),
            "Restoring protected paths"
        );
    }

    MutationOutcome::Allowed(patches)
}
