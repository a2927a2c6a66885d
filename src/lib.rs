//! path-protector - keep controller-managed fields from being clobbered by apply
//!
//! A mutating admission webhook: objects labelled with [`DEFAULT_ENABLED_LABEL`]
//! list paths in [`DEFAULT_PATHS_ANNOTATION`], and on every update the webhook
//! patches those paths back to their stored values. This lets an autoscaler own
//! `/spec/replicas` while CI keeps applying a manifest that also sets it.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod protect;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label that opts an object into path protection
pub const DEFAULT_ENABLED_LABEL: &str = "path-protector.wish.com/enabled";

/// Annotation listing the protected paths, comma separated
pub const DEFAULT_PATHS_ANNOTATION: &str = "path-protector.wish.com/paths";

/// Default port for the webhook HTTPS server
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;
