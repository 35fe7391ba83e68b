//! External registry clients.
//!
//! Two national registries sit behind this module: the identity registry
//! (document type + number → demographic identity) and the clinical
//! registry (best-effort profile enrichment). Both are black boxes with
//! an HTTP lookup contract; their payloads are kept raw on the profile
//! and accessed through the typed schema in [`payload`].

pub mod identity;
pub mod payload;

pub use identity::{ClinicalRegistry, HttpIdentityRegistry, IdentityRegistry, MockIdentityRegistry};
pub use payload::{walk_payload, PayloadNode, RegistryIdentity, MAX_WALK_DEPTH};

use thiserror::Error;

/// Errors from registry lookups. The cascade resolver downgrades all of
/// these to a not-found outcome; they are still distinguished here for
/// logging.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Cannot reach registry at {0}")]
    Connection(String),
    #[error("Registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Registry response could not be parsed: {0}")]
    Malformed(String),
}
