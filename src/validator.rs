//! Pluggable validator interface.
//!
//! Schema validation is explicitly out of scope for this crate (spec.md
//! §1); this is only the seam external collaborators plug a validator into.
//! Invoked on the candidate root before it is committed; rejection aborts
//! the mutation with `ValidationFailed` (spec.md §6, §7).

use serde_json::Value;

pub trait Validator: Send + Sync {
    /// Returns a list of human-readable issues. An empty list means the
    /// candidate root is accepted.
    fn validate(&self, candidate_root: &Value) -> Vec<String>;
}

/// The default validator used when none is configured: always accepts.
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _candidate_root: &Value) -> Vec<String> {
        Vec::new()
    }
}
