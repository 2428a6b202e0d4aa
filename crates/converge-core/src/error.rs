// ── Core error types ──
//
// Errors surfaced by the engine. Remote API failures are wrapped rather
// than translated: callers decide what a 409 or a timeout means for them.
// Mutation failures record how far an apply got, since nothing is rolled
// back.

use thiserror::Error;

use crate::model::Capability;
use crate::orchestrator::Step;
use crate::plan::SubResource;
use crate::poller::WaitError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Reconciliation ───────────────────────────────────────────────
    #[error("{kind} {id}: {source}")]
    Wait {
        kind: &'static str,
        id: String,
        #[source]
        source: WaitError,
    },

    // ── Identity ─────────────────────────────────────────────────────
    #[error("Malformed identity {id:?}: {reason}")]
    MalformedIdentity { id: String, reason: String },

    // ── Pre-flight ───────────────────────────────────────────────────
    #[error("{kind} {id} uses {capability}, which this environment does not support")]
    CapabilityDenied {
        capability: Capability,
        kind: &'static str,
        id: String,
    },

    // ── Mutation ─────────────────────────────────────────────────────
    #[error(
        "{kind} {id}: {attempted} failed after {} completed step(s): {source}",
        .completed.len()
    )]
    MutationFailed {
        kind: &'static str,
        id: String,
        attempted: Step,
        completed: Vec<Step>,
        #[source]
        source: Box<CoreError>,
    },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error("API error: {0}")]
    Api(#[from] converge_api::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} has no {group} sub-resource to patch")]
    UnsupportedChange {
        kind: &'static str,
        group: SubResource,
    },
}

impl CoreError {
    /// The wait error behind this error, looking through `MutationFailed`.
    pub fn wait_error(&self) -> Option<&WaitError> {
        match self {
            Self::Wait { source, .. } => Some(source),
            Self::MutationFailed { source, .. } => source.wait_error(),
            _ => None,
        }
    }

    /// The remote API error behind this error, looking through `MutationFailed`.
    pub fn api_error(&self) -> Option<&converge_api::Error> {
        match self {
            Self::Api(e) => Some(e),
            Self::Wait {
                source: WaitError::RefreshFailed(e),
                ..
            } => Some(e),
            Self::MutationFailed { source, .. } => source.api_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_failure_reports_progress() {
        let err = CoreError::MutationFailed {
            kind: "cluster",
            id: "c-1".into(),
            attempted: Step::Patch(SubResource::Oidc),
            completed: vec![
                Step::Patch(SubResource::VersionUpgrade),
                Step::Patch(SubResource::AuditLog),
            ],
            source: Box::new(CoreError::Api(converge_api::Error::Api {
                message: "conflict".into(),
                code: None,
                status: 409,
            })),
        };

        let msg = err.to_string();
        assert!(msg.contains("patch oidc"), "{msg}");
        assert!(msg.contains("2 completed step(s)"), "{msg}");
        assert!(err.api_error().is_some_and(converge_api::Error::is_conflict));
        assert!(err.wait_error().is_none());
    }

    #[test]
    fn capability_denied_names_the_feature() {
        let err = CoreError::CapabilityDenied {
            capability: Capability::Oidc,
            kind: "cluster",
            id: "prod".into(),
        };
        assert_eq!(
            err.to_string(),
            "cluster prod uses oidc, which this environment does not support"
        );
    }

    #[test]
    fn unsupported_change_names_the_group() {
        let err = CoreError::UnsupportedChange {
            kind: "bucket",
            group: SubResource::Taints,
        };
        assert_eq!(err.to_string(), "bucket has no taints sub-resource to patch");
    }
}
