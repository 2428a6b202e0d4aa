//! Reconciliation engine between declared configuration and remote,
//! eventually-consistent infrastructure resources.
//!
//! - **[`Orchestrator`]**: Cheap-clone handle over a [`RemoteApi`] client,
//!   a [`ConfigStore`], and [`EngineConfig`]. `apply` / `reconcile` /
//!   `refresh` / `destroy` drive one resource at a time through
//!   capability pre-flight, planning, and mutation.
//!
//! - **[`Reconciliation`]**: The one polling state machine: refresh until
//!   the status reaches a target set, tolerating a pending set, bounded by
//!   a timeout and a cancellation token.
//!
//! - **[`plan`]**: Attribute-level diff of desired vs. observed records
//!   into a [`ChangeSet`] grouped by [`SubResource`] and classified as
//!   patchable or replace-forcing.
//!
//! - **[`convert`]**: Expansion of typed records into nested wire payloads
//!   and flattening of remote entities back into records, with unordered
//!   collections held in hash-identified [`RecordSet`]s.
//!
//! - **Domain model** ([`model`]): Per-kind configuration records and the
//!   [`CompositeId`] codec for multi-key identities.
//!
//! [`RemoteApi`]: converge_api::RemoteApi

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod poller;
pub mod resource;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{EngineConfig, OperationClass, OperationTimeouts};
pub use error::CoreError;
pub use orchestrator::{Orchestrator, Step};
pub use plan::{ChangeSet, MutationKind, SubResource};
pub use poller::{ABSENT, Observation, Reconciliation, WaitError, absent_on_not_found};
pub use resource::{IdentityShape, ManagedResource, ResourceDescriptor};
pub use store::{ConfigStore, MemoryStore, ObservedState};

pub use model::{
    AccessEntry, AclAction, Algorithm, Attr, Autoscaling, BucketConfig, Capability, ClusterAcl,
    ClusterConfig, CompositeId, IpAclEntry, Label, LoadBalancerConfig, NodePoolConfig,
    OidcConfig, RecordSet, StructuralHash, Taint, TaintEffect,
};
