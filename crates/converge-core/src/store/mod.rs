// ── Configuration store ──
//
// Where desired and observed state live between applies. The engine only
// talks to the `ConfigStore` trait; `MemoryStore` is the in-process
// implementation.

mod collection;
mod memory;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::Capability;
use crate::resource::ManagedResource;

pub use memory::MemoryStore;

/// Flattened snapshot of a remote resource as last read.
///
/// Replaced wholesale on every refresh, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState<C> {
    pub id: String,
    pub status: String,
    pub config: C,
    /// Sequence attributes whose contents the server chose.
    #[serde(default)]
    pub auto_selected: BTreeSet<String>,
    pub refreshed_at: DateTime<Utc>,
}

/// Persistence and environment queries the engine needs.
///
/// Implementations must tolerate concurrent calls for different ids.
pub trait ConfigStore: Send + Sync {
    fn desired<R: ManagedResource>(&self, id: &str) -> Result<Option<R>, CoreError>;

    fn observed<R: ManagedResource>(&self, id: &str)
    -> Result<Option<ObservedState<R>>, CoreError>;

    fn persist<R: ManagedResource>(&self, state: &ObservedState<R>) -> Result<(), CoreError>;

    /// Drop observed state, e.g. after the remote resource is deleted.
    fn forget<R: ManagedResource>(&self, id: &str) -> Result<(), CoreError>;

    /// Whether the target environment offers a gated feature.
    fn supports(&self, capability: Capability) -> bool;
}
