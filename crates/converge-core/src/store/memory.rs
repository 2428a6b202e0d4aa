use dashmap::DashSet;
use serde_json::Value;
use strum::IntoEnumIterator;
use tokio::sync::watch;

use super::collection::StateCollection;
use super::{ConfigStore, ObservedState};
use crate::error::CoreError;
use crate::model::Capability;
use crate::resource::ManagedResource;

/// In-process [`ConfigStore`].
///
/// Records are held as JSON so one store serves every resource kind.
/// Observed-state changes bump a version counter that callers can watch.
pub struct MemoryStore {
    desired: StateCollection<Value>,
    observed: StateCollection<Value>,
    capabilities: DashSet<Capability>,
}

impl MemoryStore {
    /// A store whose environment supports every capability.
    pub fn new() -> Self {
        Self::with_capabilities(Capability::iter())
    }

    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            desired: StateCollection::new(),
            observed: StateCollection::new(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn set_desired<R: ManagedResource>(&self, id: &str, desired: &R) -> Result<(), CoreError> {
        let key = StateCollection::<Value>::key(R::DESCRIPTOR.kind, id);
        self.desired.upsert(key, serde_json::to_value(desired)?);
        Ok(())
    }

    pub fn remove_desired<R: ManagedResource>(&self, id: &str) {
        self.desired
            .remove(&StateCollection::<Value>::key(R::DESCRIPTOR.kind, id));
    }

    pub fn grant(&self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        self.capabilities.remove(&capability);
    }

    /// Ids with observed state for `R`, sorted.
    pub fn observed_ids<R: ManagedResource>(&self) -> Vec<String> {
        self.observed.ids(R::DESCRIPTOR.kind)
    }

    pub fn observed_len(&self) -> usize {
        self.observed.len()
    }

    /// Watch observed-state changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.observed.subscribe_version()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryStore {
    fn desired<R: ManagedResource>(&self, id: &str) -> Result<Option<R>, CoreError> {
        self.desired
            .get(&StateCollection::<Value>::key(R::DESCRIPTOR.kind, id))
            .map(|v| serde_json::from_value(Value::clone(&v)))
            .transpose()
            .map_err(CoreError::from)
    }

    fn observed<R: ManagedResource>(
        &self,
        id: &str,
    ) -> Result<Option<ObservedState<R>>, CoreError> {
        self.observed
            .get(&StateCollection::<Value>::key(R::DESCRIPTOR.kind, id))
            .map(|v| serde_json::from_value(Value::clone(&v)))
            .transpose()
            .map_err(CoreError::from)
    }

    fn persist<R: ManagedResource>(&self, state: &ObservedState<R>) -> Result<(), CoreError> {
        let key = StateCollection::<Value>::key(R::DESCRIPTOR.kind, &state.id);
        self.observed.upsert(key, serde_json::to_value(state)?);
        Ok(())
    }

    fn forget<R: ManagedResource>(&self, id: &str) -> Result<(), CoreError> {
        self.observed
            .remove(&StateCollection::<Value>::key(R::DESCRIPTOR.kind, id));
        Ok(())
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Attr, NodePoolConfig};

    fn observed(id: &str) -> ObservedState<NodePoolConfig> {
        ObservedState {
            id: id.into(),
            status: "ACTIVE".into(),
            config: NodePoolConfig::new("c-1", "pool-a", "g2", 3),
            auto_selected: ["availability_zones".to_owned()].into_iter().collect(),
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn observed_state_round_trips() {
        let store = MemoryStore::new();
        let state = observed("c-1/pool-a");
        store.persist(&state).unwrap();

        let back: ObservedState<NodePoolConfig> = store.observed("c-1/pool-a").unwrap().unwrap();
        assert_eq!(back, state);
        assert_eq!(store.observed_ids::<NodePoolConfig>(), vec!["c-1/pool-a"]);
    }

    #[test]
    fn forget_drops_observed_state() {
        let store = MemoryStore::new();
        let rx = store.subscribe();
        store.persist(&observed("c-1/pool-a")).unwrap();
        store.forget::<NodePoolConfig>("c-1/pool-a").unwrap();

        assert!(
            store
                .observed::<NodePoolConfig>("c-1/pool-a")
                .unwrap()
                .is_none()
        );
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn desired_state_is_typed_per_kind() {
        let store = MemoryStore::new();
        let mut pool = NodePoolConfig::new("c-1", "pool-a", "g2", 3);
        pool.availability_zones = Attr::Known(vec!["fra1-a".into()]);
        store.set_desired("c-1/pool-a", &pool).unwrap();

        let back: NodePoolConfig = store.desired("c-1/pool-a").unwrap().unwrap();
        assert_eq!(back, pool);
        assert!(
            store
                .desired::<crate::model::BucketConfig>("c-1/pool-a")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn capabilities_can_be_restricted() {
        let store = MemoryStore::with_capabilities([Capability::AuditLog]);
        assert!(store.supports(Capability::AuditLog));
        assert!(!store.supports(Capability::Oidc));
        store.grant(Capability::Oidc);
        assert!(store.supports(Capability::Oidc));
        store.revoke(Capability::AuditLog);
        assert!(!store.supports(Capability::AuditLog));
    }
}
