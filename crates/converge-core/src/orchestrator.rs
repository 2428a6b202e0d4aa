// ── Mutation orchestrator ──
//
// Drives one resource from its observed state to its desired state:
// capability pre-flight, plan, then create / replace / per-group update,
// each remote mutation followed by its own wait episode. The first
// failure stops the apply; completed steps stay applied.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use converge_api::{ListFilter, RemoteApi, ResourceKind};

use crate::config::{EngineConfig, OperationClass};
use crate::error::CoreError;
use crate::model::CompositeId;
use crate::plan::{self, SubResource};
use crate::poller::{Observation, Reconciliation, absent_on_not_found};
use crate::resource::ManagedResource;
use crate::store::{ConfigStore, ObservedState};

type Entity<R> = <<R as ManagedResource>::Kind as ResourceKind>::Entity;

/// One remote mutation within an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    Delete,
    Patch(SubResource),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Delete => f.write_str("delete"),
            Self::Patch(group) => write!(f, "patch {group}"),
        }
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Cheaply cloneable handle over the client, store and engine settings.
///
/// Distinct resources may be applied concurrently from clones of the same
/// handle; applying the same resource twice at once is not coordinated.
pub struct Orchestrator<C, S> {
    inner: Arc<OrchestratorInner<C, S>>,
}

struct OrchestratorInner<C, S> {
    client: C,
    store: S,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl<C, S> Clone for Orchestrator<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: RemoteApi, S: ConfigStore> Orchestrator<C, S> {
    pub fn new(client: C, store: S, config: EngineConfig) -> Self {
        Self::with_cancel(client, store, config, CancellationToken::new())
    }

    /// Build with a caller-owned cancellation token. Cancelling it stops
    /// every wait episode started from this handle.
    pub fn with_cancel(client: C, store: S, config: EngineConfig, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                client,
                store,
                config,
                cancel,
            }),
        }
    }

    pub fn client(&self) -> &C {
        &self.inner.client
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Converge the resource identified by `id` onto `desired`.
    ///
    /// Without an id the record's natural identity is used; resources with
    /// server-assigned ids are created. Uses the stored observed state, or
    /// reads it from the remote side when the store has none.
    pub async fn apply<R: ManagedResource>(
        &self,
        id: Option<&str>,
        desired: &R,
    ) -> Result<ObservedState<R>, CoreError> {
        let id = id
            .map(str::to_owned)
            .or_else(|| desired.natural_id().map(|n| n.encode()));
        let label = id.clone().unwrap_or_else(|| desired.display_name());
        self.preflight(&label, desired)?;

        let observed = match id.as_deref() {
            Some(id) => match self.inner.store.observed::<R>(id)? {
                Some(state) => Some(state),
                None => self.refresh::<R>(id).await?,
            },
            None => None,
        };

        self.converge(desired, observed).await
    }

    /// Refresh from the remote side, then apply the stored desired state.
    pub async fn reconcile<R: ManagedResource>(
        &self,
        id: &str,
    ) -> Result<ObservedState<R>, CoreError> {
        let desired: R = self
            .inner
            .store
            .desired(id)?
            .ok_or_else(|| CoreError::NotFound {
                kind: R::DESCRIPTOR.kind,
                id: id.to_owned(),
            })?;
        self.preflight(id, &desired)?;

        let observed = self.refresh::<R>(id).await?;
        self.converge(&desired, observed).await
    }

    /// Re-read one resource and persist what was found. A resource that no
    /// longer exists is forgotten and `None` returned.
    pub async fn refresh<R: ManagedResource>(
        &self,
        id: &str,
    ) -> Result<Option<ObservedState<R>>, CoreError> {
        let rid = R::parse_id(id)?;
        let path = R::Kind::item_path(&rid.as_strs());

        match self.inner.client.get::<R::Kind>(&path).await {
            Ok(entity) => {
                let auto_selected = self
                    .inner
                    .store
                    .observed::<R>(id)?
                    .map(|prev| prev.auto_selected)
                    .unwrap_or_default();
                let state = observed_state::<R>(entity, auto_selected);
                self.inner.store.persist(&state)?;
                debug!(kind = R::DESCRIPTOR.kind, id, status = %state.status, "refreshed");
                Ok(Some(state))
            }
            Err(e) if e.is_not_found() => {
                info!(kind = R::DESCRIPTOR.kind, id, "resource gone, forgetting");
                self.inner.store.forget::<R>(id)?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the resource, wait until it is gone, and forget it.
    pub async fn destroy<R: ManagedResource>(&self, id: &str) -> Result<(), CoreError> {
        let rid = R::parse_id(id)?;
        info!(kind = R::DESCRIPTOR.kind, id, "destroying");

        if let Err(e) = self.delete_and_wait::<R>(&rid).await {
            return Err(failed::<R>(id, Step::Delete, Vec::new(), e));
        }
        self.inner.store.forget::<R>(id)?;
        Ok(())
    }

    /// List existing resources under `parents` and record them as observed.
    pub async fn import_all<R: ManagedResource>(
        &self,
        parents: &[&str],
        filter: &ListFilter,
    ) -> Result<Vec<ObservedState<R>>, CoreError> {
        let collection = R::Kind::collection_path(parents);
        let entities = self
            .inner
            .client
            .list::<R::Kind>(&collection, filter)
            .await?;
        info!(kind = R::DESCRIPTOR.kind, count = entities.len(), "importing");

        entities
            .into_iter()
            .map(|entity| -> Result<ObservedState<R>, CoreError> {
                let state = observed_state::<R>(entity, BTreeSet::new());
                self.inner.store.persist(&state)?;
                Ok(state)
            })
            .collect()
    }

    // ── Apply internals ──────────────────────────────────────────────

    async fn converge<R: ManagedResource>(
        &self,
        desired: &R,
        observed: Option<ObservedState<R>>,
    ) -> Result<ObservedState<R>, CoreError> {
        let Some(observed) = observed else {
            return self.create(desired, Vec::new()).await;
        };

        let kind = R::DESCRIPTOR.kind;
        let rid = R::parse_id(&observed.id)?;
        let changes = plan::plan_for(desired, &observed)?;

        if changes.is_empty() {
            debug!(kind, id = %observed.id, "no changes");
            return Ok(observed);
        }

        if changes.requires_replace() {
            info!(
                kind,
                id = %observed.id,
                causes = ?changes.replace_causes(),
                "replacing resource"
            );
            if let Err(e) = self.delete_and_wait::<R>(&rid).await {
                return Err(failed::<R>(&observed.id, Step::Delete, Vec::new(), e));
            }
            self.inner.store.forget::<R>(&observed.id)?;
            return self.create(desired, vec![Step::Delete]).await;
        }

        let mut completed = Vec::new();
        for group in changes.groups() {
            let step = Step::Patch(group);
            debug!(
                kind,
                id = %observed.id,
                %step,
                paths = ?changes.in_group(group).map(|c| c.path.as_str()).collect::<Vec<_>>(),
                "applying"
            );
            let settled = match self.patch_and_wait(&rid, desired, group).await {
                Ok(observation) => observation,
                Err(e) => return Err(failed::<R>(&observed.id, step, completed, e)),
            };
            completed.push(step);
            if let Some(entity) = settled.entity {
                self.inner
                    .store
                    .persist(&observed_state::<R>(entity, observed.auto_selected.clone()))?;
            }
        }

        info!(kind, id = %observed.id, steps = completed.len(), "updated");
        self.settle(&rid, desired).await
    }

    async fn create<R: ManagedResource>(
        &self,
        desired: &R,
        completed: Vec<Step>,
    ) -> Result<ObservedState<R>, CoreError> {
        let label = desired
            .natural_id()
            .map_or_else(|| desired.display_name(), |n| n.encode());
        let collection = R::Kind::collection_path(&desired.parents());
        let request = desired.expand_create();
        info!(kind = R::DESCRIPTOR.kind, name = %label, "creating");

        let created = match self
            .inner
            .client
            .create::<R::Kind>(&collection, &request)
            .await
        {
            Ok(entity) => entity,
            Err(e) => return Err(failed::<R>(&label, Step::Create, completed, e.into())),
        };

        // Recorded before the wait; a failed wait leaves it in place.
        let rid = R::identity_of(&created);
        let auto_selected = plan::auto_selected(&serde_json::to_value(desired)?, R::RULES);
        self.inner
            .store
            .persist(&observed_state::<R>(created, auto_selected))?;

        if let Err(e) = self.wait_for::<R>(&rid, OperationClass::Create).await {
            return Err(failed::<R>(&rid.encode(), Step::Create, completed, e));
        }

        self.settle(&rid, desired).await
    }

    async fn patch_and_wait<R: ManagedResource>(
        &self,
        rid: &CompositeId,
        desired: &R,
        group: SubResource,
    ) -> Result<Observation<Entity<R>>, CoreError> {
        let path = R::Kind::item_path(&rid.as_strs());
        let patch = desired
            .expand_patch(group)
            .ok_or(CoreError::UnsupportedChange {
                kind: R::DESCRIPTOR.kind,
                group,
            })?;
        self.inner.client.update::<R::Kind>(&path, &patch).await?;
        self.wait_for::<R>(rid, OperationClass::Update).await
    }

    async fn delete_and_wait<R: ManagedResource>(&self, rid: &CompositeId) -> Result<(), CoreError> {
        let path = R::Kind::item_path(&rid.as_strs());
        match self.inner.client.delete::<R::Kind>(&path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(kind = R::DESCRIPTOR.kind, id = %rid, "already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.wait_for::<R>(rid, OperationClass::Delete).await?;
        Ok(())
    }

    /// One wait episode on `rid` with the vocabulary of `class`.
    async fn wait_for<R: ManagedResource>(
        &self,
        rid: &CompositeId,
        class: OperationClass,
    ) -> Result<Observation<Entity<R>>, CoreError> {
        let path = R::Kind::item_path(&rid.as_strs());
        let path = path.as_str();
        let client = &self.inner.client;

        Reconciliation::for_operation(
            &R::DESCRIPTOR,
            class,
            &self.inner.config,
            self.inner.cancel.child_token(),
        )
        .wait(move || async move {
            absent_on_not_found(client.get::<R::Kind>(path).await, R::status_of)
        })
        .await
        .map_err(|source| CoreError::Wait {
            kind: R::DESCRIPTOR.kind,
            id: rid.encode(),
            source,
        })
    }

    /// Final read after a successful mutation, persisted as observed state.
    async fn settle<R: ManagedResource>(
        &self,
        rid: &CompositeId,
        desired: &R,
    ) -> Result<ObservedState<R>, CoreError> {
        let path = R::Kind::item_path(&rid.as_strs());
        let entity = self.inner.client.get::<R::Kind>(&path).await?;
        let auto_selected = plan::auto_selected(&serde_json::to_value(desired)?, R::RULES);

        let state = observed_state::<R>(entity, auto_selected);
        self.inner.store.persist(&state)?;
        Ok(state)
    }

    fn preflight<R: ManagedResource>(&self, label: &str, desired: &R) -> Result<(), CoreError> {
        for capability in desired.required_capabilities() {
            if !self.inner.store.supports(capability) {
                warn!(kind = R::DESCRIPTOR.kind, id = label, %capability, "capability denied");
                return Err(CoreError::CapabilityDenied {
                    capability,
                    kind: R::DESCRIPTOR.kind,
                    id: label.to_owned(),
                });
            }
        }
        Ok(())
    }
}

fn observed_state<R: ManagedResource>(
    entity: Entity<R>,
    auto_selected: BTreeSet<String>,
) -> ObservedState<R> {
    ObservedState {
        id: R::identity_of(&entity).encode(),
        status: R::status_of(&entity).to_owned(),
        config: R::flatten(entity),
        auto_selected,
        refreshed_at: Utc::now(),
    }
}

fn failed<R: ManagedResource>(
    id: &str,
    attempted: Step,
    completed: Vec<Step>,
    source: CoreError,
) -> CoreError {
    warn!(
        kind = R::DESCRIPTOR.kind,
        id,
        %attempted,
        completed = completed.len(),
        error = %source,
        "mutation failed"
    );
    CoreError::MutationFailed {
        kind: R::DESCRIPTOR.kind,
        id: id.to_owned(),
        attempted,
        completed,
        source: Box::new(source),
    }
}
