// ── Managed resource kinds ──
//
// Everything the engine needs to know about one resource kind: its wire
// marker, identity shape, status vocabulary, diff rules, and the mapping
// between its configuration record and wire payloads.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use converge_api::types::{BucketResponse, ClusterResponse, LoadBalancerResponse, NodePoolResponse};
use converge_api::{Buckets, Clusters, LoadBalancers, NodePools, ResourceKind};

use crate::config::OperationClass;
use crate::convert;
use crate::error::CoreError;
use crate::model::{
    BucketConfig, Capability, ClusterConfig, CompositeId, LoadBalancerConfig, NodePoolConfig,
};
use crate::plan::{AttributeRule, Policy, SubResource};
use crate::poller::ABSENT;

// ── Descriptor ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityShape {
    /// One server-assigned or natural key.
    Single,
    /// Several natural keys joined by the identity separator.
    Composite(usize),
}

impl IdentityShape {
    pub const fn arity(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Composite(n) => n,
        }
    }
}

/// Statuses tolerated while waiting, and statuses that end the wait.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct StatusVocabulary {
    pub create: Transition,
    pub update: Transition,
    pub delete: Transition,
}

impl StatusVocabulary {
    pub fn for_class(&self, class: OperationClass) -> Transition {
        match class {
            OperationClass::Create => self.create,
            OperationClass::Update => self.update,
            OperationClass::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor {
    pub kind: &'static str,
    pub identity: IdentityShape,
    pub statuses: StatusVocabulary,
}

// ── ManagedResource ────────────────────────────────────────────────

/// A configuration record the orchestrator can create, patch, and delete.
///
/// Implemented by the desired-state record itself; its flattened form
/// doubles as the observed configuration.
pub trait ManagedResource:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    type Kind: ResourceKind;

    const DESCRIPTOR: ResourceDescriptor;
    const RULES: &'static [AttributeRule];

    /// Identity the record will have once created, when it is made of
    /// natural keys. `None` for server-assigned ids.
    fn natural_id(&self) -> Option<CompositeId>;

    fn identity_of(entity: &<Self::Kind as ResourceKind>::Entity) -> CompositeId;

    fn status_of(entity: &<Self::Kind as ResourceKind>::Entity) -> &str;

    /// Parent keys of the collection this record is created in.
    fn parents(&self) -> Vec<&str>;

    fn expand_create(&self) -> <Self::Kind as ResourceKind>::Create;

    /// Patch body for one sub-resource group; `None` when the kind has no
    /// such group.
    fn expand_patch(&self, group: SubResource) -> Option<<Self::Kind as ResourceKind>::Patch>;

    fn flatten(entity: <Self::Kind as ResourceKind>::Entity) -> Self;

    /// Gated features this record uses.
    fn required_capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Human label for logs and errors before an id exists.
    fn display_name(&self) -> String;

    fn parse_id(id: &str) -> Result<CompositeId, CoreError> {
        CompositeId::parse(id, Self::DESCRIPTOR.identity.arity())
    }
}

const DELETE: Transition = Transition {
    pending: &["DELETING"],
    target: &[ABSENT],
};

// ── Clusters ───────────────────────────────────────────────────────

impl ManagedResource for ClusterConfig {
    type Kind = Clusters;

    const DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
        kind: Clusters::KIND,
        identity: IdentityShape::Single,
        statuses: StatusVocabulary {
            create: Transition {
                pending: &["CREATING", "WORKING"],
                target: &["RUNNING", "NO_NODE"],
            },
            update: Transition {
                pending: &["WORKING", "UPDATING"],
                target: &["RUNNING", "NO_NODE"],
            },
            delete: DELETE,
        },
    };

    const RULES: &'static [AttributeRule] = &[
        AttributeRule::replace("name"),
        AttributeRule::replace("region"),
        AttributeRule::replace("network_id"),
        AttributeRule::scalar("version", Policy::InPlacePatchable, SubResource::VersionUpgrade),
        AttributeRule::scalar(
            "audit_log_enabled",
            Policy::InPlacePatchable,
            SubResource::AuditLog,
        ),
        AttributeRule::scalar("oidc", Policy::InPlacePatchable, SubResource::Oidc),
        AttributeRule::scalar("acl.enabled", Policy::InPlacePatchable, SubResource::AccessControl),
        AttributeRule::set("acl.entries", SubResource::AccessControl),
        AttributeRule::computed("endpoint"),
    ];

    fn natural_id(&self) -> Option<CompositeId> {
        None
    }

    fn identity_of(entity: &ClusterResponse) -> CompositeId {
        CompositeId::single(entity.id.clone())
    }

    fn status_of(entity: &ClusterResponse) -> &str {
        &entity.status
    }

    fn parents(&self) -> Vec<&str> {
        Vec::new()
    }

    fn expand_create(&self) -> converge_api::types::ClusterCreateRequest {
        convert::cluster_create(self)
    }

    fn expand_patch(&self, group: SubResource) -> Option<converge_api::types::ClusterPatch> {
        convert::cluster_patch(self, group)
    }

    fn flatten(entity: ClusterResponse) -> Self {
        entity.into()
    }

    fn required_capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.oidc.is_some() {
            caps.push(Capability::Oidc);
        }
        if self.audit_log_enabled == Some(true) {
            caps.push(Capability::AuditLog);
        }
        if self.acl.as_ref().is_some_and(|a| a.enabled) {
            caps.push(Capability::IpAcl);
        }
        if self.network_id.is_some() {
            caps.push(Capability::PrivateNetwork);
        }
        caps
    }

    fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.region)
    }
}

// ── Node pools ─────────────────────────────────────────────────────

impl ManagedResource for NodePoolConfig {
    type Kind = NodePools;

    const DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
        kind: NodePools::KIND,
        identity: IdentityShape::Composite(2),
        statuses: StatusVocabulary {
            create: Transition {
                pending: &["CREATING", "SCALING"],
                target: &["ACTIVE"],
            },
            update: Transition {
                pending: &["UPDATING", "SCALING"],
                target: &["ACTIVE"],
            },
            delete: DELETE,
        },
    };

    const RULES: &'static [AttributeRule] = &[
        AttributeRule::replace("cluster_id"),
        AttributeRule::replace("name"),
        AttributeRule::replace("flavor"),
        AttributeRule::scalar("node_count", Policy::InPlacePatchable, SubResource::Scaling),
        AttributeRule::scalar("autoscaling", Policy::InPlacePatchable, SubResource::Autoscaling),
        AttributeRule::set("labels", SubResource::Labels),
        AttributeRule::set("taints", SubResource::Taints),
        AttributeRule::sequence("availability_zones", true, SubResource::NetworkAttachment),
    ];

    fn natural_id(&self) -> Option<CompositeId> {
        Some(CompositeId::new([self.cluster_id.as_str(), self.name.as_str()]))
    }

    fn identity_of(entity: &NodePoolResponse) -> CompositeId {
        CompositeId::new([entity.cluster_id.as_str(), entity.name.as_str()])
    }

    fn status_of(entity: &NodePoolResponse) -> &str {
        &entity.status
    }

    fn parents(&self) -> Vec<&str> {
        vec![self.cluster_id.as_str()]
    }

    fn expand_create(&self) -> converge_api::types::NodePoolCreateRequest {
        convert::node_pool_create(self)
    }

    fn expand_patch(&self, group: SubResource) -> Option<converge_api::types::NodePoolPatch> {
        convert::node_pool_patch(self, group)
    }

    fn flatten(entity: NodePoolResponse) -> Self {
        entity.into()
    }

    fn required_capabilities(&self) -> Vec<Capability> {
        if self.autoscaling.is_some() {
            vec![Capability::Autoscaling]
        } else {
            Vec::new()
        }
    }

    fn display_name(&self) -> String {
        format!("{}/{}", self.cluster_id, self.name)
    }
}

// ── Load balancers ─────────────────────────────────────────────────

impl ManagedResource for LoadBalancerConfig {
    type Kind = LoadBalancers;

    const DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
        kind: LoadBalancers::KIND,
        identity: IdentityShape::Single,
        statuses: StatusVocabulary {
            create: Transition {
                pending: &["PROVISIONING"],
                target: &["ACTIVE"],
            },
            update: Transition {
                pending: &["UPDATING"],
                target: &["ACTIVE"],
            },
            delete: DELETE,
        },
    };

    const RULES: &'static [AttributeRule] = &[
        AttributeRule::replace("region"),
        AttributeRule::scalar("name", Policy::InPlacePatchable, SubResource::Attributes),
        AttributeRule::scalar("algorithm", Policy::InPlacePatchable, SubResource::Attributes),
        AttributeRule::sequence("subnets", true, SubResource::NetworkAttachment),
        AttributeRule::computed("public_ip"),
    ];

    fn natural_id(&self) -> Option<CompositeId> {
        None
    }

    fn identity_of(entity: &LoadBalancerResponse) -> CompositeId {
        CompositeId::single(entity.id.clone())
    }

    fn status_of(entity: &LoadBalancerResponse) -> &str {
        &entity.status
    }

    fn parents(&self) -> Vec<&str> {
        Vec::new()
    }

    fn expand_create(&self) -> converge_api::types::LoadBalancerCreateRequest {
        convert::load_balancer_create(self)
    }

    fn expand_patch(&self, group: SubResource) -> Option<converge_api::types::LoadBalancerPatch> {
        convert::load_balancer_patch(self, group)
    }

    fn flatten(entity: LoadBalancerResponse) -> Self {
        entity.into()
    }

    fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.region)
    }
}

// ── Buckets ────────────────────────────────────────────────────────

impl ManagedResource for BucketConfig {
    type Kind = Buckets;

    const DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
        kind: Buckets::KIND,
        identity: IdentityShape::Composite(2),
        statuses: StatusVocabulary {
            create: Transition {
                pending: &["CREATING"],
                target: &["READY"],
            },
            update: Transition {
                pending: &["UPDATING"],
                target: &["READY"],
            },
            delete: DELETE,
        },
    };

    const RULES: &'static [AttributeRule] = &[
        AttributeRule::replace("region"),
        AttributeRule::replace("name"),
        AttributeRule::scalar("versioning", Policy::InPlacePatchable, SubResource::Attributes),
        AttributeRule::set("access_entries", SubResource::AccessEntries),
    ];

    fn natural_id(&self) -> Option<CompositeId> {
        Some(CompositeId::new([self.region.as_str(), self.name.as_str()]))
    }

    fn identity_of(entity: &BucketResponse) -> CompositeId {
        CompositeId::new([entity.region.as_str(), entity.name.as_str()])
    }

    fn status_of(entity: &BucketResponse) -> &str {
        &entity.status
    }

    fn parents(&self) -> Vec<&str> {
        vec![self.region.as_str()]
    }

    fn expand_create(&self) -> converge_api::types::BucketCreateRequest {
        convert::bucket_create(self)
    }

    fn expand_patch(&self, group: SubResource) -> Option<converge_api::types::BucketPatch> {
        convert::bucket_patch(self, group)
    }

    fn flatten(entity: BucketResponse) -> Self {
        entity.into()
    }

    fn required_capabilities(&self) -> Vec<Capability> {
        if self.versioning == Some(true) {
            vec![Capability::BucketVersioning]
        } else {
            Vec::new()
        }
    }

    fn display_name(&self) -> String {
        format!("{}/{}", self.region, self.name)
    }
}
