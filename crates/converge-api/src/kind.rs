// ── Resource kind markers ──
//
// Zero-sized types that tie a resource kind to its wire shapes and URL
// layout. The engine is generic over these; the client only needs the
// associated types to (de)serialize.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types;

/// Wire-level description of one resource kind.
pub trait ResourceKind: Send + Sync + 'static {
    /// Short name used in logs and error messages.
    const KIND: &'static str;

    /// Response body of `get`/`create`/`update`/`list`.
    type Entity: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static;
    /// Body of the `create` call.
    type Create: Serialize + Debug + Send + Sync;
    /// Body of the `update` call. Unset fields must be omitted.
    type Patch: Serialize + Debug + Default + Send + Sync;

    /// Path of the collection, given the parent keys of the identity.
    fn collection_path(parents: &[&str]) -> String;

    /// Path of a single item, given all identity parts.
    fn item_path(parts: &[&str]) -> String {
        match parts.split_last() {
            Some((last, parents)) => format!("{}/{last}", Self::collection_path(parents)),
            None => Self::collection_path(&[]),
        }
    }
}

fn parent<'a>(parents: &[&'a str], idx: usize) -> &'a str {
    parents.get(idx).copied().unwrap_or_default()
}

/// Managed Kubernetes clusters, addressed by server-assigned id.
#[derive(Debug, Clone, Copy)]
pub struct Clusters;

impl ResourceKind for Clusters {
    const KIND: &'static str = "cluster";
    type Entity = types::ClusterResponse;
    type Create = types::ClusterCreateRequest;
    type Patch = types::ClusterPatch;

    fn collection_path(_parents: &[&str]) -> String {
        "v1/clusters".into()
    }
}

/// Node pools, addressed by `(cluster id, pool name)`.
#[derive(Debug, Clone, Copy)]
pub struct NodePools;

impl ResourceKind for NodePools {
    const KIND: &'static str = "node_pool";
    type Entity = types::NodePoolResponse;
    type Create = types::NodePoolCreateRequest;
    type Patch = types::NodePoolPatch;

    fn collection_path(parents: &[&str]) -> String {
        format!("v1/clusters/{}/node-pools", parent(parents, 0))
    }
}

/// Load balancers, addressed by server-assigned id.
#[derive(Debug, Clone, Copy)]
pub struct LoadBalancers;

impl ResourceKind for LoadBalancers {
    const KIND: &'static str = "load_balancer";
    type Entity = types::LoadBalancerResponse;
    type Create = types::LoadBalancerCreateRequest;
    type Patch = types::LoadBalancerPatch;

    fn collection_path(_parents: &[&str]) -> String {
        "v1/load-balancers".into()
    }
}

/// Object storage buckets, addressed by `(region, bucket name)`.
#[derive(Debug, Clone, Copy)]
pub struct Buckets;

impl ResourceKind for Buckets {
    const KIND: &'static str = "bucket";
    type Entity = types::BucketResponse;
    type Create = types::BucketCreateRequest;
    type Patch = types::BucketPatch;

    fn collection_path(parents: &[&str]) -> String {
        format!("v1/regions/{}/buckets", parent(parents, 0))
    }
}
