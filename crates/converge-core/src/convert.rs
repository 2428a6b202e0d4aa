// ── Structural attribute mapping ──
//
// Bridges typed configuration records and the nested wire payloads in
// `converge_api::types`. Expansion emits optional fields only when they
// are set, so an absent field never zeroes a server-side default; the one
// exception is OIDC, where absence must be sent as an explicit
// `{"enabled": false}`. Flattening canonicalizes unordered collections
// into `RecordSet`s so server-side ordering never shows up as drift.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use tracing::warn;

use converge_api::types::{
    AccessGrant, AccessPolicy, AclSettings, AuditLogSettings, AutoscalingSettings,
    BucketCreateRequest, BucketPatch, BucketResponse, ClusterCreateRequest, ClusterPatch,
    ClusterResponse, IpAclRule, LoadBalancerCreateRequest, LoadBalancerPatch,
    LoadBalancerResponse, NodePoolCreateRequest, NodePoolPatch, NodePoolResponse, OidcSettings,
    TaintSpec,
};

use crate::model::{
    AccessEntry, AclAction, Algorithm, Attr, Autoscaling, BucketConfig, ClusterAcl,
    ClusterConfig, IpAclEntry, Label, LoadBalancerConfig, NodePoolConfig, OidcConfig, RecordSet,
    Taint, TaintEffect,
};
use crate::plan::SubResource;

/// Node count sent on create when neither a count nor autoscaling bounds
/// are declared.
const DEFAULT_NODE_COUNT: u32 = 1;

// ── Helpers ────────────────────────────────────────────────────────

/// Wire enums that carry values this version does not know verbatim.
trait WireEnum: FromStr {
    fn unrecognized(raw: String) -> Self;
    fn is_recognized(&self) -> bool;
}

macro_rules! wire_enum {
    ($($ty:ty),*) => {$(
        impl WireEnum for $ty {
            fn unrecognized(raw: String) -> Self {
                Self::Unrecognized(raw)
            }
            fn is_recognized(&self) -> bool {
                !matches!(self, Self::Unrecognized(_))
            }
        }
    )*};
}

wire_enum!(TaintEffect, AclAction, Algorithm);

/// Parse a wire enum. Unknown values are kept so they still differ from
/// every declared value when planning.
fn parse_wire<T: WireEnum>(raw: &str, field: &'static str) -> T {
    let value = raw
        .parse()
        .unwrap_or_else(|_| T::unrecognized(raw.to_owned()));
    if !value.is_recognized() {
        warn!(field, value = raw, "unrecognized value from remote");
    }
    value
}

/// Collections are omitted on create when empty.
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

// ── Records ────────────────────────────────────────────────────────

impl From<&Taint> for TaintSpec {
    fn from(t: &Taint) -> Self {
        Self {
            key: t.key.clone(),
            value: t.value.clone(),
            effect: t.effect.to_string(),
        }
    }
}

impl From<TaintSpec> for Taint {
    fn from(t: TaintSpec) -> Self {
        Self {
            effect: parse_wire(&t.effect, "taint.effect"),
            key: t.key,
            value: t.value,
        }
    }
}

impl From<&IpAclEntry> for IpAclRule {
    fn from(e: &IpAclEntry) -> Self {
        Self {
            action: e.action.to_string(),
            cidr: e.address.clone(),
            description: e.comment.clone(),
        }
    }
}

impl From<IpAclRule> for IpAclEntry {
    fn from(r: IpAclRule) -> Self {
        Self {
            action: parse_wire(&r.action, "acl.action"),
            address: r.cidr,
            comment: r.description,
        }
    }
}

impl From<&AccessEntry> for AccessGrant {
    fn from(e: &AccessEntry) -> Self {
        Self {
            principal: e.entry.clone(),
            groups: e.groups.iter().cloned().collect(),
            policies: e.policies.iter().cloned().collect(),
        }
    }
}

impl From<AccessGrant> for AccessEntry {
    fn from(g: AccessGrant) -> Self {
        Self {
            entry: g.principal,
            groups: g.groups.into_iter().collect::<BTreeSet<_>>(),
            policies: g.policies.into_iter().collect::<BTreeSet<_>>(),
        }
    }
}

/// Labels travel as a nested object keyed by label key.
pub fn labels_to_map(labels: &RecordSet<Label>) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|l| (l.key.clone(), l.value.clone()))
        .collect()
}

pub fn labels_from_map(map: BTreeMap<String, String>) -> RecordSet<Label> {
    map.into_iter()
        .map(|(key, value)| Label { key, value })
        .collect()
}

fn taints_to_wire(taints: &RecordSet<Taint>) -> Vec<TaintSpec> {
    taints.iter().map(TaintSpec::from).collect()
}

fn grants_to_wire(entries: &RecordSet<AccessEntry>) -> AccessPolicy {
    AccessPolicy {
        grants: entries.iter().map(AccessGrant::from).collect(),
    }
}

// ── Blocks ─────────────────────────────────────────────────────────

impl From<&ClusterAcl> for AclSettings {
    fn from(acl: &ClusterAcl) -> Self {
        Self {
            enabled: acl.enabled,
            rules: acl.entries.iter().map(IpAclRule::from).collect(),
        }
    }
}

impl From<AclSettings> for ClusterAcl {
    fn from(acl: AclSettings) -> Self {
        Self {
            enabled: acl.enabled,
            entries: acl.rules.into_iter().map(IpAclEntry::from).collect(),
        }
    }
}

/// An absent OIDC block means "disabled", and says so explicitly.
pub fn oidc_settings(oidc: Option<&OidcConfig>) -> OidcSettings {
    match oidc {
        Some(o) => OidcSettings {
            enabled: true,
            issuer_url: Some(o.issuer_url.clone()),
            client_id: Some(o.client_id.clone()),
            username_claim: o.username_claim.clone(),
            groups_claim: o.groups_claim.clone(),
        },
        None => OidcSettings::default(),
    }
}

fn oidc_from_settings(oidc: OidcSettings) -> Option<OidcConfig> {
    if !oidc.enabled {
        return None;
    }
    Some(OidcConfig {
        issuer_url: oidc.issuer_url.unwrap_or_default(),
        client_id: oidc.client_id.unwrap_or_default(),
        username_claim: oidc.username_claim,
        groups_claim: oidc.groups_claim,
    })
}

fn autoscaling_settings(autoscaling: Option<&Autoscaling>) -> AutoscalingSettings {
    match autoscaling {
        Some(a) => AutoscalingSettings {
            enabled: true,
            min_nodes: Some(a.min_nodes),
            max_nodes: Some(a.max_nodes),
        },
        None => AutoscalingSettings::default(),
    }
}

fn autoscaling_from_settings(settings: &AutoscalingSettings, node_count: u32) -> Option<Autoscaling> {
    settings.enabled.then(|| Autoscaling {
        min_nodes: settings.min_nodes.unwrap_or(node_count),
        max_nodes: settings.max_nodes.unwrap_or(node_count),
    })
}

// ── Clusters ───────────────────────────────────────────────────────

pub fn cluster_create(c: &ClusterConfig) -> ClusterCreateRequest {
    ClusterCreateRequest {
        name: c.name.clone(),
        region: c.region.clone(),
        version: c.version.known().cloned(),
        network_id: c.network_id.clone(),
        audit_log: c.audit_log_enabled.map(|enabled| AuditLogSettings { enabled }),
        acl: c.acl.as_ref().map(AclSettings::from),
        oidc: oidc_settings(c.oidc.as_ref()),
    }
}

/// Patch body carrying only the fields owned by `group`, or `None` when
/// clusters have no such sub-resource.
pub fn cluster_patch(c: &ClusterConfig, group: SubResource) -> Option<ClusterPatch> {
    let mut patch = ClusterPatch::default();
    match group {
        SubResource::VersionUpgrade => patch.version = c.version.known().cloned(),
        SubResource::AuditLog => {
            patch.audit_log = c.audit_log_enabled.map(|enabled| AuditLogSettings { enabled });
        }
        SubResource::Oidc => patch.oidc = Some(oidc_settings(c.oidc.as_ref())),
        SubResource::AccessControl => patch.acl = c.acl.as_ref().map(AclSettings::from),
        SubResource::Attributes
        | SubResource::AccessEntries
        | SubResource::Labels
        | SubResource::Taints
        | SubResource::Scaling
        | SubResource::Autoscaling
        | SubResource::NetworkAttachment => return None,
    }
    Some(patch)
}

impl From<ClusterResponse> for ClusterConfig {
    fn from(r: ClusterResponse) -> Self {
        Self {
            name: r.name,
            region: r.region,
            version: Attr::Known(r.version),
            network_id: r.network_id,
            audit_log_enabled: Some(r.audit_log.enabled),
            acl: Some(ClusterAcl::from(r.acl)),
            oidc: oidc_from_settings(r.oidc),
            endpoint: r.endpoint.into(),
        }
    }
}

// ── Node pools ─────────────────────────────────────────────────────

pub fn node_pool_create(p: &NodePoolConfig) -> NodePoolCreateRequest {
    let node_count = p
        .node_count
        .known()
        .copied()
        .or_else(|| p.autoscaling.map(|a| a.min_nodes))
        .unwrap_or(DEFAULT_NODE_COUNT);

    NodePoolCreateRequest {
        name: p.name.clone(),
        flavor: p.flavor.clone(),
        node_count,
        autoscaling: p.autoscaling.as_ref().map(|a| autoscaling_settings(Some(a))),
        labels: (!p.labels.is_empty()).then(|| labels_to_map(&p.labels)),
        taints: non_empty(taints_to_wire(&p.taints)),
        availability_zones: p.availability_zones.known().cloned().and_then(non_empty),
    }
}

pub fn node_pool_patch(p: &NodePoolConfig, group: SubResource) -> Option<NodePoolPatch> {
    let mut patch = NodePoolPatch::default();
    match group {
        SubResource::Scaling => patch.node_count = p.node_count.known().copied(),
        SubResource::Autoscaling => {
            patch.autoscaling = Some(autoscaling_settings(p.autoscaling.as_ref()));
        }
        SubResource::Labels => patch.labels = Some(labels_to_map(&p.labels)),
        SubResource::Taints => patch.taints = Some(taints_to_wire(&p.taints)),
        SubResource::NetworkAttachment => {
            patch.availability_zones = p.availability_zones.known().cloned();
        }
        SubResource::VersionUpgrade
        | SubResource::Attributes
        | SubResource::AuditLog
        | SubResource::Oidc
        | SubResource::AccessControl
        | SubResource::AccessEntries => return None,
    }
    Some(patch)
}

impl From<NodePoolResponse> for NodePoolConfig {
    fn from(r: NodePoolResponse) -> Self {
        Self {
            autoscaling: autoscaling_from_settings(&r.autoscaling, r.node_count),
            cluster_id: r.cluster_id,
            name: r.name,
            flavor: r.flavor,
            node_count: Attr::Known(r.node_count),
            labels: labels_from_map(r.labels),
            taints: r.taints.into_iter().map(Taint::from).collect(),
            availability_zones: Attr::Known(r.availability_zones),
        }
    }
}

// ── Load balancers ─────────────────────────────────────────────────

pub fn load_balancer_create(lb: &LoadBalancerConfig) -> LoadBalancerCreateRequest {
    LoadBalancerCreateRequest {
        name: lb.name.clone(),
        region: lb.region.clone(),
        algorithm: lb.algorithm.as_ref().map(ToString::to_string),
        subnets: lb.subnets.known().cloned().and_then(non_empty),
    }
}

pub fn load_balancer_patch(
    lb: &LoadBalancerConfig,
    group: SubResource,
) -> Option<LoadBalancerPatch> {
    let mut patch = LoadBalancerPatch::default();
    match group {
        SubResource::Attributes => {
            patch.name = Some(lb.name.clone());
            patch.algorithm = lb.algorithm.as_ref().map(ToString::to_string);
        }
        SubResource::NetworkAttachment => patch.subnets = lb.subnets.known().cloned(),
        SubResource::VersionUpgrade
        | SubResource::AuditLog
        | SubResource::Oidc
        | SubResource::AccessControl
        | SubResource::AccessEntries
        | SubResource::Labels
        | SubResource::Taints
        | SubResource::Scaling
        | SubResource::Autoscaling => return None,
    }
    Some(patch)
}

impl From<LoadBalancerResponse> for LoadBalancerConfig {
    fn from(r: LoadBalancerResponse) -> Self {
        Self {
            algorithm: Some(parse_wire(&r.algorithm, "algorithm")),
            name: r.name,
            region: r.region,
            subnets: Attr::Known(r.subnets),
            public_ip: r.public_ip.into(),
        }
    }
}

// ── Buckets ────────────────────────────────────────────────────────

pub fn bucket_create(b: &BucketConfig) -> BucketCreateRequest {
    BucketCreateRequest {
        name: b.name.clone(),
        versioning: b.versioning,
        access_policy: (!b.access_entries.is_empty()).then(|| grants_to_wire(&b.access_entries)),
    }
}

pub fn bucket_patch(b: &BucketConfig, group: SubResource) -> Option<BucketPatch> {
    let mut patch = BucketPatch::default();
    match group {
        SubResource::Attributes => patch.versioning = b.versioning,
        SubResource::AccessEntries => patch.access_policy = Some(grants_to_wire(&b.access_entries)),
        SubResource::VersionUpgrade
        | SubResource::AuditLog
        | SubResource::Oidc
        | SubResource::AccessControl
        | SubResource::Labels
        | SubResource::Taints
        | SubResource::Scaling
        | SubResource::Autoscaling
        | SubResource::NetworkAttachment => return None,
    }
    Some(patch)
}

impl From<BucketResponse> for BucketConfig {
    fn from(r: BucketResponse) -> Self {
        Self {
            region: r.region,
            name: r.name,
            versioning: Some(r.versioning),
            access_entries: r
                .access_policy
                .grants
                .into_iter()
                .map(AccessEntry::from)
                .collect(),
        }
    }
}
