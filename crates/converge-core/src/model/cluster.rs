// ── Cluster desired/observed configuration ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::attr::Attr;
use super::record_set::{FieldHasher, RecordSet, StructuralHash};

/// Whether an ACL entry admits or rejects matching traffic.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AclAction {
    Allow,
    Deny,
    /// A value this version does not know, kept verbatim.
    #[serde(untagged)]
    #[strum(default)]
    Unrecognized(String),
}

/// One IP ACL entry on a cluster's API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpAclEntry {
    pub action: AclAction,
    /// CIDR block, e.g. `10.0.0.0/8`.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl StructuralHash for IpAclEntry {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.field("action", &self.action.to_string())
            .field("address", &self.address)
            .optional("comment", self.comment.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAcl {
    pub enabled: bool,
    #[serde(default)]
    pub entries: RecordSet<IpAclEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,
}

/// A managed Kubernetes cluster.
///
/// `oidc` is always managed: leaving it out means "OIDC disabled", and a
/// cluster that has it enabled remotely will be patched to turn it off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub region: String,
    /// Kubernetes version; left to the server's default when unmanaged.
    #[serde(default, skip_serializing_if = "Attr::is_unmanaged")]
    pub version: Attr<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<ClusterAcl>,
    #[serde(default)]
    pub oidc: Option<OidcConfig>,
    /// API server endpoint, assigned by the server.
    #[serde(default, skip_serializing_if = "Attr::is_unmanaged")]
    pub endpoint: Attr<String>,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            version: Attr::Unset,
            network_id: None,
            audit_log_enabled: None,
            acl: None,
            oidc: None,
            endpoint: Attr::Computed,
        }
    }
}
