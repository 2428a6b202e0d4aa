// ── Node pool desired/observed configuration ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::attr::Attr;
use super::record_set::{FieldHasher, RecordSet, StructuralHash};

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
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
    /// A value this version does not know, kept verbatim.
    #[serde(untagged)]
    #[strum(default)]
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: TaintEffect,
}

impl StructuralHash for Taint {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.field("key", &self.key)
            .field("value", &self.value)
            .field("effect", &self.effect.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl StructuralHash for Label {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.field("key", &self.key).field("value", &self.value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autoscaling {
    pub min_nodes: u32,
    pub max_nodes: u32,
}

/// A node pool inside a cluster, addressed by `cluster_id/name`.
///
/// `autoscaling` is always managed (`null` = disabled). Leave
/// `node_count` unmanaged when the autoscaler owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolConfig {
    pub cluster_id: String,
    pub name: String,
    pub flavor: String,
    #[serde(default, skip_serializing_if = "Attr::is_unmanaged")]
    pub node_count: Attr<u32>,
    #[serde(default)]
    pub autoscaling: Option<Autoscaling>,
    #[serde(default)]
    pub labels: RecordSet<Label>,
    #[serde(default)]
    pub taints: RecordSet<Taint>,
    /// Explicit `[]` lets the server pick zones.
    #[serde(default, skip_serializing_if = "Attr::is_unmanaged")]
    pub availability_zones: Attr<Vec<String>>,
}

impl NodePoolConfig {
    pub fn new(
        cluster_id: impl Into<String>,
        name: impl Into<String>,
        flavor: impl Into<String>,
        node_count: u32,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            name: name.into(),
            flavor: flavor.into(),
            node_count: Attr::Known(node_count),
            autoscaling: None,
            labels: RecordSet::new(),
            taints: RecordSet::new(),
            availability_zones: Attr::Unset,
        }
    }
}
