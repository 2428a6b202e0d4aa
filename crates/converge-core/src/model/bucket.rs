// ── Object storage bucket configuration ──

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::record_set::{FieldHasher, RecordSet, StructuralHash};

/// Grants for one principal. Groups and policies are unordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessEntry {
    /// Principal the grant applies to (user or service account).
    pub entry: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub policies: BTreeSet<String>,
}

impl StructuralHash for AccessEntry {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.field("entry", &self.entry)
            .list("groups", self.groups.iter().map(String::as_str))
            .list("policies", self.policies.iter().map(String::as_str));
    }
}

/// A bucket, addressed by `region/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub region: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning: Option<bool>,
    #[serde(default)]
    pub access_entries: RecordSet<AccessEntry>,
}

impl BucketConfig {
    pub fn new(region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            name: name.into(),
            versioning: None,
            access_entries: RecordSet::new(),
        }
    }
}
