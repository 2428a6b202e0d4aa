use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::attr::Attr;

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    RoundRobin,
    LeastConnections,
    /// A value this version does not know, kept verbatim.
    #[serde(untagged)]
    #[strum(default)]
    Unrecognized(String),
}

/// A regional load balancer. Subnet order is attachment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
    #[serde(default, skip_serializing_if = "Attr::is_unmanaged")]
    pub subnets: Attr<Vec<String>>,
    #[serde(default, skip_serializing_if = "Attr::is_unmanaged")]
    pub public_ip: Attr<String>,
}

impl LoadBalancerConfig {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            algorithm: None,
            subnets: Attr::Unset,
            public_ip: Attr::Computed,
        }
    }
}
