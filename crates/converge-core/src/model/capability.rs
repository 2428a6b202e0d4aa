use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Feature gates a target environment may or may not offer.
///
/// Checked before any remote call; a desired record that uses an
/// unsupported feature is rejected with `CoreError::CapabilityDenied`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Oidc,
    AuditLog,
    IpAcl,
    PrivateNetwork,
    Autoscaling,
    BucketVersioning,
}
