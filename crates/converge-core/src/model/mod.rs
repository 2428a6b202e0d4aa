// ── Domain model ──
//
// Typed desired/observed configuration records, one per resource kind,
// plus the building blocks they share.

pub mod attr;
pub mod bucket;
pub mod capability;
pub mod cluster;
pub mod identity;
pub mod load_balancer;
pub mod node_pool;
pub mod record_set;

pub use attr::Attr;
pub use bucket::{AccessEntry, BucketConfig};
pub use capability::Capability;
pub use cluster::{AclAction, ClusterAcl, ClusterConfig, IpAclEntry, OidcConfig};
pub use identity::{CompositeId, SEPARATOR, format_id, parse_pair};
pub use load_balancer::{Algorithm, LoadBalancerConfig};
pub use node_pool::{Autoscaling, Label, NodePoolConfig, Taint, TaintEffect};
pub use record_set::{FieldHasher, RecordSet, StructuralHash};
