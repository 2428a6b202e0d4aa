// converge-api: Remote API client boundary for the converge reconciliation engine.
//
// The engine never talks HTTP directly. Everything it needs from a remote
// endpoint goes through the `RemoteApi` trait, parameterized by a
// `ResourceKind` marker that fixes the wire types for each resource.

pub mod client;
pub mod error;
pub mod kind;
pub mod transport;
pub mod types;

pub use client::{HttpClient, ListFilter, RemoteApi};
pub use error::Error;
pub use kind::{Buckets, Clusters, LoadBalancers, NodePools, ResourceKind};
pub use transport::{TlsMode, TransportConfig};
