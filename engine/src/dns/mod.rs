//! DNS Endpoint Trees
//!
//! Turns per-cluster gateway addresses into a layered record tree
//! (host -> geo -> weighted cluster targets) and prunes it against probe
//! health.
//!
//! ## Pipeline
//!
//! - **Resolve**: each cluster's geo and weight from its labels and the policy
//! - **Build**: the sorted endpoint set for one host
//! - **Prune**: drop unhealthy endpoints and the parents they orphan

pub mod builder;
pub mod geo;
pub mod hash;
pub mod pruner;
pub mod target;
pub mod types;
pub mod zone;

pub use builder::{build_endpoints, lb_name, EndpointTreeBuilder};
pub use geo::GeoCode;
pub use hash::short_hash;
pub use pruner::{prune_unhealthy_endpoints, ProbeStatus};
pub use target::{AddressType, ClusterGateway, ClusterTarget, GatewayAddress, MultiClusterTarget};
pub use types::{needs_update, DnsRecordSpec, Endpoint, RecordType};
pub use zone::{find_matching_managed_zone, ManagedZone};
