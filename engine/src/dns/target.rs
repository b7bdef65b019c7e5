//! Cluster Targets
//!
//! Per-cluster views of one logical gateway, with geo and weight already
//! resolved against the policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::geo::{resolve_geo, resolve_weight, GeoCode};
use super::hash::short_hash;
use crate::policy::LoadBalancingSpec;

/// Kind of a gateway address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    IPAddress,
    Hostname,
}

/// An address a gateway is reachable on in one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAddress {
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub value: String,
}

impl GatewayAddress {
    pub fn ip(value: &str) -> Self {
        Self {
            address_type: AddressType::IPAddress,
            value: value.to_string(),
        }
    }

    pub fn hostname(value: &str) -> Self {
        Self {
            address_type: AddressType::Hostname,
            value: value.to_string(),
        }
    }

    pub fn is_ip(&self) -> bool {
        self.address_type == AddressType::IPAddress
    }
}

/// A gateway as reported by one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGateway {
    pub cluster_name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub addresses: Vec<GatewayAddress>,
}

/// One cluster's resolved view of a gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    pub cluster_name: String,
    pub addresses: Vec<GatewayAddress>,
    pub geo: GeoCode,
    pub weight: u32,
}

impl ClusterTarget {
    pub fn new(gateway: &ClusterGateway, load_balancing: &LoadBalancingSpec) -> Self {
        Self {
            cluster_name: gateway.cluster_name.clone(),
            addresses: gateway.addresses.clone(),
            geo: resolve_geo(&gateway.labels, &load_balancing.default_geo),
            weight: resolve_weight(
                &gateway.labels,
                load_balancing.default_weight,
                &load_balancing.custom_weights,
            ),
        }
    }

    /// Hash used as the cluster's label in record names
    pub fn short_code(&self) -> String {
        short_hash(&self.cluster_name)
    }
}

/// All cluster targets for one logical host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiClusterTarget {
    pub host: String,
    pub cluster_targets: Vec<ClusterTarget>,
    pub default_geo: GeoCode,
    pub default_weight: u32,
}

impl MultiClusterTarget {
    pub fn new(
        host: &str,
        clusters: &[ClusterGateway],
        load_balancing: &LoadBalancingSpec,
    ) -> Self {
        Self {
            host: host.to_string(),
            cluster_targets: clusters
                .iter()
                .map(|cluster| ClusterTarget::new(cluster, load_balancing))
                .collect(),
            default_geo: load_balancing.default_geo.clone(),
            default_weight: load_balancing.default_weight,
        }
    }

    /// Cluster targets grouped by resolved geo, in geo order
    pub fn group_targets_by_geo(&self) -> BTreeMap<GeoCode, Vec<&ClusterTarget>> {
        let mut groups: BTreeMap<GeoCode, Vec<&ClusterTarget>> = BTreeMap::new();
        for target in &self.cluster_targets {
            groups.entry(target.geo.clone()).or_default().push(target);
        }
        groups
    }

    /// Every address across all clusters, in cluster order
    pub fn addresses(&self) -> impl Iterator<Item = &GatewayAddress> {
        self.cluster_targets.iter().flat_map(|t| t.addresses.iter())
    }
}
