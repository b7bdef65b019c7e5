//! Endpoint Tree Builder
//!
//! Synthesises the layered record tree for one host:
//!
//! ```text
//! shop.example.com            CNAME  lb-2cli32.shop.example.com
//! lb-2cli32.shop.example.com  CNAME  ie.lb-2cli32.shop.example.com     (geo IE, set "IE")
//! lb-2cli32.shop.example.com  CNAME  ie.lb-2cli32.shop.example.com     (geo *,  set "default")
//! ie.lb-2cli32.shop...        CNAME  20qri0.lb-2cli32.shop...          (weight 120)
//! 20qri0.lb-2cli32.shop...    A      172.31.0.1
//! ```

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::geo::{DEFAULT_GEO, WILDCARD_GEO};
use super::hash::short_hash;
use super::target::MultiClusterTarget;
use super::types::{
    Endpoint, RecordType, DEFAULT_CNAME_TTL, DEFAULT_TTL, PROVIDER_SPECIFIC_GEO_CODE,
    PROVIDER_SPECIFIC_WEIGHT,
};

/// Name of the load-balancing layer for a host
pub fn lb_name(host: &str) -> String {
    format!("lb-{}.{}", short_hash(host), host).to_lowercase()
}

/// Builds endpoint trees, carrying data over from the previous tree
pub struct EndpointTreeBuilder<'a> {
    previous: HashMap<String, &'a Endpoint>,
}

impl<'a> EndpointTreeBuilder<'a> {
    pub fn new(previous: &'a [Endpoint]) -> Self {
        Self {
            previous: previous.iter().map(|e| (e.set_id(), e)).collect(),
        }
    }

    /// Build the sorted endpoint set for `target`.
    ///
    /// Returns an empty set when no cluster has an address, so no top-level
    /// CNAME is left pointing at nothing.
    pub fn build(&self, target: &MultiClusterTarget) -> Vec<Endpoint> {
        let lb_name = lb_name(&target.host);
        let mut tree = Tree::default();
        let mut default_endpoint: Option<Endpoint> = None;

        for (geo, cluster_targets) in target.group_targets_by_geo() {
            let geo_lb_name = format!("{}.{}", geo, lb_name).to_lowercase();
            let mut cluster_endpoints = Vec::new();

            for cluster in cluster_targets {
                let (ips, hosts): (Vec<_>, Vec<_>) =
                    cluster.addresses.iter().partition(|a| a.is_ip());
                let mut host_values: Vec<String> = hosts.into_iter().map(|a| a.value.clone()).collect();

                if !ips.is_empty() {
                    let cluster_lb_name = format!("{}.{}", cluster.short_code(), lb_name).to_lowercase();
                    cluster_endpoints.push(self.endpoint(
                        &cluster_lb_name,
                        ips.into_iter().map(|a| a.value.clone()).collect(),
                        RecordType::A,
                        "",
                        DEFAULT_TTL,
                    ));
                    host_values.push(cluster_lb_name);
                }

                for host_value in host_values {
                    let mut endpoint = self.endpoint(
                        &geo_lb_name,
                        vec![host_value.clone()],
                        RecordType::CNAME,
                        &host_value,
                        DEFAULT_TTL,
                    );
                    endpoint.set_provider_specific(PROVIDER_SPECIFIC_WEIGHT, cluster.weight.to_string());
                    cluster_endpoints.push(endpoint);
                }
            }

            if cluster_endpoints.is_empty() {
                continue;
            }
            tree.extend(cluster_endpoints);

            let mut geo_endpoint = self.endpoint(
                &lb_name,
                vec![geo_lb_name.clone()],
                RecordType::CNAME,
                geo.as_str(),
                DEFAULT_CNAME_TTL,
            );

            // A `default` group is the default record itself
            if geo.is_default_code() {
                default_endpoint = Some(geo_endpoint);
                continue;
            }

            if geo == target.default_geo || default_endpoint.is_none() {
                default_endpoint = Some(self.endpoint(
                    &lb_name,
                    vec![geo_lb_name.clone()],
                    RecordType::CNAME,
                    DEFAULT_GEO,
                    DEFAULT_CNAME_TTL,
                ));
            }

            geo_endpoint.set_provider_specific(PROVIDER_SPECIFIC_GEO_CODE, geo.as_str());
            tree.push(geo_endpoint);
        }

        let Some(mut default_endpoint) = default_endpoint else {
            debug!(host = %target.host, "No cluster addresses, skipping record tree");
            return Vec::new();
        };

        default_endpoint.set_provider_specific(PROVIDER_SPECIFIC_GEO_CODE, WILDCARD_GEO);
        tree.push(default_endpoint);

        tree.push(self.endpoint(
            &target.host,
            vec![lb_name],
            RecordType::CNAME,
            "",
            DEFAULT_CNAME_TTL,
        ));

        tree.into_sorted()
    }

    /// Fresh endpoint, keeping labels from the previous endpoint with the
    /// same identity
    fn endpoint(
        &self,
        dns_name: &str,
        targets: Vec<String>,
        record_type: RecordType,
        set_identifier: &str,
        ttl: i64,
    ) -> Endpoint {
        let mut endpoint = Endpoint::new(dns_name, targets, record_type, set_identifier, ttl);
        if let Some(previous) = self.previous.get(&endpoint.set_id()) {
            endpoint.labels = previous.labels.clone();
        }
        endpoint
    }
}

/// Endpoints keyed by identity. The first endpoint for a key wins.
#[derive(Default)]
struct Tree {
    endpoints: BTreeMap<String, Endpoint>,
}

impl Tree {
    fn push(&mut self, endpoint: Endpoint) {
        let key = endpoint.set_id();
        if self.endpoints.contains_key(&key) {
            debug!(set_id = %key, "Duplicate endpoint identity dropped");
            return;
        }
        self.endpoints.insert(key, endpoint);
    }

    fn extend(&mut self, endpoints: impl IntoIterator<Item = Endpoint>) {
        for endpoint in endpoints {
            self.push(endpoint);
        }
    }

    fn into_sorted(self) -> Vec<Endpoint> {
        self.endpoints.into_values().collect()
    }
}

/// Build the tree for `target` against the previously published endpoints
pub fn build_endpoints(target: &MultiClusterTarget, previous: &[Endpoint]) -> Vec<Endpoint> {
    EndpointTreeBuilder::new(previous).build(target)
}
