//! Health-Driven Pruner
//!
//! Drops endpoints whose probes report sustained failure, then drops parent
//! records left with nothing to resolve to. If that would leave nothing at
//! all, the unpruned tree is returned instead.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, info, warn};

use super::types::Endpoint;

/// Latest known health of one probed address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStatus {
    /// Matched as a substring of endpoint targets
    pub address: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
}

impl ProbeStatus {
    /// Unhealthy for at least `failure_threshold` consecutive checks
    pub fn is_failing(&self) -> bool {
        !self.healthy && self.consecutive_failures >= self.failure_threshold
    }

    fn checks(&self, endpoint: &Endpoint) -> bool {
        !self.address.is_empty() && endpoint.targets.iter().any(|t| t.contains(&self.address))
    }
}

/// Remove unhealthy endpoints and the parents they orphan
pub fn prune_unhealthy_endpoints(endpoints: Vec<Endpoint>, probes: &[ProbeStatus]) -> Vec<Endpoint> {
    if probes.is_empty() || endpoints.is_empty() {
        return endpoints;
    }

    let stored = endpoints.clone();

    let mut working: Vec<Endpoint> = endpoints
        .into_iter()
        .filter(|endpoint| {
            let failing = probes.iter().find(|p| p.checks(endpoint) && p.is_failing());
            if let Some(probe) = failing {
                info!(
                    dns_name = %endpoint.dns_name,
                    set_identifier = %endpoint.set_identifier,
                    address = %probe.address,
                    consecutive_failures = probe.consecutive_failures,
                    "Removing unhealthy endpoint"
                );
            }
            failing.is_none()
        })
        .collect();

    if working.len() == stored.len() {
        return stored;
    }

    let tree_names: HashSet<&str> = stored.iter().map(|e| e.dns_name.as_str()).collect();

    loop {
        let live_names: HashSet<String> = working.iter().map(|e| e.dns_name.clone()).collect();
        let before = working.len();

        working.retain(|endpoint| {
            let orphaned = is_orphaned(endpoint, &tree_names, &live_names);
            if orphaned {
                debug!(
                    dns_name = %endpoint.dns_name,
                    set_identifier = %endpoint.set_identifier,
                    "Removing orphaned endpoint"
                );
            }
            !orphaned
        });

        let removed_any = working.len() != before;
        if !removed_any {
            break;
        }
    }

    if working.is_empty() {
        warn!(
            endpoints = stored.len(),
            "Pruning would remove every endpoint, publishing unpruned records"
        );
        return stored;
    }

    working
}

/// A parent record (every target names a record in the tree) none of whose
/// targets still exist. Records with an IP target are leaves and never
/// orphaned.
fn is_orphaned(endpoint: &Endpoint, tree_names: &HashSet<&str>, live_names: &HashSet<String>) -> bool {
    if endpoint.targets.is_empty() {
        return false;
    }
    if endpoint.targets.iter().any(|t| t.parse::<IpAddr>().is_ok()) {
        return false;
    }
    if !endpoint.targets.iter().all(|t| tree_names.contains(t.as_str())) {
        return false;
    }
    !endpoint.targets.iter().any(|t| live_names.contains(t))
}
