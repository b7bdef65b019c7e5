//! GSLB Reconcile Agent
//!
//! Turns a [`StateFile`] into published record sets: for every host of every
//! gateway with a policy, build the endpoint tree, prune it against probe
//! health, and keep it if it changed. Probes are kept in step with the same
//! pass.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StateFile;
use crate::dns::{
    build_endpoints, find_matching_managed_zone, needs_update, prune_unhealthy_endpoints,
    DnsRecordSpec, ManagedZone, MultiClusterTarget,
};
use crate::health::{desired_probes, ProbeReconciler, ProbeStatusStore};
use crate::policy::{find_policy_for, TargetReferencer};

/// What a reconcile pass did to one host's records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSyncResult {
    pub record_name: String,
    pub action: RecordAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordSyncResult {
    fn new(record_name: &str, action: RecordAction) -> Self {
        Self {
            record_name: record_name.to_string(),
            action,
            error: None,
        }
    }

    fn error(record_name: &str, error: impl ToString) -> Self {
        Self {
            record_name: record_name.to_string(),
            action: RecordAction::Error,
            error: Some(error.to_string()),
        }
    }
}

pub struct GslbAgent {
    store: Arc<ProbeStatusStore>,
    probes: Option<ProbeReconciler>,
    /// Published record sets, keyed by host
    records: BTreeMap<String, DnsRecordSpec>,
}

impl GslbAgent {
    /// Agent that prunes against `store` but manages no probes itself
    pub fn new(store: Arc<ProbeStatusStore>) -> Self {
        Self {
            store,
            probes: None,
            records: BTreeMap::new(),
        }
    }

    /// Also create, update and remove probes on every pass
    pub fn with_probe_reconciler(mut self, probes: ProbeReconciler) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn records(&self) -> &BTreeMap<String, DnsRecordSpec> {
        &self.records
    }

    /// Run one pass over `state`
    pub fn reconcile(&mut self, state: &StateFile) -> Vec<RecordSyncResult> {
        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut desired = Vec::new();

        for gateway in &state.gateways {
            let Some(policy) = find_policy_for(&state.policies, &gateway.name, &gateway.namespace) else {
                debug!(gateway = %gateway.name, namespace = %gateway.namespace, "Gateway has no policy");
                continue;
            };

            debug!(
                gateway = %gateway.name,
                policy = %policy.name,
                kind = policy.kind(),
                "Reconciling gateway"
            );

            for host in &gateway.hosts {
                let host = host.trim_end_matches('.').to_lowercase();
                if !seen.insert(host.clone()) {
                    warn!(host = %host, gateway = %gateway.name, "Host already claimed by another gateway");
                    continue;
                }

                let target = MultiClusterTarget::new(&host, &gateway.clusters, &policy.load_balancing);
                desired.extend(desired_probes(policy, &target));
                results.push(self.reconcile_host(&target, &state.managed_zones));
            }
        }

        let stale: Vec<String> = self
            .records
            .keys()
            .filter(|host| !seen.contains(*host))
            .cloned()
            .collect();
        for host in stale {
            info!(host = %host, "Removing records for unknown host");
            self.records.remove(&host);
            results.push(RecordSyncResult::new(&host, RecordAction::Deleted));
        }

        if let Some(probes) = &self.probes {
            probes.reconcile(desired);
        }

        results
    }

    fn reconcile_host(
        &mut self,
        target: &MultiClusterTarget,
        zones: &[ManagedZone],
    ) -> RecordSyncResult {
        let host = target.host.as_str();

        let zone_id = match find_matching_managed_zone(host, zones) {
            Ok((zone, subdomain)) => {
                debug!(host = %host, zone = %zone.domain_name, subdomain = %subdomain, "Matched managed zone");
                zone.id.clone()
            }
            Err(e) => {
                warn!(host = %host, error = %e, "Skipping host");
                return RecordSyncResult::error(host, e);
            }
        };

        // Only probes created for this host speak for its records
        let statuses = self.store.snapshot_for(host);
        let previous = self.records.get(host);
        let previous_endpoints = previous.map(|r| r.endpoints.as_slice()).unwrap_or_default();
        let endpoints = prune_unhealthy_endpoints(build_endpoints(target, previous_endpoints), &statuses);

        if endpoints.is_empty() {
            return match self.records.remove(host) {
                Some(_) => {
                    info!(host = %host, "No addresses left, removing records");
                    RecordSyncResult::new(host, RecordAction::Deleted)
                }
                None => RecordSyncResult::new(host, RecordAction::Unchanged),
            };
        }

        let next = DnsRecordSpec {
            managed_zone: zone_id,
            endpoints,
        };

        if !needs_update(previous, &next) {
            debug!(host = %host, "Records unchanged");
            return RecordSyncResult::new(host, RecordAction::Unchanged);
        }

        let action = if previous.is_some() {
            RecordAction::Updated
        } else {
            RecordAction::Created
        };
        info!(host = %host, endpoints = next.endpoints.len(), action = ?action, "Records changed");
        self.records.insert(host.to_string(), next);

        RecordSyncResult::new(host, action)
    }
}
