//! Probe Reconciliation
//!
//! Keeps the monitor's probes in line with the desired set: one probe per
//! (address, policy, host).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::monitor::Monitor;
use super::notifier::{ProbeNotifier, ProbeStatusStore};
use super::probe::{Probe, ProbeSpec};
use super::queue::RequestQueue;
use crate::dns::MultiClusterTarget;
use crate::policy::{DnsPolicy, HealthCheckSpec};

/// Shortest interval a policy may ask for
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// A probe that should exist, with the threshold its status is judged by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredProbe {
    pub spec: ProbeSpec,
    pub failure_threshold: u32,
}

/// Probes for every address behind `target` under `policy`'s health check.
/// Empty when the policy has no health check.
pub fn desired_probes(policy: &DnsPolicy, target: &MultiClusterTarget) -> Vec<DesiredProbe> {
    let Some(health_check) = policy.health_check.as_ref() else {
        return Vec::new();
    };

    let mut desired = BTreeMap::new();
    for address in target.addresses() {
        let id = probe_id(&address.value, &policy.name, &target.host);
        desired
            .entry(id.clone())
            .or_insert_with(|| DesiredProbe {
                spec: probe_spec(id, &address.value, &target.host, health_check),
                failure_threshold: health_check.failure_threshold,
            });
    }
    desired.into_values().collect()
}

fn probe_id(address: &str, policy_name: &str, host: &str) -> String {
    format!("{}-{}-{}", address, policy_name, host).replace('*', "w")
}

fn probe_spec(id: String, address: &str, host: &str, health_check: &HealthCheckSpec) -> ProbeSpec {
    ProbeSpec {
        id,
        interval: Duration::from_secs(health_check.interval_secs).max(MIN_PROBE_INTERVAL),
        protocol: health_check.protocol,
        host: host.to_string(),
        address: address.to_string(),
        port: health_check
            .port
            .unwrap_or_else(|| health_check.protocol.default_port()),
        path: health_check.endpoint.clone(),
        additional_headers: health_check.additional_headers.clone(),
        expected_responses: health_check.expected_responses.clone(),
        allow_insecure_certificate: health_check.allow_insecure_certificates,
    }
}

/// Counts of changes made by one reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Adds, updates and removes probes to match the desired set
pub struct ProbeReconciler {
    monitor: Arc<Monitor>,
    store: Arc<ProbeStatusStore>,
    queue: Arc<RequestQueue>,
    notifier: Arc<dyn ProbeNotifier>,
}

impl ProbeReconciler {
    pub fn new(
        monitor: Arc<Monitor>,
        store: Arc<ProbeStatusStore>,
        queue: Arc<RequestQueue>,
        notifier: Arc<dyn ProbeNotifier>,
    ) -> Self {
        Self {
            monitor,
            store,
            queue,
            notifier,
        }
    }

    pub fn reconcile(&self, desired: Vec<DesiredProbe>) -> ProbeReconcileSummary {
        let mut summary = ProbeReconcileSummary::default();
        let wanted: HashSet<String> = desired.iter().map(|d| d.spec.id.clone()).collect();

        for DesiredProbe { spec, failure_threshold } in desired {
            self.store.register(&spec.id, &spec.host, &spec.address, failure_threshold);

            if self.monitor.has_probe(&spec.id) {
                if self.monitor.probe_spec(&spec.id).as_ref() != Some(&spec) {
                    let id = spec.id.clone();
                    match self.monitor.update_probe(&id, |current| *current = spec) {
                        Ok(true) => summary.updated += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(probe = %id, error = %e, "Keeping previous probe settings");
                            summary.failed += 1;
                        }
                    }
                }
                continue;
            }

            let id = spec.id.clone();
            match Probe::new(spec, Arc::clone(&self.notifier), Arc::clone(&self.queue)) {
                Ok(probe) => {
                    if self.monitor.add_probe(probe) {
                        summary.added += 1;
                    }
                }
                Err(e) => {
                    warn!(probe = %id, error = %e, "Skipping invalid probe");
                    self.store.forget(&id);
                    summary.failed += 1;
                }
            }
        }

        for id in self.monitor.probe_ids() {
            if !wanted.contains(&id) {
                self.monitor.remove_probe(&id);
                self.store.forget(&id);
                summary.removed += 1;
            }
        }

        if summary != ProbeReconcileSummary::default() {
            info!(
                added = summary.added,
                updated = summary.updated,
                removed = summary.removed,
                failed = summary.failed,
                "Reconciled probes"
            );
        }

        summary
    }
}
