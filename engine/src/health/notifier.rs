//! Result Notification
//!
//! Check results are handed to a [`ProbeNotifier`]. The bundled
//! [`StatusNotifier`] keeps per-probe status in a [`ProbeStatusStore`], which
//! is what the pruner reads.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::check::ProbeResult;
use crate::dns::ProbeStatus;
use crate::error::HealthError;

/// What the queue should do after a result was delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationResult {
    /// Submit the same request again
    pub requeue: bool,
}

/// Receives the result of every check for a probe
#[async_trait]
pub trait ProbeNotifier: Send + Sync {
    async fn notify(&self, probe_id: &str, result: ProbeResult) -> Result<NotificationResult, HealthError>;
}

/// Status of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeState {
    /// Host whose records this probe vouches for
    pub host: String,
    pub address: String,
    pub failure_threshold: u32,
    pub consecutive_failures: u32,
    /// None until the first result arrives
    pub healthy: Option<bool>,
    pub last_result: Option<ProbeResult>,
}

/// Per-probe status, keyed by probe ID
#[derive(Debug, Default)]
pub struct ProbeStatusStore {
    states: Mutex<HashMap<String, ProbeState>>,
}

impl ProbeStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a probe of `address` on behalf of `host`. Counters survive
    /// re-registration.
    pub fn register(&self, probe_id: &str, host: &str, address: &str, failure_threshold: u32) {
        let mut states = self.states.lock();
        let state = states.entry(probe_id.to_string()).or_insert_with(|| ProbeState {
            host: host.to_string(),
            address: address.to_string(),
            failure_threshold,
            consecutive_failures: 0,
            healthy: None,
            last_result: None,
        });
        state.host = host.to_string();
        state.address = address.to_string();
        state.failure_threshold = failure_threshold;
    }

    pub fn forget(&self, probe_id: &str) {
        self.states.lock().remove(probe_id);
    }

    pub fn get(&self, probe_id: &str) -> Option<ProbeState> {
        self.states.lock().get(probe_id).cloned()
    }

    /// Apply a result. Returns the updated state, or None for an unknown probe.
    pub fn record(&self, probe_id: &str, result: ProbeResult) -> Option<ProbeState> {
        let mut states = self.states.lock();
        let state = states.get_mut(probe_id)?;

        if result.healthy {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        }
        state.healthy = Some(result.healthy);
        state.last_result = Some(result);

        Some(state.clone())
    }

    /// Status of every probe registered for `host` that has reported at
    /// least once
    pub fn snapshot_for(&self, host: &str) -> Vec<ProbeStatus> {
        self.states
            .lock()
            .values()
            .filter(|state| state.host.eq_ignore_ascii_case(host))
            .filter_map(|state| {
                Some(ProbeStatus {
                    address: state.address.clone(),
                    healthy: state.healthy?,
                    consecutive_failures: state.consecutive_failures,
                    failure_threshold: state.failure_threshold,
                })
            })
            .collect()
    }
}

/// Records results into a [`ProbeStatusStore`]. Never asks for a requeue;
/// probes re-check on their own interval.
pub struct StatusNotifier {
    store: Arc<ProbeStatusStore>,
}

impl StatusNotifier {
    pub fn new(store: Arc<ProbeStatusStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProbeNotifier for StatusNotifier {
    async fn notify(&self, probe_id: &str, result: ProbeResult) -> Result<NotificationResult, HealthError> {
        let healthy = result.healthy;
        let status = result.status;
        let reason = result.reason.clone();

        let Some(state) = self.store.record(probe_id, result) else {
            debug!(probe = %probe_id, "Dropping result for unknown probe");
            return Ok(NotificationResult::default());
        };

        if healthy {
            debug!(probe = %probe_id, status, "Probe healthy");
        } else if state.consecutive_failures == state.failure_threshold {
            warn!(
                probe = %probe_id,
                address = %state.address,
                status,
                reason = %reason,
                consecutive_failures = state.consecutive_failures,
                "Probe reached failure threshold"
            );
        } else {
            info!(
                probe = %probe_id,
                status,
                reason = %reason,
                consecutive_failures = state.consecutive_failures,
                "Probe check failed"
            );
        }

        Ok(NotificationResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(healthy: bool) -> ProbeResult {
        ProbeResult {
            checked_at: chrono::Utc::now(),
            healthy,
            status: if healthy { 200 } else { 503 },
            reason: String::new(),
        }
    }

    #[test]
    fn test_record_counts_consecutive_failures() {
        let store = ProbeStatusStore::new();
        store.register("p1", "shop.example.com", "172.31.0.1", 2);

        store.record("p1", result(false));
        let state = store.record("p1", result(false)).unwrap();
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.healthy, Some(false));

        let state = store.record("p1", result(true)).unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.healthy, Some(true));
        assert_eq!(state.last_result.unwrap().status, 200);
    }

    #[test]
    fn test_unknown_probe_is_ignored() {
        let store = ProbeStatusStore::new();
        assert!(store.record("missing", result(false)).is_none());
        assert!(store.snapshot_for("shop.example.com").is_empty());
    }

    #[test]
    fn test_snapshot_skips_unreported_probes() {
        let store = ProbeStatusStore::new();
        store.register("p1", "shop.example.com", "172.31.0.1", 1);
        store.register("p2", "shop.example.com", "172.31.0.2", 1);
        store.record("p2", result(false));

        let snapshot = store.snapshot_for("shop.example.com");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].address, "172.31.0.2");
        assert!(snapshot[0].is_failing());
    }

    #[test]
    fn test_snapshot_is_scoped_to_host() {
        let store = ProbeStatusStore::new();
        store.register("a", "a.example.com", "172.31.0.1", 1);
        store.register("b", "b.example.com", "172.31.0.1", 1);
        store.record("a", result(false));
        store.record("b", result(true));

        let a = store.snapshot_for("a.example.com");
        assert_eq!(a.len(), 1);
        assert!(a[0].is_failing());

        let b = store.snapshot_for("B.example.com");
        assert_eq!(b.len(), 1);
        assert!(!b[0].is_failing());

        assert!(store.snapshot_for("c.example.com").is_empty());
    }

    #[test]
    fn test_register_keeps_counters() {
        let store = ProbeStatusStore::new();
        store.register("p1", "shop.example.com", "172.31.0.1", 3);
        store.record("p1", result(false));

        store.register("p1", "shop.example.com", "172.31.0.1", 1);
        let state = store.get("p1").unwrap();
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.failure_threshold, 1);

        store.forget("p1");
        assert!(store.get("p1").is_none());
    }

    #[tokio::test]
    async fn test_status_notifier_never_requeues() {
        let store = Arc::new(ProbeStatusStore::new());
        store.register("p1", "shop.example.com", "172.31.0.1", 1);
        let notifier = StatusNotifier::new(Arc::clone(&store));

        let outcome = notifier.notify("p1", result(false)).await.unwrap();
        assert!(!outcome.requeue);
        assert_eq!(store.get("p1").unwrap().consecutive_failures, 1);

        let outcome = notifier.notify("gone", result(false)).await.unwrap();
        assert!(!outcome.requeue);
    }
}
