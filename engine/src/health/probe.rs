//! Probes
//!
//! A probe is a recurring health check against one address. Each started
//! probe owns one timer task that snapshots the probe's current settings into
//! a [`HealthRequest`] on every tick and hands it to the shared queue without
//! waiting for the outcome.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::check::HealthRequest;
use super::notifier::ProbeNotifier;
use super::queue::RequestQueue;
use crate::error::HealthError;

/// Health check protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// Extra header sent with every check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalHeader {
    pub name: String,
    pub value: String,
}

/// Definition of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    pub id: String,
    pub interval: Duration,
    pub protocol: Protocol,
    /// Logical hostname, sent as the Host header
    pub host: String,
    pub address: String,
    pub port: u16,
    pub path: String,
    pub additional_headers: Vec<AdditionalHeader>,
    /// Empty means 200 and 201
    pub expected_responses: Vec<u16>,
    pub allow_insecure_certificate: bool,
}

impl ProbeSpec {
    pub fn validate(&self) -> Result<(), HealthError> {
        let invalid = |reason: &str| HealthError::InvalidProbe {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id is empty"));
        }
        if self.address.is_empty() {
            return Err(invalid("address is empty"));
        }
        if self.interval.is_zero() {
            return Err(invalid("interval must be greater than zero"));
        }
        if self.port == 0 {
            return Err(invalid("port must be greater than zero"));
        }
        Ok(())
    }

    fn to_request(&self, notifier: Arc<dyn ProbeNotifier>) -> HealthRequest {
        HealthRequest {
            probe_id: self.id.clone(),
            host: self.host.clone(),
            path: self.path.clone(),
            protocol: self.protocol,
            address: self.address.clone(),
            port: self.port,
            additional_headers: self.additional_headers.clone(),
            expected_responses: self.expected_responses.clone(),
            allow_insecure_certificate: self.allow_insecure_certificate,
            notifier,
        }
    }
}

/// A live probe and its timer
pub struct Probe {
    id: String,
    spec: Arc<Mutex<ProbeSpec>>,
    notifier: Arc<dyn ProbeNotifier>,
    queue: Arc<RequestQueue>,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl Probe {
    pub fn new(
        spec: ProbeSpec,
        notifier: Arc<dyn ProbeNotifier>,
        queue: Arc<RequestQueue>,
    ) -> Result<Self, HealthError> {
        spec.validate()?;

        Ok(Self {
            id: spec.id.clone(),
            spec: Arc::new(Mutex::new(spec)),
            notifier,
            queue,
            cancel: None,
            handle: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current settings
    pub fn spec(&self) -> ProbeSpec {
        self.spec.lock().clone()
    }

    pub fn is_started(&self) -> bool {
        self.cancel.is_some()
    }

    /// Apply `update` to the live settings. The timer picks the change up on
    /// its next tick. The ID cannot be changed. Settings that fail validation
    /// are rejected and the current ones stay in place.
    pub fn update(&self, update: impl FnOnce(&mut ProbeSpec)) -> Result<(), HealthError> {
        let mut spec = self.spec.lock();
        let mut next = spec.clone();
        update(&mut next);
        next.id.clone_from(&self.id);
        next.validate()?;
        *spec = next;
        Ok(())
    }

    /// Start the timer. Does nothing if already started.
    pub fn start(&mut self) {
        if self.is_started() {
            return;
        }

        let cancel = CancellationToken::new();
        let spec = Arc::clone(&self.spec);
        let notifier = Arc::clone(&self.notifier);
        let queue = Arc::clone(&self.queue);
        let token = cancel.clone();

        info!(probe = %self.id, "Starting probe");
        self.handle = Some(tokio::spawn(run_timer(spec, notifier, queue, token)));
        self.cancel = Some(cancel);
    }

    /// Stop the timer. Does nothing if not started. Returns the timer task so
    /// the caller can wait for it to finish.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        let cancel = self.cancel.take()?;
        cancel.cancel();
        info!(probe = %self.id, "Stopped probe");
        self.handle.take()
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

async fn run_timer(
    spec: Arc<Mutex<ProbeSpec>>,
    notifier: Arc<dyn ProbeNotifier>,
    queue: Arc<RequestQueue>,
    cancel: CancellationToken,
) {
    loop {
        let interval = spec.lock().interval;

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {
                let request = spec.lock().to_request(Arc::clone(&notifier));
                debug!(probe = %request.probe_id, url = %request.url(), "Queueing health check");
                queue.enqueue_check(request);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::check::{HealthCheck, ProbeResult};
    use crate::health::notifier::NotificationResult;
    use async_trait::async_trait;

    struct NoopNotifier;

    #[async_trait]
    impl ProbeNotifier for NoopNotifier {
        async fn notify(&self, _probe_id: &str, _result: ProbeResult) -> Result<NotificationResult, HealthError> {
            Ok(NotificationResult::default())
        }
    }

    struct NeverChecked;

    #[async_trait]
    impl HealthCheck for NeverChecked {
        async fn check(&self, _request: &HealthRequest) -> ProbeResult {
            unreachable!("queue is not running")
        }
    }

    fn spec(id: &str, interval_secs: u64) -> ProbeSpec {
        ProbeSpec {
            id: id.to_string(),
            interval: Duration::from_secs(interval_secs),
            protocol: Protocol::Https,
            host: "shop.example.com".to_string(),
            address: "172.31.0.1".to_string(),
            port: 443,
            path: "/healthz".to_string(),
            additional_headers: Vec::new(),
            expected_responses: Vec::new(),
            allow_insecure_certificate: false,
        }
    }

    fn queue() -> Arc<RequestQueue> {
        Arc::new(RequestQueue::new("test", Duration::from_secs(1), Arc::new(NeverChecked)))
    }

    #[test]
    fn test_validate() {
        assert!(spec("p", 10).validate().is_ok());
        assert!(spec("", 10).validate().is_err());
        assert!(spec("p", 0).validate().is_err());

        let mut no_address = spec("p", 10);
        no_address.address.clear();
        assert!(matches!(
            no_address.validate(),
            Err(HealthError::InvalidProbe { ref reason, .. }) if reason == "address is empty"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_enqueues_each_interval() {
        let queue = queue();
        let mut probe = Probe::new(spec("p1", 10), Arc::new(NoopNotifier), Arc::clone(&queue)).unwrap();

        probe.start();
        probe.start();
        assert!(probe.is_started());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(queue.len(), 3);

        let handle = probe.stop().unwrap();
        handle.await.unwrap();
        assert!(probe.stop().is_none());
        assert!(!probe.is_started());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_applies_without_restart() {
        let queue = queue();
        let mut probe = Probe::new(spec("p1", 10), Arc::new(NoopNotifier), Arc::clone(&queue)).unwrap();
        probe.start();

        probe
            .update(|spec| {
                spec.id = "renamed".to_string();
                spec.path = "/ready".to_string();
            })
            .unwrap();
        assert_eq!(probe.spec().id, "p1");
        assert_eq!(probe.spec().path, "/ready");

        let rejected = probe.update(|spec| {
            spec.port = 0;
            spec.path = "/never".to_string();
        });
        assert!(matches!(rejected, Err(HealthError::InvalidProbe { .. })));
        assert_eq!(probe.spec().port, 443);
        assert_eq!(probe.spec().path, "/ready");

        tokio::time::sleep(Duration::from_secs(11)).await;
        let request = queue.dequeue().unwrap();
        assert_eq!(request.probe_id, "p1");
        assert_eq!(request.path, "/ready");

        probe.stop();
    }
}
