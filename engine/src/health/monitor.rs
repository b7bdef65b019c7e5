//! Probe Registry
//!
//! Holds the active probes. Every operation takes the registry lock for its
//! own duration only; nothing awaits while holding it. Once [`Monitor::run`]
//! has shut down, the registry is empty and accepts no new probes.

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::probe::{Probe, ProbeSpec};
use crate::error::HealthError;

#[derive(Default)]
struct Registry {
    probes: Vec<Probe>,
    shut_down: bool,
}

#[derive(Default)]
pub struct Monitor {
    registry: Mutex<Registry>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_probe(&self, id: &str) -> bool {
        self.registry.lock().probes.iter().any(|p| p.id() == id)
    }

    /// IDs of all registered probes
    pub fn probe_ids(&self) -> Vec<String> {
        self.registry.lock().probes.iter().map(|p| p.id().to_string()).collect()
    }

    /// Current settings of a probe
    pub fn probe_spec(&self, id: &str) -> Option<ProbeSpec> {
        self.registry.lock().probes.iter().find(|p| p.id() == id).map(Probe::spec)
    }

    /// Register and start a probe. Returns false, leaving the existing probe
    /// untouched, if the ID is already registered or the monitor has shut
    /// down.
    pub fn add_probe(&self, mut probe: Probe) -> bool {
        let mut registry = self.registry.lock();
        if registry.shut_down {
            warn!(probe = %probe.id(), "Monitor has shut down, not starting probe");
            return false;
        }
        if registry.probes.iter().any(|p| p.id() == probe.id()) {
            debug!(probe = %probe.id(), "Probe already registered");
            return false;
        }

        probe.start();
        registry.probes.push(probe);
        true
    }

    /// Change a live probe's settings without restarting its timer. Returns
    /// `Ok(false)` if no such probe is registered; invalid settings are
    /// rejected and the probe keeps its current ones.
    pub fn update_probe(&self, id: &str, update: impl FnOnce(&mut ProbeSpec)) -> Result<bool, HealthError> {
        let registry = self.registry.lock();
        match registry.probes.iter().find(|p| p.id() == id) {
            Some(probe) => {
                probe.update(update)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop and unregister a probe. Returns false if no such probe is registered.
    pub fn remove_probe(&self, id: &str) -> bool {
        let mut registry = self.registry.lock();
        let Some(index) = registry.probes.iter().position(|p| p.id() == id) else {
            return false;
        };

        let mut probe = registry.probes.remove(index);
        probe.stop();
        true
    }

    /// Wait for `cancel`, then stop and unregister every probe and wait for
    /// their timers to exit.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Probe monitor running");
        cancel.cancelled().await;

        let stopped: Vec<Probe> = {
            let mut registry = self.registry.lock();
            registry.shut_down = true;
            registry.probes.drain(..).collect()
        };
        let handles: Vec<_> = stopped.into_iter().filter_map(|mut probe| probe.stop()).collect();

        let stopped = handles.len();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Probe timer exited abnormally");
            }
        }

        info!(stopped, "Probe monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealthError;
    use crate::health::check::{HealthCheck, HealthRequest, ProbeResult};
    use crate::health::notifier::{NotificationResult, ProbeNotifier};
    use crate::health::probe::Protocol;
    use crate::health::queue::RequestQueue;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

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

    fn probe(id: &str, queue: &Arc<RequestQueue>) -> Probe {
        let spec = ProbeSpec {
            id: id.to_string(),
            interval: Duration::from_secs(10),
            protocol: Protocol::Http,
            host: "shop.example.com".to_string(),
            address: "172.31.0.1".to_string(),
            port: 80,
            path: "/".to_string(),
            additional_headers: Vec::new(),
            expected_responses: Vec::new(),
            allow_insecure_certificate: false,
        };
        Probe::new(spec, Arc::new(NoopNotifier), Arc::clone(queue)).unwrap()
    }

    fn queue() -> Arc<RequestQueue> {
        Arc::new(RequestQueue::new("test", Duration::from_secs(1), Arc::new(NeverChecked)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_is_idempotent() {
        let queue = queue();
        let monitor = Monitor::new();

        assert!(monitor.add_probe(probe("p1", &queue)));
        assert!(!monitor.add_probe(probe("p1", &queue)));
        assert!(monitor.has_probe("p1"));
        assert!(!monitor.has_probe("p2"));
        assert_eq!(monitor.probe_ids(), vec!["p1"]);

        // Only one timer is running for p1
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_and_remove() {
        let queue = queue();
        let monitor = Monitor::new();
        monitor.add_probe(probe("p1", &queue));

        assert!(monitor
            .update_probe("p1", |spec| spec.interval = Duration::from_secs(30))
            .unwrap());
        assert!(!monitor.update_probe("missing", |_| {}).unwrap());
        assert!(monitor.update_probe("p1", |spec| spec.address.clear()).is_err());
        assert_eq!(monitor.probe_spec("p1").unwrap().address, "172.31.0.1");
        assert_eq!(monitor.probe_spec("p1").unwrap().interval, Duration::from_secs(30));

        // The first sleep was already armed at 10s, the next one uses 30s
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(queue.len(), 1);

        assert!(monitor.remove_probe("p1"));
        assert!(!monitor.remove_probe("p1"));
        assert!(!monitor.has_probe("p1"));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_every_probe_on_cancel() {
        let queue = queue();
        let monitor = Arc::new(Monitor::new());
        monitor.add_probe(probe("p1", &queue));
        monitor.add_probe(probe("p2", &queue));

        let cancel = CancellationToken::new();
        let handle = {
            let monitor = Arc::clone(&monitor);
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(queue.len(), 4);

        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queue.len(), 4);
        assert!(!monitor.has_probe("p1"));
        assert!(monitor.probe_ids().is_empty());

        // A stopped monitor starts nothing new
        assert!(!monitor.add_probe(probe("p3", &queue)));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queue.len(), 4);
    }
}
