//! Throttled Request Queue
//!
//! One FIFO shared by every probe. Enqueueing never blocks. The consumer
//! releases at most one request per throttle interval, sleeping while the
//! queue is empty, and runs each released
//! check as its own task, so a slow target never holds up the next release.
//! Completion order is therefore not submission order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::check::{HealthCheck, HealthRequest};

const MIN_THROTTLE: Duration = Duration::from_millis(1);

pub struct RequestQueue {
    name: String,
    throttle: Duration,
    items: Mutex<VecDeque<HealthRequest>>,
    available: Notify,
    checker: Arc<dyn HealthCheck>,
}

impl RequestQueue {
    pub fn new(name: &str, throttle: Duration, checker: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.to_string(),
            // tokio intervals must be non-zero
            throttle: throttle.max(MIN_THROTTLE),
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            checker,
        }
    }

    /// Append a request and return immediately
    pub fn enqueue_check(&self, request: HealthRequest) {
        self.items.lock().push_back(request);
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub(crate) fn dequeue(&self) -> Option<HealthRequest> {
        self.items.lock().pop_front()
    }

    /// Release requests until `cancel` fires. Requests still queued at that
    /// point are dropped; their probes submit again on the next tick.
    ///
    /// Releases are spaced by at least the throttle, measured from the
    /// previous release, so an idle period never lets a burst through.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(queue = %self.name, throttle = ?self.throttle, "Starting request queue");

        let mut next_release = Instant::now();

        'run: loop {
            while self.is_empty() {
                tokio::select! {
                    () = cancel.cancelled() => break 'run,
                    () = self.available.notified() => {}
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break 'run,
                () = sleep_until(next_release) => {}
            }

            let Some(request) = self.dequeue() else {
                continue;
            };
            next_release = Instant::now() + self.throttle;

            debug!(queue = %self.name, probe = %request.probe_id, "Releasing health check");
            let queue = Arc::clone(&self);
            tokio::spawn(async move {
                queue.process(request).await;
            });
        }

        let dropped = self.len();
        info!(queue = %self.name, dropped, "Request queue stopped");
    }

    async fn process(&self, request: HealthRequest) {
        let result = self.checker.check(&request).await;

        match request.notifier.notify(&request.probe_id, result).await {
            Ok(outcome) if outcome.requeue => {
                debug!(queue = %self.name, probe = %request.probe_id, "Requeueing health check");
                self.enqueue_check(request);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(queue = %self.name, probe = %request.probe_id, error = %e, "Failed to deliver probe result");
            }
        }
    }
}
