//! Health Probing
//!
//! Probes fire on their own timers and push check requests into a shared,
//! throttled queue. Results flow back through a [`ProbeNotifier`] into the
//! [`ProbeStatusStore`] that DNS pruning reads.

pub mod check;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod queue;
pub mod reconcile;

pub use check::{HealthCheck, HealthRequest, HttpHealthChecker, ProbeResult};
pub use monitor::Monitor;
pub use notifier::{NotificationResult, ProbeNotifier, ProbeState, ProbeStatusStore, StatusNotifier};
pub use probe::{AdditionalHeader, Probe, ProbeSpec, Protocol};
pub use queue::RequestQueue;
pub use reconcile::{desired_probes, DesiredProbe, ProbeReconcileSummary, ProbeReconciler};
