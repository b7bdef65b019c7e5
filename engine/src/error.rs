//! Error types for the DNS and health subsystems

use thiserror::Error;

/// Errors raised while resolving zones or synthesising DNS records
#[derive(Debug, Error)]
pub enum DnsError {
    /// No managed zone is a suffix of the host. Not retried here; the caller
    /// decides whether to try again on its next pass.
    #[error("No managed zone for host: {host}")]
    NoManagedZone { host: String },

    #[error("Invalid host: {0}")]
    InvalidHost(String),
}

/// Errors raised by the probe and request-queue machinery
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Invalid probe {id}: {reason}")]
    InvalidProbe { id: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Notification failed for probe {id}: {reason}")]
    Notification { id: String, reason: String },
}
