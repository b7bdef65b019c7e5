//! GSLB Engine Library
//!
//! Geo and weighted DNS record synthesis for hosts served from many
//! clusters, with health probing that prunes failing addresses.

pub mod agent;
pub mod config;
pub mod dns;
pub mod error;
pub mod health;
pub mod policy;

pub use agent::{GslbAgent, RecordAction, RecordSyncResult};
pub use config::StateFile;
pub use error::{DnsError, HealthError};
