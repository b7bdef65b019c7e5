//! DNS Record Types
//!
//! Endpoints are value objects rebuilt on every synthesis pass. Their identity
//! is `dns_name + set_identifier`, which is what ties a freshly built endpoint
//! back to the one persisted on the previous pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// TTL for leaf records (A records and CNAMEs to cluster targets)
pub const DEFAULT_TTL: i64 = 60;
/// TTL for the top-level and geo CNAMEs
pub const DEFAULT_CNAME_TTL: i64 = 300;

/// Provider-specific property carrying a routing weight
pub const PROVIDER_SPECIFIC_WEIGHT: &str = "weight";
/// Provider-specific property carrying a geo code
pub const PROVIDER_SPECIFIC_GEO_CODE: &str = "geo-code";

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    #[allow(clippy::upper_case_acronyms)]
    CNAME,
    NS,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::NS => write!(f, "NS"),
        }
    }
}

/// Opaque routing metadata. Providers disagree on how weight and geo are
/// expressed, so these stay as string pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpecificProperty {
    pub name: String,
    pub value: String,
}

/// A single DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    #[serde(default)]
    pub targets: Vec<String>,
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub set_identifier: String,
    #[serde(rename = "recordTTL")]
    pub record_ttl: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: Vec<ProviderSpecificProperty>,
    /// External correlation data (health check IDs and the like). Never
    /// computed by the builder, only carried across passes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(
        dns_name: impl Into<String>,
        targets: Vec<String>,
        record_type: RecordType,
        set_identifier: impl Into<String>,
        record_ttl: i64,
    ) -> Self {
        Self {
            dns_name: dns_name.into(),
            targets,
            record_type,
            set_identifier: set_identifier.into(),
            record_ttl,
            provider_specific: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Identity key, unique within one tree
    pub fn set_id(&self) -> String {
        format!("{}{}", self.dns_name, self.set_identifier)
    }

    /// Set a provider-specific property, replacing any existing value
    pub fn set_provider_specific(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.provider_specific.iter_mut().find(|p| p.name == name) {
            Some(property) => property.value = value,
            None => self.provider_specific.push(ProviderSpecificProperty {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn get_provider_specific(&self, name: &str) -> Option<&str> {
        self.provider_specific
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// The record set published for one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordSpec {
    /// ID of the managed zone the records belong to
    pub managed_zone: String,
    pub endpoints: Vec<Endpoint>,
}

/// Whether `next` differs from what was last written. Identical specs are
/// not written back.
pub fn needs_update(previous: Option<&DnsRecordSpec>, next: &DnsRecordSpec) -> bool {
    previous != Some(next)
}
