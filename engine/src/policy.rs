//! DNS Policy Types
//!
//! A policy attaches load-balancing defaults and an optional health check to
//! one gateway through its target reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dns::geo::{GeoCode, DEFAULT_WEIGHT};
use crate::health::{AdditionalHeader, Protocol};

/// Reference from a policy to the gateway it governs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    #[serde(default = "default_target_group")]
    pub group: String,
    #[serde(default = "default_target_kind")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

fn default_target_group() -> String {
    "gateway.networking.k8s.io".to_string()
}

fn default_target_kind() -> String {
    "Gateway".to_string()
}

impl TargetRef {
    /// Whether this reference points at the named gateway. A reference with
    /// no namespace resolves to the policy's own namespace.
    pub fn matches(&self, policy_namespace: &str, name: &str, namespace: &str) -> bool {
        let target_namespace = self.namespace.as_deref().unwrap_or(policy_namespace);
        self.kind == "Gateway" && self.name == name && target_namespace == namespace
    }
}

/// Policy objects that target a gateway
pub trait TargetReferencer {
    /// Short name of the policy kind, for logs
    fn kind(&self) -> &'static str;
    fn namespace(&self) -> &str;
    fn target_ref(&self) -> &TargetRef;
}

/// First policy whose target reference points at the gateway
pub fn find_policy_for<'a, P: TargetReferencer>(
    policies: &'a [P],
    gateway_name: &str,
    gateway_namespace: &str,
) -> Option<&'a P> {
    policies.iter().find(|policy| {
        policy
            .target_ref()
            .matches(policy.namespace(), gateway_name, gateway_namespace)
    })
}

/// Geo and weight defaults applied to every cluster of the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingSpec {
    #[serde(default)]
    pub default_geo: GeoCode,
    #[serde(default = "default_weight")]
    pub default_weight: u32,
    /// Value of the custom weight cluster label -> weight
    #[serde(default)]
    pub custom_weights: BTreeMap<String, u32>,
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl Default for LoadBalancingSpec {
    fn default() -> Self {
        Self {
            default_geo: GeoCode::default(),
            default_weight: DEFAULT_WEIGHT,
            custom_weights: BTreeMap::new(),
        }
    }
}

/// Health check configuration for every address behind the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    /// Path to probe (e.g., "/healthz")
    #[serde(default = "default_health_path")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    /// Consecutive failures before an address is pruned
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub additional_headers: Vec<AdditionalHeader>,
    /// Empty means 200 and 201
    #[serde(default)]
    pub expected_responses: Vec<u16>,
    #[serde(default)]
    pub allow_insecure_certificates: bool,
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            endpoint: default_health_path(),
            port: None,
            protocol: Protocol::default(),
            failure_threshold: default_failure_threshold(),
            interval_secs: default_interval_secs(),
            additional_headers: Vec::new(),
            expected_responses: Vec::new(),
            allow_insecure_certificates: false,
        }
    }
}

/// Routing policy for one gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsPolicy {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub target_ref: TargetRef,
    #[serde(default)]
    pub load_balancing: LoadBalancingSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl TargetReferencer for DnsPolicy {
    fn kind(&self) -> &'static str {
        "DNSPolicy"
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn target_ref(&self) -> &TargetRef {
        &self.target_ref
    }
}
