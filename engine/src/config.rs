//! Agent State File
//!
//! The agent reads everything it reconciles from one JSON document: the
//! managed zones it may publish into, the DNS policies, and the gateways with
//! their per-cluster addresses.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dns::{ClusterGateway, ManagedZone};
use crate::policy::DnsPolicy;

/// A gateway as seen across all clusters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Hostnames served by the gateway's listeners
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub clusters: Vec<ClusterGateway>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    #[serde(default)]
    pub managed_zones: Vec<ManagedZone>,
    #[serde(default)]
    pub policies: Vec<DnsPolicy>,
    #[serde(default)]
    pub gateways: Vec<GatewaySpec>,
}

impl StateFile {
    /// Read and parse a state file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse state file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const STATE: &str = r#"{
        "managedZones": [{ "id": "zone-1", "domainName": "example.com" }],
        "policies": [{
            "name": "prod-web",
            "targetRef": { "name": "prod-web" },
            "loadBalancing": { "defaultGeo": "IE", "defaultWeight": 100 },
            "healthCheck": { "endpoint": "/healthz", "protocol": "HTTP", "failureThreshold": 3 }
        }],
        "gateways": [{
            "name": "prod-web",
            "hosts": ["shop.example.com"],
            "clusters": [{
                "clusterName": "test-cluster-1",
                "labels": { "gslb.io/lb-attribute-geo-code": "NA" },
                "addresses": [{ "type": "IPAddress", "value": "172.31.0.1" }]
            }]
        }]
    }"#;

    #[test]
    fn test_load_state_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, STATE).unwrap();

        let state = StateFile::load(&path).unwrap();
        assert_eq!(state.managed_zones[0].domain_name, "example.com");

        let policy = &state.policies[0];
        assert_eq!(policy.load_balancing.default_geo.as_str(), "IE");
        assert_eq!(policy.load_balancing.default_weight, 100);
        assert_eq!(policy.health_check.as_ref().unwrap().failure_threshold, 3);

        let gateway = &state.gateways[0];
        assert_eq!(gateway.namespace, "default");
        assert_eq!(gateway.clusters[0].addresses[0].value, "172.31.0.1");
        assert!(gateway.clusters[0].addresses[0].is_ip());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = StateFile::load(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.json"));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let err = StateFile::load(&broken).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_empty_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, "{}").unwrap();

        assert_eq!(StateFile::load(&path).unwrap(), StateFile::default());
    }
}
