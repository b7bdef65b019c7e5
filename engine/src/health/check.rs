//! Health Checks
//!
//! One HTTP GET per request, classified into a [`ProbeResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use reqwest::Client;
use tracing::debug;

use super::notifier::ProbeNotifier;
use super::probe::{AdditionalHeader, Protocol};
use crate::error::HealthError;

/// Status reported when the target resets the connection (ECONNRESET)
pub const CONNECTION_RESET_STATUS: u16 = 104;

/// Status codes treated as healthy when a probe does not configure any
pub const DEFAULT_EXPECTED_RESPONSES: [u16; 2] = [200, 201];

/// Outcome of one health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub checked_at: chrono::DateTime<chrono::Utc>,
    pub healthy: bool,
    /// HTTP status, 104 for a connection reset, 0 when no response was received
    pub status: u16,
    pub reason: String,
}

impl ProbeResult {
    /// Classify a status code against the expected set
    pub fn from_status(status: u16, expected: &[u16]) -> Self {
        let healthy = if expected.is_empty() {
            DEFAULT_EXPECTED_RESPONSES.contains(&status)
        } else {
            expected.contains(&status)
        };

        Self {
            checked_at: chrono::Utc::now(),
            healthy,
            status,
            reason: if healthy {
                String::new()
            } else {
                format!("Status code: {}", status)
            },
        }
    }

    /// Classify a transport error. A connection reset becomes status 104 and
    /// goes through the expected set like any other code.
    pub fn from_transport_error(error: &(dyn StdError + 'static), expected: &[u16]) -> Self {
        if is_connection_reset(error) {
            let mut result = Self::from_status(CONNECTION_RESET_STATUS, expected);
            result.reason = error_chain(error);
            return result;
        }

        Self {
            checked_at: chrono::Utc::now(),
            healthy: false,
            status: 0,
            reason: error_chain(error),
        }
    }
}

fn is_connection_reset(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        if err.to_string().contains("connection reset") {
            return true;
        }
        current = err.source();
    }
    false
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(err) = current {
        message.push_str(": ");
        message.push_str(&err.to_string());
        current = err.source();
    }
    message
}

/// Snapshot of what to check, detached from the probe that produced it
#[derive(Clone)]
pub struct HealthRequest {
    pub probe_id: String,
    pub host: String,
    pub path: String,
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    pub additional_headers: Vec<AdditionalHeader>,
    pub expected_responses: Vec<u16>,
    pub allow_insecure_certificate: bool,
    pub notifier: Arc<dyn ProbeNotifier>,
}

impl HealthRequest {
    pub fn url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("{}://{}:{}/{}", self.protocol, self.address, self.port, path)
    }
}

impl std::fmt::Debug for HealthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRequest")
            .field("probe_id", &self.probe_id)
            .field("host", &self.host)
            .field("url", &self.url())
            .finish_non_exhaustive()
    }
}

/// Performs a single health check
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, request: &HealthRequest) -> ProbeResult;
}

/// HTTP GET health checks via reqwest
pub struct HttpHealthChecker {
    client: Client,
    insecure_client: Client,
}

impl HttpHealthChecker {
    /// Create a checker whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, HealthError> {
        // Checks target gateway addresses directly
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        let insecure_client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            insecure_client,
        })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthChecker {
    async fn check(&self, request: &HealthRequest) -> ProbeResult {
        let client = if request.allow_insecure_certificate {
            &self.insecure_client
        } else {
            &self.client
        };

        let mut builder = client
            .get(request.url())
            .header(reqwest::header::HOST, &request.host);
        for header in &request.additional_headers {
            builder = builder.header(&header.name, &header.value);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(probe = %request.probe_id, status, "Health check response");
                ProbeResult::from_status(status, &request.expected_responses)
            }
            Err(e) => {
                debug!(probe = %request.probe_id, error = %e, "Health check transport error");
                ProbeResult::from_transport_error(&e, &request.expected_responses)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::notifier::{NotificationResult, ProbeNotifier};

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error sending request")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    struct NoopNotifier;

    #[async_trait]
    impl ProbeNotifier for NoopNotifier {
        async fn notify(&self, _probe_id: &str, _result: ProbeResult) -> Result<NotificationResult, HealthError> {
            Ok(NotificationResult::default())
        }
    }

    #[test]
    fn test_default_expected_responses() {
        assert!(ProbeResult::from_status(200, &[]).healthy);
        assert!(ProbeResult::from_status(201, &[]).healthy);

        let result = ProbeResult::from_status(503, &[]);
        assert!(!result.healthy);
        assert_eq!(result.status, 503);
        assert_eq!(result.reason, "Status code: 503");
    }

    #[test]
    fn test_configured_expected_responses() {
        assert!(ProbeResult::from_status(204, &[204]).healthy);
        assert!(!ProbeResult::from_status(200, &[204]).healthy);
    }

    #[test]
    fn test_connection_reset_is_status_104() {
        let error = Wrapped(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));

        let result = ProbeResult::from_transport_error(&error, &[]);
        assert_eq!(result.status, CONNECTION_RESET_STATUS);
        assert!(!result.healthy);
        assert!(result.reason.contains("error sending request"));

        let result = ProbeResult::from_transport_error(&error, &[200, 104]);
        assert!(result.healthy);
    }

    #[test]
    fn test_other_transport_errors_are_unhealthy() {
        let error = Wrapped(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));

        let result = ProbeResult::from_transport_error(&error, &[0]);
        assert!(!result.healthy);
        assert_eq!(result.status, 0);
        assert_eq!(result.reason, "error sending request: refused");
    }

    #[test]
    fn test_request_url() {
        let request = HealthRequest {
            probe_id: "p".to_string(),
            host: "shop.example.com".to_string(),
            path: "/healthz".to_string(),
            protocol: Protocol::Https,
            address: "172.31.0.1".to_string(),
            port: 443,
            additional_headers: Vec::new(),
            expected_responses: Vec::new(),
            allow_insecure_certificate: false,
            notifier: Arc::new(NoopNotifier),
        };
        assert_eq!(request.url(), "https://172.31.0.1:443/healthz");

        let request = HealthRequest {
            path: "ready".to_string(),
            protocol: Protocol::Http,
            port: 8080,
            ..request
        };
        assert_eq!(request.url(), "http://172.31.0.1:8080/ready");
    }

    #[test]
    fn test_http_checker_builds() {
        assert!(HttpHealthChecker::new(Duration::from_secs(5)).is_ok());
    }

    /// Accepts one connection per canned status, returning the raw request
    /// heads it received
    async fn serve(statuses: &[&'static str]) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let statuses = statuses.to_vec();

        let handle = tokio::spawn(async move {
            let mut heads = Vec::new();
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "connection closed before request head");
                    buf.extend_from_slice(&chunk[..n]);
                }
                heads.push(String::from_utf8_lossy(&buf).to_string());

                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            heads
        });

        (port, handle)
    }

    #[tokio::test]
    async fn test_http_check_against_live_server() {
        let (port, server) = serve(&["503 Service Unavailable", "200 OK", "204 No Content"]).await;
        let checker = HttpHealthChecker::new(Duration::from_secs(5)).unwrap();

        let request = HealthRequest {
            probe_id: "p".to_string(),
            host: "shop.example.com".to_string(),
            path: "/healthz".to_string(),
            protocol: Protocol::Http,
            address: "127.0.0.1".to_string(),
            port,
            additional_headers: vec![AdditionalHeader {
                name: "X-Gslb-Check".to_string(),
                value: "agent".to_string(),
            }],
            expected_responses: Vec::new(),
            allow_insecure_certificate: false,
            notifier: Arc::new(NoopNotifier),
        };

        let result = checker.check(&request).await;
        assert_eq!(result.status, 503);
        assert!(!result.healthy);
        assert_eq!(result.reason, "Status code: 503");

        let result = checker.check(&request).await;
        assert_eq!(result.status, 200);
        assert!(result.healthy);

        // The insecure client carries the same request
        let insecure = HealthRequest {
            allow_insecure_certificate: true,
            expected_responses: vec![204],
            ..request
        };
        let result = checker.check(&insecure).await;
        assert_eq!(result.status, 204);
        assert!(result.healthy);

        let heads = server.await.unwrap();
        assert_eq!(heads.len(), 3);
        for head in heads {
            let lower = head.to_lowercase();
            assert!(head.starts_with("GET /healthz HTTP/1.1\r\n"), "{}", head);
            assert!(lower.contains("\r\nhost: shop.example.com\r\n"), "{}", head);
            assert!(lower.contains("\r\nx-gslb-check: agent\r\n"), "{}", head);
        }
    }

    #[tokio::test]
    async fn test_http_check_refused_connection_is_unhealthy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let checker = HttpHealthChecker::new(Duration::from_secs(5)).unwrap();
        let request = HealthRequest {
            probe_id: "p".to_string(),
            host: "shop.example.com".to_string(),
            path: "/".to_string(),
            protocol: Protocol::Http,
            address: "127.0.0.1".to_string(),
            port,
            additional_headers: Vec::new(),
            expected_responses: Vec::new(),
            allow_insecure_certificate: false,
            notifier: Arc::new(NoopNotifier),
        };

        let result = checker.check(&request).await;
        assert!(!result.healthy);
        assert_eq!(result.status, 0);
        assert!(!result.reason.is_empty());
    }
}
