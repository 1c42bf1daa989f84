//! Peer health probing, leader selection, proxying, and quorum replication.

use std::time::Duration;

use bytes::Bytes;
use ruststack_core::{Error, Result};
use tracing::{debug, warn};

use crate::config::{ClusterConfig, INTERNAL_REPLICATION_HEADER};

const PEER_TIMEOUT: Duration = Duration::from_secs(30);

/// The outcome of proxying a request to the leader: status, headers, and body.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    /// The leader's HTTP status code.
    pub status: u16,
    /// The leader's response headers.
    pub headers: Vec<(String, String)>,
    /// The leader's response body.
    pub body: Bytes,
}

/// Which base URL (S3 or admin) to target for a peer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The public S3 listener.
    S3,
    /// The admin/replication listener.
    Admin,
}

/// Peer-aware cluster membership and replication component.
///
/// Shares a single `reqwest::Client` across all outbound peer calls, matching
/// the data model's stated ownership: the Cluster owns its HTTP client and
/// TLS configuration.
#[derive(Debug, Clone)]
pub struct Cluster {
    config: ClusterConfig,
    client: reqwest::Client,
}

impl Cluster {
    /// Build a `Cluster` from its static topology configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PEER_TIMEOUT)
            .build()
            .map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
        Ok(Self { config, client })
    }

    /// The static cluster topology.
    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Whether cluster replication is active (more than one replica).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Whether `headers` carries the internal-replication marker.
    #[must_use]
    pub fn is_internal_replication(headers: &http::HeaderMap) -> bool {
        headers.get(INTERNAL_REPLICATION_HEADER).and_then(|v| v.to_str().ok()) == Some("true")
    }

    /// Whether `ordinal` is this node's own leadership claim.
    #[must_use]
    pub fn is_leader(&self, leader_ordinal: u32) -> bool {
        leader_ordinal == self.config.self_ordinal
    }

    /// Probe peers in ordinal order and return the first one whose
    /// `/_cluster/health` responds 200 with a valid bearer token. Self is
    /// always considered healthy without an outbound call. Falls back to
    /// ordinal 0 if no peer responds.
    pub async fn probe_leader(&self) -> u32 {
        for ordinal in 0..self.config.replicas {
            if ordinal == self.config.self_ordinal {
                debug!(ordinal, "self is healthy by construction");
                return ordinal;
            }
            if self.probe_peer_health(ordinal).await {
                return ordinal;
            }
        }
        warn!("no peer responded to health probe, defaulting to ordinal 0");
        0
    }

    async fn probe_peer_health(&self, ordinal: u32) -> bool {
        let url = format!("{}/_cluster/health", self.config.peer_admin_base(ordinal));
        match self
            .client
            .get(&url)
            .bearer_auth(&self.config.bearer_token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(ordinal, error = %err, "peer health probe failed");
                false
            }
        }
    }

    /// Proxy a request verbatim to the peer at `leader_ordinal`, preserving
    /// path, query, headers, and body. Copies back the leader's status,
    /// headers, and body unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Proxy`] if the leader cannot be reached.
    pub async fn proxy_to_leader(
        &self,
        leader_ordinal: u32,
        surface: Surface,
        method: http::Method,
        path_and_query: &str,
        headers: &http::HeaderMap,
        body: Bytes,
    ) -> Result<ProxiedResponse> {
        let base = match surface {
            Surface::S3 => self.config.peer_s3_base(leader_ordinal),
            Surface::Admin => self.config.peer_admin_base(leader_ordinal),
        };
        let url = format!("{base}{path_and_query}");

        let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|err| Error::Proxy(err.to_string()))?;
        let mut request = self.client.request(reqwest_method, &url);
        for (name, value) in headers {
            if name == http::header::HOST {
                continue;
            }
            request = request.header(name, value);
        }
        request = request.body(body);

        let response = request.send().await.map_err(|err| Error::Proxy(err.to_string()))?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_owned()))
            .collect();
        let body = response.bytes().await.map_err(|err| Error::Proxy(err.to_string()))?;

        Ok(ProxiedResponse { status, headers: response_headers, body })
    }

    /// Replicate a mutation to every peer except self, requiring
    /// acknowledgement from a majority (including self, which counts as an
    /// automatic ack since the caller commits locally before calling this).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Quorum`] if fewer than `quorum()` peers (including
    /// self) acknowledge.
    pub async fn replicate(&self, method: http::Method, path: &str, body: Bytes) -> Result<()> {
        let required = self.config.quorum();
        let mut acked: usize = 1; // self already committed locally.

        for ordinal in 0..self.config.replicas {
            if ordinal == self.config.self_ordinal {
                continue;
            }
            if self.replicate_to_peer(ordinal, method.clone(), path, body.clone()).await {
                acked += 1;
            }
        }

        if acked >= required {
            Ok(())
        } else {
            Err(Error::Quorum { required, acked })
        }
    }

    async fn replicate_to_peer(&self, ordinal: u32, method: http::Method, path: &str, body: Bytes) -> bool {
        let url = format!("{}{}", self.config.peer_admin_base(ordinal), path);
        let reqwest_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
            Ok(method) => method,
            Err(_) => return false,
        };

        let result = self
            .client
            .request(reqwest_method, &url)
            .bearer_auth(&self.config.bearer_token)
            .header(INTERNAL_REPLICATION_HEADER, "true")
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    warn!(ordinal, status = %response.status(), "peer replication rejected");
                }
                ok
            }
            Err(err) => {
                warn!(ordinal, error = %err, "peer replication unreachable");
                false
            }
        }
    }
}
