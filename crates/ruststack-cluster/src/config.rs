//! Static, process-wide cluster topology configuration.

/// The header carrying the internal-replication marker. Its presence (value
/// `"true"`) tells a receiving node that the request is peer-originated and
/// must not be proxied or re-replicated.
pub const INTERNAL_REPLICATION_HEADER: &str = "x-pxobj-internal-replication";

/// Immutable cluster topology, established once at startup.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// This node's ordinal within the stateful set.
    pub self_ordinal: u32,
    /// Total number of replicas (peer count + self).
    pub replicas: u32,
    /// The stateful set's service name (used in the peer DNS pattern).
    pub service_name: String,
    /// The headless service name backing the stateful set.
    pub headless_service_name: String,
    /// The Kubernetes namespace the stateful set lives in.
    pub namespace: String,
    /// The S3 listener port on every peer.
    pub s3_port: u16,
    /// The admin/replication listener port on every peer.
    pub admin_port: u16,
    /// Whether peer URLs use `https`.
    pub tls_enabled: bool,
    /// The shared bearer token used for admin and replication calls.
    pub bearer_token: String,
}

impl ClusterConfig {
    /// Build a `ClusterConfig` from the daemon's process-wide [`Config`](ruststack_core::Config).
    #[must_use]
    pub fn from_core_config(config: &ruststack_core::Config) -> Self {
        Self {
            self_ordinal: parse_ordinal(&config.pod_name),
            replicas: config.replicas,
            service_name: config.service_name.clone(),
            headless_service_name: config.headless_service_name.clone(),
            namespace: config.pod_namespace.clone(),
            s3_port: config.s3_port,
            admin_port: config.admin_port,
            tls_enabled: config.tls.enabled,
            bearer_token: config.admin_token.clone(),
        }
    }

    /// Whether cluster replication is active at all (more than one replica).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.replicas > 1
    }

    /// The scheme used for peer-to-peer URLs.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.tls_enabled { "https" } else { "http" }
    }

    /// The DNS name of peer `ordinal`, per the headless-service pattern.
    #[must_use]
    pub fn peer_host(&self, ordinal: u32) -> String {
        format!(
            "{}-{}.{}.{}.svc.cluster.local",
            self.service_name, ordinal, self.headless_service_name, self.namespace
        )
    }

    /// The base admin URL (scheme + host + admin port) of peer `ordinal`.
    #[must_use]
    pub fn peer_admin_base(&self, ordinal: u32) -> String {
        format!("{}://{}:{}", self.scheme(), self.peer_host(ordinal), self.admin_port)
    }

    /// The base S3 URL (scheme + host + S3 port) of peer `ordinal`.
    #[must_use]
    pub fn peer_s3_base(&self, ordinal: u32) -> String {
        format!("{}://{}:{}", self.scheme(), self.peer_host(ordinal), self.s3_port)
    }

    /// The number of acknowledgements (including the leader) required for quorum.
    #[must_use]
    pub fn quorum(&self) -> usize {
        (self.replicas as usize) / 2 + 1
    }
}

/// Parse the ordinal suffix from a stateful-set pod name (`foo-2` -> `2`).
/// Defaults to 0 if absent or non-numeric.
#[must_use]
pub fn parse_ordinal(pod_name: &str) -> u32 {
    pod_name.rsplit('-').next().and_then(|suffix| suffix.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_ordinal_from_pod_name() {
        assert_eq!(parse_ordinal("pxobj-2"), 2);
        assert_eq!(parse_ordinal("pxobj-0"), 0);
    }

    #[test]
    fn test_should_default_ordinal_to_zero_when_unparseable() {
        assert_eq!(parse_ordinal(""), 0);
        assert_eq!(parse_ordinal("pxobj"), 0);
    }

    #[test]
    fn test_should_compute_quorum_for_three_replicas() {
        let config = ClusterConfig {
            self_ordinal: 0,
            replicas: 3,
            service_name: "pxobj".to_owned(),
            headless_service_name: "pxobj-headless".to_owned(),
            namespace: "default".to_owned(),
            s3_port: 9000,
            admin_port: 19000,
            tls_enabled: false,
            bearer_token: "tok".to_owned(),
        };
        assert_eq!(config.quorum(), 2);
        assert!(config.is_enabled());
    }

    #[test]
    fn test_should_build_peer_admin_base_url() {
        let config = ClusterConfig {
            self_ordinal: 0,
            replicas: 3,
            service_name: "pxobj".to_owned(),
            headless_service_name: "pxobj-headless".to_owned(),
            namespace: "prod".to_owned(),
            s3_port: 9000,
            admin_port: 19000,
            tls_enabled: true,
            bearer_token: "tok".to_owned(),
        };
        assert_eq!(
            config.peer_admin_base(1),
            "https://pxobj-1.pxobj-headless.prod.svc.cluster.local:19000"
        );
    }
}
