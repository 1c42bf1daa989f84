//! Process-wide configuration, loaded once from environment variables at
//! startup and never reloaded (see the "Global state" design note).

use anyhow::{Context, Result, bail};

/// TLS material and mode for the admin/replication and S3 listeners.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Whether TLS is enabled for the daemon's listeners.
    pub enabled: bool,
    /// Path to the PEM-encoded server certificate chain.
    pub cert_file: String,
    /// Path to the PEM-encoded server private key.
    pub key_file: String,
    /// Path to the PEM-encoded CA bundle used to verify peer client certificates.
    pub ca_file: String,
}

/// Process-wide configuration for the object daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory owned exclusively by this node's [`ruststack_store`]-like store.
    pub data_dir: String,
    /// Port the public S3 API listens on.
    pub s3_port: u16,
    /// Port the admin and internal replication API listens on.
    pub admin_port: u16,
    /// Shared bearer token required by the admin and replication APIs.
    pub admin_token: String,
    /// TLS configuration.
    pub tls: TlsConfig,
    /// This pod's name, used to derive its ordinal.
    pub pod_name: String,
    /// The Kubernetes namespace the pod runs in.
    pub pod_namespace: String,
    /// The stable service name used to build peer DNS names.
    pub service_name: String,
    /// The headless service name used to build peer DNS names.
    pub headless_service_name: String,
    /// Number of replicas (peers) in the cluster, including self.
    pub replicas: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "/data".to_owned(),
            s3_port: 9000,
            admin_port: 19000,
            admin_token: String::new(),
            tls: TlsConfig::default(),
            pod_name: String::new(),
            pod_namespace: "default".to_owned(),
            service_name: String::new(),
            headless_service_name: String::new(),
            replicas: 1,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `PXOBJ_ADMIN_TOKEN` is unset or empty, or if a
    /// numeric environment variable fails to parse. Both are fatal startup
    /// conditions.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("PXOBJ_DATA_DIR") {
            config.data_dir = v;
        }
        if let Ok(v) = std::env::var("PXOBJ_S3_PORT") {
            config.s3_port = v.parse().context("invalid PXOBJ_S3_PORT")?;
        }
        if let Ok(v) = std::env::var("PXOBJ_ADMIN_PORT") {
            config.admin_port = v.parse().context("invalid PXOBJ_ADMIN_PORT")?;
        }

        config.admin_token = std::env::var("PXOBJ_ADMIN_TOKEN").unwrap_or_default();
        if config.admin_token.is_empty() {
            bail!("PXOBJ_ADMIN_TOKEN must be set to a non-empty value");
        }

        config.tls.enabled = std::env::var("PXOBJ_TLS_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        config.tls.cert_file = std::env::var("PXOBJ_TLS_CERT_FILE").unwrap_or_default();
        config.tls.key_file = std::env::var("PXOBJ_TLS_KEY_FILE").unwrap_or_default();
        config.tls.ca_file = std::env::var("PXOBJ_TLS_CA_FILE").unwrap_or_default();

        config.pod_name = std::env::var("POD_NAME").unwrap_or_default();
        config.pod_namespace = std::env::var("POD_NAMESPACE").unwrap_or(config.pod_namespace);
        config.service_name = std::env::var("PXOBJ_SERVICE_NAME").unwrap_or_default();
        config.headless_service_name =
            std::env::var("PXOBJ_HEADLESS_SERVICE_NAME").unwrap_or_default();

        if let Ok(v) = std::env::var("PXOBJ_REPLICAS") {
            config.replicas = v.parse().context("invalid PXOBJ_REPLICAS")?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_use_default_ports() {
        let config = Config::default();
        assert_eq!(config.s3_port, 9000);
        assert_eq!(config.admin_port, 19000);
        assert_eq!(config.replicas, 1);
    }

    #[test]
    fn test_should_reject_missing_admin_token() {
        // Races against any other test reading PXOBJ_ADMIN_TOKEN concurrently; none does today.
        unsafe { std::env::remove_var("PXOBJ_ADMIN_TOKEN") };
        let result = Config::from_env();
        assert!(result.is_err());
    }
}
