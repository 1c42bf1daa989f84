//! TLS material loading and peer-certificate inspection for the admin and
//! replication listener.
//!
//! The S3 listener never requests a client certificate. The admin listener
//! requests one opportunistically (verify-if-given): an unauthenticated
//! connection is still accepted, but a presented certificate is verified
//! against the configured CA bundle. The Replication Handler then further
//! requires that a verified chain was actually presented.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use ruststack_core::TlsConfig;
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use x509_parser::extensions::ParsedExtension;

/// Build the `rustls::ServerConfig` for the public S3 listener.
///
/// # Errors
///
/// Returns an error if the certificate or key file cannot be read or parsed.
pub fn load_s3_server_config(tls: &TlsConfig) -> Result<Arc<rustls::ServerConfig>> {
    let certs = load_certs(&tls.cert_file)?;
    let key = load_private_key(&tls.key_file)?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("failed to build S3 TLS server config")?;
    Ok(Arc::new(config))
}

/// Build the `rustls::ServerConfig` for the admin/replication listener,
/// which verifies a presented client certificate against `tls.ca_file` but
/// does not require one.
///
/// # Errors
///
/// Returns an error if any TLS material cannot be read or parsed.
pub fn load_admin_server_config(tls: &TlsConfig) -> Result<Arc<rustls::ServerConfig>> {
    let certs = load_certs(&tls.cert_file)?;
    let key = load_private_key(&tls.key_file)?;

    let mut roots = RootCertStore::empty();
    for ca_cert in load_certs(&tls.ca_file)? {
        roots.add(ca_cert).context("invalid CA certificate in PXOBJ_TLS_CA_FILE")?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .context("failed to build client certificate verifier")?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .context("failed to build admin TLS server config")?;
    Ok(Arc::new(config))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificates in {path}"))
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("failed to parse private key in {path}"))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {path}"))
}

/// Extract the peer's certificate chain from a just-completed TLS
/// handshake on the admin listener, if the client presented one.
#[must_use]
pub fn peer_certificates<IO>(
    stream: &tokio_rustls::server::TlsStream<IO>,
) -> Option<Vec<CertificateDer<'static>>> {
    stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.iter().map(|cert| cert.clone().into_owned()).collect())
}

/// Whether the leaf certificate in `chain` permits TLS client
/// authentication: true if it carries no Extended Key Usage extension at
/// all (treated as permissive), or if that extension includes `clientAuth`.
#[must_use]
pub fn leaf_permits_client_auth(chain: &[CertificateDer<'static>]) -> bool {
    let Some(leaf) = chain.first() else { return false };
    let Ok((_, cert)) = x509_parser::parse_x509_certificate(leaf.as_ref()) else {
        return false;
    };

    for ext in cert.extensions() {
        if let ParsedExtension::ExtendedKeyUsage(eku) = ext.parsed_extension() {
            return eku.client_auth;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_reject_empty_chain() {
        assert!(!leaf_permits_client_auth(&[]));
    }
}
