//! The internal peer-replication surface.
//!
//! Requires the admin bearer token, the internal-replication marker header,
//! and (when TLS is enabled) a verified peer client certificate. Applies
//! mutations to the local store only and never re-replicates or proxies.
//!
//! `GET /_cluster/health` shares this listener's bearer check — it is the
//! endpoint `Cluster::probe_leader` polls to pick a leader — and needs
//! neither the marker header nor a client certificate.

use bytes::Bytes;
use http::{Method, StatusCode};
use ruststack_cluster::Cluster;
use ruststack_core::{Error, Result as CoreResult};
use ruststack_store::AccessKey;
use rustls::pki_types::CertificateDer;
use serde::Deserialize;

use crate::http::{blocking, check_bearer, response};
use crate::state::AppState;
use crate::tls::leaf_permits_client_auth;

#[derive(Debug, Deserialize)]
struct ReplicatedAccessKey {
    #[serde(rename = "accessKey")]
    access_key: String,
    #[serde(rename = "secretKey")]
    secret_key: String,
    bucket: String,
    #[serde(rename = "readOnly")]
    read_only: bool,
}

impl From<ReplicatedAccessKey> for AccessKey {
    fn from(value: ReplicatedAccessKey) -> Self {
        Self {
            access_key: value.access_key,
            secret_key: value.secret_key,
            bucket: value.bucket,
            read_only: value.read_only,
        }
    }
}

/// Handle one replication-surface request, including the shared health check.
pub async fn handle(
    state: &AppState,
    peer_certs: Option<&[CertificateDer<'static>]>,
    parts: http::request::Parts,
    body: Bytes,
) -> http::Response<response::BoxBody> {
    if let Err(err) = check_bearer(state, &parts) {
        return response::plain_error_response(&err);
    }

    let path = parts.uri.path();
    if path == "/_cluster/health" {
        return response::text_ok("ok");
    }

    if !Cluster::is_internal_replication(&parts.headers) {
        return response::forbidden_text("missing internal replication marker");
    }

    if let Err(err) = verify_peer_certificate(state, peer_certs) {
        return response::forbidden_text(&err.to_string());
    }

    match execute(state, &parts.method, path, body).await {
        Ok(response) => response,
        Err(err) => response::plain_error_response(&err),
    }
}

/// Gate on a verified peer client certificate. Skipped entirely when TLS is
/// disabled, since there is then no handshake to have verified anything
/// against (development and single-node deployments).
fn verify_peer_certificate(
    state: &AppState,
    peer_certs: Option<&[CertificateDer<'static>]>,
) -> CoreResult<()> {
    if !state.config.tls.enabled {
        return Ok(());
    }

    let chain = peer_certs.filter(|chain| !chain.is_empty());
    match chain {
        Some(chain) if leaf_permits_client_auth(chain) => Ok(()),
        _ => Err(Error::Forbidden("mTLS required".to_owned())),
    }
}

async fn execute(
    state: &AppState,
    method: &Method,
    path: &str,
    body: Bytes,
) -> CoreResult<http::Response<response::BoxBody>> {
    let segments: Vec<&str> = path.trim_start_matches('/').splitn(4, '/').collect();

    match (method, segments.as_slice()) {
        (&Method::POST, ["_cluster", "replicate", "buckets", name]) => create_bucket(state, name).await,
        (&Method::DELETE, ["_cluster", "replicate", "buckets", name]) => delete_bucket(state, name).await,
        (&Method::PUT, ["_cluster", "replicate", "objects", rest]) => put_object(state, rest, body).await,
        (&Method::DELETE, ["_cluster", "replicate", "objects", rest]) => delete_object(state, rest).await,
        (&Method::POST, ["_cluster", "replicate", "access"]) => create_access(state, body).await,
        (&Method::DELETE, ["_cluster", "replicate", "access", access_key]) => {
            delete_access(state, access_key).await
        }
        _ => Err(Error::InvalidRequest("unsupported replication operation".to_owned())),
    }
}

async fn create_bucket(state: &AppState, name: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let name = name.to_owned();
    blocking(move || store.create_bucket(&name)).await?;
    Ok(response::status_only(StatusCode::CREATED))
}

async fn delete_bucket(state: &AppState, name: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let name = name.to_owned();
    match blocking(move || store.delete_bucket(&name)).await {
        Ok(()) => Ok(response::status_only(StatusCode::NO_CONTENT)),
        Err(Error::NotFound { .. }) => Ok(response::status_only(StatusCode::NO_CONTENT)),
        Err(err) => Err(err),
    }
}

fn split_bucket_key(rest: &str) -> CoreResult<(&str, &str)> {
    rest.split_once('/').ok_or_else(|| Error::InvalidRequest("missing object key".to_owned()))
}

async fn put_object(state: &AppState, rest: &str, body: Bytes) -> CoreResult<http::Response<response::BoxBody>> {
    let (bucket, key) = split_bucket_key(rest)?;
    let store = state.store.clone();
    let bucket = bucket.to_owned();
    let key = key.to_owned();
    blocking(move || store.put_object(&bucket, &key, body.as_ref())).await?;
    Ok(response::status_only(StatusCode::OK))
}

async fn delete_object(state: &AppState, rest: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let (bucket, key) = split_bucket_key(rest)?;
    let store = state.store.clone();
    let bucket = bucket.to_owned();
    let key = key.to_owned();
    blocking(move || store.delete_object(&bucket, &key)).await?;
    Ok(response::status_only(StatusCode::NO_CONTENT))
}

async fn create_access(state: &AppState, body: Bytes) -> CoreResult<http::Response<response::BoxBody>> {
    let payload: ReplicatedAccessKey =
        serde_json::from_slice(&body).map_err(|err| Error::InvalidRequest(err.to_string()))?;
    let store = state.store.clone();
    let access_key: AccessKey = payload.into();
    blocking(move || store.put_access(access_key)).await?;
    Ok(response::status_only(StatusCode::CREATED))
}

async fn delete_access(state: &AppState, access_key: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let access_key = access_key.to_owned();
    blocking(move || store.delete_access(&access_key)).await?;
    Ok(response::status_only(StatusCode::NO_CONTENT))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruststack_cluster::{Cluster, ClusterConfig, INTERNAL_REPLICATION_HEADER};
    use ruststack_core::Config;
    use ruststack_store::Store;

    use super::*;

    fn test_state(dir: &std::path::Path) -> AppState {
        let store = Arc::new(Store::open(dir).unwrap());
        let mut config = Config::default();
        config.admin_token = "test-token".to_owned();
        let cluster = Arc::new(Cluster::new(ClusterConfig::from_core_config(&config)).unwrap());
        AppState::new(store, cluster, Arc::new(config))
    }

    fn request_parts(method: &str, path: &str, bearer: Option<&str>, marked: bool) -> http::request::Parts {
        let mut builder = http::Request::builder().method(method).uri(path);
        if let Some(token) = bearer {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if marked {
            builder = builder.header(INTERNAL_REPLICATION_HEADER, "true");
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn test_should_return_ok_health_check_after_bearer_check() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let parts = request_parts("GET", "/_cluster/health", Some("test-token"), false);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_should_reject_health_check_without_bearer() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let parts = request_parts("GET", "/_cluster/health", None, false);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_should_reject_replication_without_marker_header() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let parts = request_parts("POST", "/_cluster/replicate/buckets/demo", Some("test-token"), false);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_should_apply_bucket_create_and_delete_locally() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let parts = request_parts("POST", "/_cluster/replicate/buckets/demo", Some("test-token"), true);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(state.store.list_buckets().len(), 1);

        let parts = request_parts("DELETE", "/_cluster/replicate/buckets/demo", Some("test-token"), true);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_should_delete_missing_bucket_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let parts = request_parts("DELETE", "/_cluster/replicate/buckets/missing", Some("test-token"), true);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_should_replicate_put_object_with_slash_in_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.create_bucket("demo").unwrap();

        let parts =
            request_parts("PUT", "/_cluster/replicate/objects/demo/a/b.txt", Some("test-token"), true);
        let response = handle(&state, None, parts, Bytes::from_static(b"hi")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.store.get_object_meta("demo", "a/b.txt").is_ok());
    }

    #[tokio::test]
    async fn test_should_replicate_access_key_creation() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.create_bucket("demo").unwrap();

        let body = serde_json::json!({
            "accessKey": "PXAAAAAAAAAAAAAAAAAA",
            "secretKey": "a".repeat(64),
            "bucket": "demo",
            "readOnly": false,
        })
        .to_string();

        let parts = request_parts("POST", "/_cluster/replicate/access", Some("test-token"), true);
        let response = handle(&state, None, parts, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(state.store.lookup_access_key("PXAAAAAAAAAAAAAAAAAA").is_ok());
    }

    #[tokio::test]
    async fn test_should_require_mtls_when_tls_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(dir.path());
        let mut config = (*state.config).clone();
        config.tls.enabled = true;
        state.config = Arc::new(config);

        let parts = request_parts("POST", "/_cluster/replicate/buckets/demo", Some("test-token"), true);
        let response = handle(&state, None, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
