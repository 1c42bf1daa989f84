//! The bearer-token-authenticated bucket/access-key lifecycle surface.
//!
//! | Method | Path                     | Body                              | Effect                                |
//! |--------|--------------------------|------------------------------------|----------------------------------------|
//! | POST   | `/admin/buckets`         | `{"name": ...}`                   | CreateBucket + replicate; 201         |
//! | DELETE | `/admin/buckets/<n>`     | —                                  | DeleteBucket + replicate; 204         |
//! | POST   | `/admin/access`          | `{"bucket": ..., "readOnly": ...}` | CreateAccess + replicate; AccessKey   |
//! | DELETE | `/admin/access/<ak>`     | —                                  | DeleteAccess + replicate; 204         |
//!
//! Every route shares the S3 Handler's proxy-to-leader and replicate
//! discipline for mutations, on top of a fixed bearer-token check.

use bytes::Bytes;
use http::{Method, StatusCode};
use ruststack_cluster::{Cluster, Surface};
use ruststack_core::{Error, Result as CoreResult};
use ruststack_store::AccessKey;
use serde::{Deserialize, Serialize};

use crate::http::{blocking, check_bearer, response};
use crate::state::AppState;

/// A mutation's (method, path, body) replayed verbatim against every peer's
/// Replication Handler once the local commit succeeds.
type ReplicationPayload = Option<(Method, String, Bytes)>;

#[derive(Debug, Deserialize)]
struct CreateBucketRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateAccessRequest {
    bucket: String,
    #[serde(rename = "readOnly")]
    read_only: bool,
}

#[derive(Debug, Clone, Serialize)]
struct AccessKeyResponse {
    #[serde(rename = "accessKey")]
    access_key: String,
    #[serde(rename = "secretKey")]
    secret_key: String,
    bucket: String,
    #[serde(rename = "readOnly")]
    read_only: bool,
}

impl From<AccessKey> for AccessKeyResponse {
    fn from(value: AccessKey) -> Self {
        Self { access_key: value.access_key, secret_key: value.secret_key, bucket: value.bucket, read_only: value.read_only }
    }
}

/// Handle one admin-surface request.
pub async fn handle(state: &AppState, parts: http::request::Parts, body: Bytes) -> http::Response<response::BoxBody> {
    if let Err(err) = check_bearer(state, &parts) {
        return response::plain_error_response(&err);
    }

    let method = parts.method.clone();
    let path = parts.uri.path().to_owned();
    let is_mutation = matches!(method, Method::POST | Method::DELETE);

    if state.cluster.is_enabled() && is_mutation && !Cluster::is_internal_replication(&parts.headers) {
        let leader = state.cluster.probe_leader().await;
        if !state.cluster.is_leader(leader) {
            return proxy_to_leader(state, leader, &parts, body).await;
        }
    }

    let (response, replication) = match execute(state, &method, &path, body).await {
        Ok(outcome) => outcome,
        Err(err) => return response::plain_error_response(&err),
    };

    if is_mutation && state.cluster.is_enabled() {
        if let Some((replicate_method, replicate_path, replicate_body)) = replication {
            if let Err(err) = state.cluster.replicate(replicate_method, &replicate_path, replicate_body).await {
                return response::plain_error_response(&err);
            }
        }
    }

    response
}

async fn proxy_to_leader(
    state: &AppState,
    leader: u32,
    parts: &http::request::Parts,
    body: Bytes,
) -> http::Response<response::BoxBody> {
    let path_and_query = parts.uri.path_and_query().map(http::uri::PathAndQuery::as_str).unwrap_or_else(|| parts.uri.path());

    match state
        .cluster
        .proxy_to_leader(leader, Surface::Admin, parts.method.clone(), path_and_query, &parts.headers, body)
        .await
    {
        Ok(proxied) => {
            let status = StatusCode::from_u16(proxied.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut builder = http::Response::builder().status(status);
            for (name, value) in &proxied.headers {
                builder = builder.header(name, value);
            }
            builder
                .body(response::BoxBody::new(proxied.body))
                .unwrap_or_else(|_| response::status_only(StatusCode::BAD_GATEWAY))
        }
        Err(err) => response::plain_error_response(&err),
    }
}

async fn execute(
    state: &AppState,
    method: &Method,
    path: &str,
    body: Bytes,
) -> CoreResult<(http::Response<response::BoxBody>, ReplicationPayload)> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::POST, ["admin", "buckets"]) => create_bucket(state, body).await,
        (&Method::DELETE, ["admin", "buckets", name]) => delete_bucket(state, name).await,
        (&Method::POST, ["admin", "access"]) => create_access(state, body).await,
        (&Method::DELETE, ["admin", "access", access_key]) => delete_access(state, access_key).await,
        _ => Err(Error::InvalidRequest("unsupported admin operation".to_owned())),
    }
}

async fn create_bucket(
    state: &AppState,
    body: Bytes,
) -> CoreResult<(http::Response<response::BoxBody>, ReplicationPayload)> {
    let request: CreateBucketRequest =
        serde_json::from_slice(&body).map_err(|err| Error::InvalidRequest(err.to_string()))?;

    let store = state.store.clone();
    let name = request.name.clone();
    blocking(move || store.create_bucket(&name)).await?;

    let replication = Some((Method::POST, format!("/_cluster/replicate/buckets/{}", request.name), Bytes::new()));
    Ok((response::status_only(StatusCode::CREATED), replication))
}

async fn delete_bucket(
    state: &AppState,
    name: &str,
) -> CoreResult<(http::Response<response::BoxBody>, ReplicationPayload)> {
    let store = state.store.clone();
    let name_owned = name.to_owned();
    blocking(move || store.delete_bucket(&name_owned)).await?;

    let replication = Some((Method::DELETE, format!("/_cluster/replicate/buckets/{name}"), Bytes::new()));
    Ok((response::status_only(StatusCode::NO_CONTENT), replication))
}

async fn create_access(
    state: &AppState,
    body: Bytes,
) -> CoreResult<(http::Response<response::BoxBody>, ReplicationPayload)> {
    let request: CreateAccessRequest =
        serde_json::from_slice(&body).map_err(|err| Error::InvalidRequest(err.to_string()))?;

    let store = state.store.clone();
    let bucket = request.bucket.clone();
    let access = blocking(move || store.create_access(&bucket, request.read_only)).await?;

    let payload = AccessKeyResponse::from(access);
    let replication_body =
        serde_json::to_vec(&payload).map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
    let replication = Some((Method::POST, "/_cluster/replicate/access".to_owned(), Bytes::from(replication_body)));

    Ok((response::json_response(StatusCode::CREATED, &payload), replication))
}

async fn delete_access(
    state: &AppState,
    access_key: &str,
) -> CoreResult<(http::Response<response::BoxBody>, ReplicationPayload)> {
    let store = state.store.clone();
    let access_key_owned = access_key.to_owned();
    blocking(move || store.delete_access(&access_key_owned)).await?;

    let replication = Some((Method::DELETE, format!("/_cluster/replicate/access/{access_key}"), Bytes::new()));
    Ok((response::status_only(StatusCode::NO_CONTENT), replication))
}
