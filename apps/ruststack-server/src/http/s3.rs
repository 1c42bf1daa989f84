//! The public S3 REST surface: bucket and object operations, behind SigV4.
//!
//! Route matrix (method, bucket present, key present):
//!
//! | Method | Bucket  | Key     | Operation                        |
//! |--------|---------|---------|-----------------------------------|
//! | GET    | absent  | -       | ListBuckets                       |
//! | PUT    | present | absent  | CreateBucket                     |
//! | DELETE | present | absent  | DeleteBucket                     |
//! | GET    | present | absent  | ListObjectsV2 (`list-type=2`)     |
//! | PUT    | present | present | PutObject                         |
//! | GET    | present | present | GetObject                         |
//! | HEAD   | present | present | HeadObject                        |
//! | DELETE | present | present | DeleteObject                      |
//!
//! Every request is SigV4-verified, scope- and read-only-checked, then
//! proxied to the leader if this node is not it. A leader executes locally
//! and, for mutations, replicates to a majority of peers before returning.

use std::io::Read;

use bytes::Bytes;
use http::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use ruststack_cluster::{Cluster, Surface};
use ruststack_core::{Error, Result as CoreResult};
use ruststack_s3_auth::{AuthResult, UNSIGNED_PAYLOAD, verify_sigv4};
use ruststack_s3_xml::{Bucket, ListAllMyBucketsResult, ListBucketResult, Object, Owner, to_xml};

use crate::http::{blocking, response};
use crate::state::AppState;

/// Handle one S3-surface request.
pub async fn handle(state: &AppState, parts: http::request::Parts, body: Bytes) -> http::Response<response::BoxBody> {
    let body_hash = content_sha256_header(&parts.headers);

    let auth = match verify_sigv4(&parts, &body_hash, state.credentials.as_ref()) {
        Ok(auth) => auth,
        Err(err) => {
            tracing::debug!(error = %err, "sigv4 verification failed");
            return response::s3_error_response(&Error::AccessDenied, Some(parts.uri.path()));
        }
    };

    let path = parts.uri.path().to_owned();
    let (bucket, key) = parse_bucket_key(&path);

    if let Some(ref name) = bucket {
        if *name != auth.bucket {
            return response::s3_error_response(&Error::AccessDenied, Some(&path));
        }
    }

    let method = parts.method.clone();
    let is_mutation = matches!(method, Method::PUT | Method::DELETE);

    if auth.read_only && is_mutation {
        return response::s3_error_response(&Error::AccessDenied, Some(&path));
    }

    if state.cluster.is_enabled()
        && is_mutation
        && bucket.is_some()
        && !Cluster::is_internal_replication(&parts.headers)
    {
        let leader = state.cluster.probe_leader().await;
        if !state.cluster.is_leader(leader) {
            return proxy_to_leader(state, leader, &parts, body).await;
        }
    }

    let outcome = execute(state, &method, bucket.as_deref(), key.as_deref(), &parts, &auth, body.clone()).await;

    let response = match outcome {
        Ok(response) => response,
        Err(err) => return response::s3_error_response(&err, Some(&path)),
    };

    if is_mutation && bucket.is_some() && state.cluster.is_enabled() {
        if let Some((replicate_method, replicate_path, replicate_body)) =
            replication_payload(&method, bucket.as_deref(), key.as_deref(), body)
        {
            if let Err(err) = state.cluster.replicate(replicate_method, &replicate_path, replicate_body).await {
                return response::s3_error_response(&err, Some(&path));
            }
        }
    }

    response
}

fn content_sha256_header(headers: &http::HeaderMap) -> String {
    headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| UNSIGNED_PAYLOAD.to_owned())
}

/// Split `/bucket/key/with/slashes` into `(Some("bucket"), Some("key/with/slashes"))`.
/// The root path `/` yields `(None, None)`, and `/bucket` yields `(Some("bucket"), None)`.
fn parse_bucket_key(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return (None, None);
    }
    match trimmed.split_once('/') {
        Some((bucket, key)) if !key.is_empty() => (Some(bucket.to_owned()), Some(key.to_owned())),
        Some((bucket, _)) => (Some(bucket.to_owned()), None),
        None => (Some(trimmed.to_owned()), None),
    }
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let mut iter = pair.splitn(2, '=');
        let name = iter.next().unwrap_or("");
        if name == key {
            let value = iter.next().unwrap_or("");
            return Some(percent_decode_str(value).decode_utf8_lossy().into_owned());
        }
    }
    None
}

/// Format a timestamp as an HTTP-date (RFC 1123, UTC), as required for the
/// `Last-Modified` header.
fn http_date(value: &chrono::DateTime<chrono::Utc>) -> String {
    value.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn is_list_objects_v2(parts: &http::request::Parts) -> bool {
    query_param(parts.uri.query(), "list-type").as_deref() == Some("2")
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
        .proxy_to_leader(leader, Surface::S3, parts.method.clone(), path_and_query, &parts.headers, body)
        .await
    {
        Ok(proxied) => build_proxied_response(proxied),
        Err(err) => response::s3_error_response(&err, Some(parts.uri.path())),
    }
}

fn build_proxied_response(proxied: ruststack_cluster::ProxiedResponse) -> http::Response<response::BoxBody> {
    let status = StatusCode::from_u16(proxied.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = http::Response::builder().status(status);
    for (name, value) in &proxied.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(response::BoxBody::new(proxied.body))
        .unwrap_or_else(|_| response::status_only(StatusCode::BAD_GATEWAY))
}

async fn execute(
    state: &AppState,
    method: &Method,
    bucket: Option<&str>,
    key: Option<&str>,
    parts: &http::request::Parts,
    auth: &AuthResult,
    body: Bytes,
) -> CoreResult<http::Response<response::BoxBody>> {
    match (method, bucket, key) {
        (&Method::GET, None, None) => list_buckets(state, auth).await,
        (&Method::PUT, Some(bucket), None) => create_bucket(state, bucket).await,
        (&Method::DELETE, Some(bucket), None) => delete_bucket(state, bucket).await,
        (&Method::GET, Some(bucket), None) if is_list_objects_v2(parts) => {
            list_objects_v2(state, bucket, parts).await
        }
        (&Method::PUT, Some(bucket), Some(key)) => put_object(state, bucket, key, body).await,
        (&Method::GET, Some(bucket), Some(key)) => get_object(state, bucket, key).await,
        (&Method::HEAD, Some(bucket), Some(key)) => head_object(state, bucket, key).await,
        (&Method::DELETE, Some(bucket), Some(key)) => delete_object(state, bucket, key).await,
        _ => Err(Error::InvalidRequest("unsupported S3 operation".to_owned())),
    }
}

async fn list_buckets(state: &AppState, auth: &AuthResult) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let buckets = blocking(move || Ok(store.list_buckets())).await?;

    let bound_bucket = auth.bucket.clone();
    let matched: Vec<Bucket> = buckets
        .into_iter()
        .filter(|(name, _)| *name == bound_bucket)
        .map(|(name, created_at)| Bucket { name, creation_date: created_at })
        .collect();

    let result = ListAllMyBucketsResult {
        owner: Owner { id: auth.access_key_id.clone(), display_name: auth.access_key_id.clone() },
        buckets: matched,
    };
    let xml = to_xml("ListAllMyBucketsResult", &result).map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
    Ok(response::xml_ok(xml))
}

async fn create_bucket(state: &AppState, bucket: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    blocking(move || store.create_bucket(&bucket_owned)).await?;
    Ok(response::status_only(StatusCode::OK))
}

async fn delete_bucket(state: &AppState, bucket: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    blocking(move || store.delete_bucket(&bucket_owned)).await?;
    Ok(response::status_only(StatusCode::NO_CONTENT))
}

async fn list_objects_v2(
    state: &AppState,
    bucket: &str,
    parts: &http::request::Parts,
) -> CoreResult<http::Response<response::BoxBody>> {
    let prefix = query_param(parts.uri.query(), "prefix").unwrap_or_default();
    let continuation_token = query_param(parts.uri.query(), "continuation-token");
    let max_keys = query_param(parts.uri.query(), "max-keys").and_then(|v| v.parse::<usize>().ok());

    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    let prefix_owned = prefix.clone();
    let continuation_owned = continuation_token.clone();
    let page = blocking(move || {
        store.list_objects_v2(&bucket_owned, &prefix_owned, continuation_owned.as_deref(), max_keys)
    })
    .await?;

    let contents: Vec<Object> = page
        .entries
        .into_iter()
        .map(|(key, record)| Object {
            key,
            last_modified: record.last_modified,
            etag: format!("\"{}\"", record.etag),
            size: record.size,
        })
        .collect();
    let key_count = contents.len();

    let result = ListBucketResult {
        name: bucket.to_owned(),
        prefix,
        key_count,
        max_keys: max_keys.unwrap_or(1000).clamp(1, 1000),
        is_truncated: page.truncated,
        continuation_token,
        next_continuation_token: page.next_continuation_token,
        contents,
    };

    let xml = to_xml("ListBucketResult", &result).map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
    Ok(response::xml_ok(xml))
}

async fn put_object(
    state: &AppState,
    bucket: &str,
    key: &str,
    body: Bytes,
) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    let key_owned = key.to_owned();
    let record = blocking(move || store.put_object(&bucket_owned, &key_owned, body.as_ref())).await?;

    Ok(http::Response::builder()
        .status(StatusCode::OK)
        .header(http::header::ETAG, format!("\"{}\"", record.etag))
        .body(response::BoxBody::new(Bytes::new()))
        .expect("status and static header are always valid"))
}

async fn get_object(state: &AppState, bucket: &str, key: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    let key_owned = key.to_owned();
    let (record, contents) = blocking(move || {
        let (record, mut file) = store.open_object(&bucket_owned, &key_owned)?;
        let mut buf = Vec::with_capacity(record.size as usize);
        file.read_to_end(&mut buf).map_err(Error::Io)?;
        Ok((record, buf))
    })
    .await?;

    Ok(http::Response::builder()
        .status(StatusCode::OK)
        .header(http::header::ETAG, format!("\"{}\"", record.etag))
        .header(http::header::CONTENT_LENGTH, record.size)
        .header(http::header::LAST_MODIFIED, http_date(&record.last_modified))
        .body(response::BoxBody::new(Bytes::from(contents)))
        .expect("status and static headers are always valid"))
}

async fn head_object(state: &AppState, bucket: &str, key: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    let key_owned = key.to_owned();
    let record = blocking(move || store.get_object_meta(&bucket_owned, &key_owned)).await?;

    Ok(http::Response::builder()
        .status(StatusCode::OK)
        .header(http::header::ETAG, format!("\"{}\"", record.etag))
        .header(http::header::CONTENT_LENGTH, record.size)
        .header(http::header::LAST_MODIFIED, http_date(&record.last_modified))
        .body(response::BoxBody::new(Bytes::new()))
        .expect("status and static headers are always valid"))
}

async fn delete_object(state: &AppState, bucket: &str, key: &str) -> CoreResult<http::Response<response::BoxBody>> {
    let store = state.store.clone();
    let bucket_owned = bucket.to_owned();
    let key_owned = key.to_owned();
    blocking(move || store.delete_object(&bucket_owned, &key_owned)).await?;
    Ok(response::status_only(StatusCode::NO_CONTENT))
}

/// Build the `(method, path, body)` triple replicated to peers for a
/// completed local mutation, or `None` if `method`/`bucket`/`key` do not
/// describe a replicated S3 mutation.
fn replication_payload(
    method: &Method,
    bucket: Option<&str>,
    key: Option<&str>,
    body: Bytes,
) -> Option<(Method, String, Bytes)> {
    match (method, bucket, key) {
        (&Method::PUT, Some(bucket), None) => {
            Some((Method::POST, format!("/_cluster/replicate/buckets/{bucket}"), Bytes::new()))
        }
        (&Method::DELETE, Some(bucket), None) => {
            Some((Method::DELETE, format!("/_cluster/replicate/buckets/{bucket}"), Bytes::new()))
        }
        (&Method::PUT, Some(bucket), Some(key)) => {
            Some((Method::PUT, format!("/_cluster/replicate/objects/{bucket}/{key}"), body))
        }
        (&Method::DELETE, Some(bucket), Some(key)) => {
            Some((Method::DELETE, format!("/_cluster/replicate/objects/{bucket}/{key}"), Bytes::new()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruststack_cluster::{Cluster, ClusterConfig};
    use ruststack_core::Config;
    use ruststack_s3_auth::hash_payload;
    use ruststack_store::Store;

    use super::*;

    #[test]
    fn test_should_parse_bucket_and_key_from_path() {
        assert_eq!(parse_bucket_key("/"), (None, None));
        assert_eq!(parse_bucket_key("/demo"), (Some("demo".to_owned()), None));
        assert_eq!(
            parse_bucket_key("/demo/a/b.txt"),
            (Some("demo".to_owned()), Some("a/b.txt".to_owned()))
        );
    }

    #[test]
    fn test_should_extract_query_param() {
        assert_eq!(query_param(Some("list-type=2&prefix=a%2Fb"), "list-type").as_deref(), Some("2"));
        assert_eq!(query_param(Some("list-type=2&prefix=a%2Fb"), "prefix").as_deref(), Some("a/b"));
        assert_eq!(query_param(Some("list-type=2"), "max-keys"), None);
        assert_eq!(query_param(None, "prefix"), None);
    }

    #[test]
    fn test_should_build_replication_payload_for_put_object() {
        let (method, path, body) =
            replication_payload(&Method::PUT, Some("demo"), Some("k"), Bytes::from_static(b"v")).unwrap();
        assert_eq!(method, Method::PUT);
        assert_eq!(path, "/_cluster/replicate/objects/demo/k");
        assert_eq!(body, Bytes::from_static(b"v"));
    }

    #[test]
    fn test_should_build_replication_payload_for_create_bucket_as_post() {
        let (method, path, _body) = replication_payload(&Method::PUT, Some("demo"), None, Bytes::new()).unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/_cluster/replicate/buckets/demo");
    }

    #[test]
    fn test_should_skip_replication_payload_for_reads() {
        assert!(replication_payload(&Method::GET, Some("demo"), Some("k"), Bytes::new()).is_none());
    }

    fn test_state(dir: &std::path::Path) -> AppState {
        let store = Arc::new(Store::open(dir).unwrap());
        let mut config = Config::default();
        config.admin_token = "test-token".to_owned();
        let cluster = Arc::new(Cluster::new(ClusterConfig::from_core_config(&config)).unwrap());
        AppState::new(store, cluster, Arc::new(config))
    }

    fn signed_parts(
        state: &AppState,
        method: &str,
        path: &str,
        access_key: &str,
        secret_key: &str,
        body: &[u8],
    ) -> http::request::Parts {
        let payload_hash = hash_payload(body);
        let (mut parts, _) = http::Request::builder()
            .method(method)
            .uri(format!("http://127.0.0.1:9000{path}"))
            .header("host", "127.0.0.1:9000")
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", "20240101T000000Z")
            .body(())
            .unwrap()
            .into_parts();

        let signed_headers = ["host", "x-amz-content-sha256", "x-amz-date"];
        let header_pairs: Vec<(&str, &str)> = signed_headers
            .iter()
            .map(|name| {
                let value = parts.headers.get(*name).unwrap().to_str().unwrap();
                (*name, value)
            })
            .collect();
        let canonical = ruststack_s3_auth::canonical::build_canonical_request(
            method,
            path.split('?').next().unwrap(),
            path.split_once('?').map(|(_, q)| q).unwrap_or(""),
            &header_pairs,
            &signed_headers,
            &payload_hash,
        );
        use sha2::Digest;
        let canonical_hash = hex::encode(sha2::Sha256::digest(canonical.as_bytes()));
        let string_to_sign =
            format!("AWS4-HMAC-SHA256\n20240101T000000Z\n20240101/us-east-1/s3/aws4_request\n{canonical_hash}");

        use hmac::{Hmac, Mac};
        type HmacSha256 = Hmac<sha2::Sha256>;
        let mut mac = HmacSha256::new_from_slice(format!("AWS4{secret_key}").as_bytes()).unwrap();
        mac.update(b"20240101");
        let date_key = mac.finalize().into_bytes();
        let mut mac = HmacSha256::new_from_slice(&date_key).unwrap();
        mac.update(b"us-east-1");
        let region_key = mac.finalize().into_bytes();
        let mut mac = HmacSha256::new_from_slice(&region_key).unwrap();
        mac.update(b"s3");
        let service_key = mac.finalize().into_bytes();
        let mut mac = HmacSha256::new_from_slice(&service_key).unwrap();
        mac.update(b"aws4_request");
        let signing_key = mac.finalize().into_bytes();
        let mut mac = HmacSha256::new_from_slice(&signing_key).unwrap();
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let auth_value = format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/20240101/us-east-1/s3/aws4_request,SignedHeaders=host;x-amz-content-sha256;x-amz-date,Signature={signature}"
        );
        parts.headers.insert(http::header::AUTHORIZATION, http::HeaderValue::from_str(&auth_value).unwrap());
        let _ = state;
        parts
    }

    #[tokio::test]
    async fn test_should_round_trip_put_and_get_object() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.create_bucket("demo").unwrap();
        let access = state.store.create_access("demo", false).unwrap();

        let put_parts = signed_parts(&state, "PUT", "/demo/hello.txt", &access.access_key, &access.secret_key, b"hi");
        let put_response = handle(&state, put_parts, Bytes::from_static(b"hi")).await;
        assert_eq!(put_response.status(), StatusCode::OK);

        let get_parts = signed_parts(&state, "GET", "/demo/hello.txt", &access.access_key, &access.secret_key, b"");
        let get_response = handle(&state, get_parts, Bytes::new()).await;
        assert_eq!(get_response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_should_deny_access_to_unscoped_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.create_bucket("demo").unwrap();
        state.store.create_bucket("other").unwrap();
        let access = state.store.create_access("demo", false).unwrap();

        let parts = signed_parts(&state, "GET", "/other", &access.access_key, &access.secret_key, b"");
        let response = handle(&state, parts, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_should_deny_mutation_for_read_only_credential() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.store.create_bucket("demo").unwrap();
        let access = state.store.create_access("demo", true).unwrap();

        let parts = signed_parts(&state, "PUT", "/demo/k", &access.access_key, &access.secret_key, b"v");
        let response = handle(&state, parts, Bytes::from_static(b"v")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
