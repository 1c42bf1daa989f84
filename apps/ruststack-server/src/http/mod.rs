//! HTTP surfaces: S3, admin, and internal replication.

pub mod admin;
pub mod replication;
pub mod response;
pub mod s3;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use ruststack_core::{Error, Result as CoreResult};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Buffer an inbound request body to memory.
///
/// The daemon never streams request bodies: `PutObject` hashes while
/// writing to disk, and replication buffers the full payload for
/// retransmission. Very large payloads are out of scope (see design notes).
pub async fn read_body(body: Incoming) -> Result<Bytes, hyper::Error> {
    Ok(body.collect().await?.to_bytes())
}

/// Run a blocking [`ruststack_store::Store`] (or other synchronous I/O) call
/// on the blocking thread pool, matching the store's "blocking from the
/// handler's view" concurrency model.
pub async fn blocking<F, T>(f: F) -> ruststack_core::Result<T>
where
    F: FnOnce() -> ruststack_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) => Err(ruststack_core::Error::Internal(anyhow::anyhow!(err))),
    }
}

/// Check the fixed bearer token shared by the admin and replication
/// surfaces, comparing in constant time.
pub fn check_bearer(state: &AppState, parts: &http::request::Parts) -> CoreResult<()> {
    let expected = format!("Bearer {}", state.config.admin_token);
    let provided = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}
