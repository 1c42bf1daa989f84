//! Response-building helpers shared by the S3, admin, and replication handlers.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use ruststack_core::Error;

/// The response body type returned by every handler in this daemon.
pub type BoxBody = Full<Bytes>;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique, monotonically increasing request ID for S3
/// error bodies. Not globally unique across restarts; sufficient for
/// correlating a single node's logs with its error responses.
fn next_request_id() -> String {
    format!("tx{:016x}", REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Build an S3-style XML error response from a daemon error.
#[must_use]
pub fn s3_error_response(err: &Error, resource: Option<&str>) -> Response<BoxBody> {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ruststack_s3_xml::error_to_xml(err.s3_code(), &err.to_string(), resource, &next_request_id());

    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(Full::new(Bytes::from(body)))
        .expect("status and static header are always valid")
}

/// Build a plain-text or JSON error response for the admin/replication
/// surfaces, which do not speak S3 XML.
#[must_use]
pub fn plain_error_response(err: &Error) -> Response<BoxBody> {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "error": err.to_string() }).to_string();

    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("status and static header are always valid")
}

/// Build a `403 Forbidden` with a literal plain-text message (used by the
/// replication handler's mTLS gate, whose body must contain `mTLS required`).
#[must_use]
pub fn forbidden_text(message: &str) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(message.to_owned())))
        .expect("status and static header are always valid")
}

/// Build a `200 OK` plain-text response (used by the shared health check).
#[must_use]
pub fn text_ok(body: &str) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(body.to_owned())))
        .expect("status and static header are always valid")
}

/// Build a bare-status response with no body.
#[must_use]
pub fn status_only(status: StatusCode) -> Response<BoxBody> {
    Response::builder().status(status).body(Full::new(Bytes::new())).expect("status is always valid")
}

/// Build a `200 OK` XML response.
#[must_use]
pub fn xml_ok(body: Vec<u8>) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(Full::new(Bytes::from(body)))
        .expect("status and static header are always valid")
}

/// Build a JSON response with the given status.
#[must_use]
pub fn json_response(status: StatusCode, value: &impl serde::Serialize) -> Response<BoxBody> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("status and static header are always valid")
}
