//! Error types for SigV4 authentication.
//!
//! All authentication failures are represented by [`AuthError`]. Callers map
//! every variant to the same opaque `AccessDenied` response; the variants
//! exist for logging and testing, not differentiated client-facing behavior.

/// Errors that can occur during AWS Signature Version 4 authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The signing algorithm is not supported (only AWS4-HMAC-SHA256 is supported).
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The credential scope's service component was not `s3`.
    #[error("Unsupported service: {0}")]
    UnsupportedService(String),

    /// A required HTTP header referenced in `SignedHeaders` is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The `Credential` component does not match the expected format
    /// (`AKID/date/region/service/aws4_request`).
    #[error("Invalid credential format")]
    InvalidCredential,

    /// The access key ID was not found in the credential store.
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,
}
