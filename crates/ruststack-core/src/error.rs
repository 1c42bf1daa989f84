//! The error taxonomy shared by the store, cluster, and HTTP surfaces.
//!
//! Every fallible operation in the daemon eventually resolves to one of these
//! variants so that a handler can map it to an HTTP status and an S3 error
//! code (or a plain status for the admin/replication surfaces) without
//! re-deriving the policy at each call site.

/// The kind of entity that was not found, used to pick the right S3 error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// A bucket name has no corresponding bucket.
    Bucket,
    /// An object key has no corresponding record within an existing bucket.
    Object,
    /// An access key string has no corresponding credential record.
    AccessKey,
}

/// Daemon-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bucket name failed the naming rules in the data model.
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    /// A request body or parameter was malformed (empty key, bad JSON, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The named entity does not exist.
    #[error("not found: {name}")]
    NotFound {
        /// What kind of entity was missing.
        kind: NotFoundKind,
        /// The bucket or key name that was looked up.
        name: String,
    },

    /// A bucket delete was attempted while it still contained objects.
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// SigV4 verification failed, the credential's bucket scope did not
    /// match the target bucket, or a read-only credential attempted a
    /// mutation.
    #[error("access denied")]
    AccessDenied,

    /// The admin bearer token was missing or incorrect.
    #[error("unauthorized")]
    Unauthorized,

    /// The replication endpoint rejected the request (missing internal
    /// marker header or unverified peer certificate).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Synchronous replication did not reach quorum.
    #[error("quorum not reached: {acked}/{required} peers acknowledged")]
    Quorum {
        /// Acknowledgements required for quorum (including the leader).
        required: usize,
        /// Acknowledgements actually received.
        acked: usize,
    },

    /// The leader could not be reached while proxying a mutation.
    #[error("proxy to leader failed: {0}")]
    Proxy(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other unexpected internal condition.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The HTTP status code this error should surface as.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidBucketName(_) | Self::InvalidRequest(_) => 400,
            Self::NotFound { .. } => 404,
            Self::BucketNotEmpty(_) => 409,
            Self::AccessDenied => 403,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::Quorum { .. } | Self::Proxy(_) => 503,
            Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// The S3 error code for this error, as used in the `<Code>` element of
    /// an S3 `<Error>` response body.
    #[must_use]
    pub fn s3_code(&self) -> &'static str {
        match self {
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::NotFound { kind: NotFoundKind::Bucket, .. } => "NoSuchBucket",
            Self::NotFound { .. } => "NoSuchKey",
            Self::BucketNotEmpty(_) => "BucketNotEmpty",
            Self::AccessDenied | Self::Unauthorized | Self::Forbidden(_) => "AccessDenied",
            Self::Quorum { .. } | Self::Proxy(_) => "ServiceUnavailable",
            Self::Io(_) | Self::Internal(_) => "InternalError",
        }
    }
}
