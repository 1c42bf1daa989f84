//! Credential provider trait and implementations.
//!
//! This module defines the [`CredentialProvider`] trait for resolving an
//! access key to its secret key, bound bucket, and read-only flag, along
//! with a [`StaticCredentialProvider`] for testing.

use std::collections::HashMap;

use crate::error::AuthError;

/// A resolved access key record: its secret, bound bucket, and scope.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The hex-encoded secret key used to derive the signing key.
    pub secret_key: String,
    /// The single bucket this access key is scoped to.
    pub bucket: String,
    /// Whether this access key may only perform read operations.
    pub read_only: bool,
}

/// Trait for resolving an access key to its [`Credential`] record.
///
/// Implementations typically delegate to the object store's access-key
/// table; see the daemon binary for the production implementation.
pub trait CredentialProvider: Send + Sync {
    /// Resolve the credential record for the given access key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AccessKeyNotFound`] if the access key is not
    /// recognized.
    fn resolve(&self, access_key_id: &str) -> Result<Credential, AuthError>;
}

/// A simple in-memory credential provider backed by a `HashMap`.
///
/// Suitable for testing. Production code resolves credentials through the
/// object store's access-key table instead.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, Credential>,
}

impl StaticCredentialProvider {
    /// Create a new `StaticCredentialProvider` from an iterable of
    /// `(access_key_id, credential)` pairs.
    pub fn new(credentials: impl IntoIterator<Item = (String, Credential)>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn resolve(&self, access_key_id: &str) -> Result<Credential, AuthError> {
        self.credentials
            .get(access_key_id)
            .cloned()
            .ok_or_else(|| AuthError::AccessKeyNotFound(access_key_id.to_owned()))
    }
}
