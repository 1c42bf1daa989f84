//! Bridges the store's access-key table to the SigV4 verifier's credential
//! provider trait.

use std::sync::Arc;

use ruststack_s3_auth::{Credential, CredentialProvider, AuthError};
use ruststack_store::Store;

/// Resolves SigV4 access keys against the store's access-key table.
#[derive(Debug, Clone)]
pub struct StoreCredentialProvider {
    store: Arc<Store>,
}

impl StoreCredentialProvider {
    /// Wrap `store` as a credential provider.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl CredentialProvider for StoreCredentialProvider {
    fn resolve(&self, access_key_id: &str) -> Result<Credential, AuthError> {
        self.store
            .lookup_access_key(access_key_id)
            .map(|access_key| Credential {
                secret_key: access_key.secret_key,
                bucket: access_key.bucket,
                read_only: access_key.read_only,
            })
            .map_err(|_| AuthError::AccessKeyNotFound(access_key_id.to_owned()))
    }
}
