//! Process-wide singletons shared by every connection and handler.

use std::sync::Arc;

use ruststack_cluster::Cluster;
use ruststack_core::Config;
use ruststack_store::Store;

use crate::auth::StoreCredentialProvider;

/// The daemon's shared state: the store, cluster, config, and credential
/// provider. Established once at startup; handlers only ever borrow it.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The local object/metadata store.
    pub store: Arc<Store>,
    /// The peer membership and replication component.
    pub cluster: Arc<Cluster>,
    /// Process-wide configuration.
    pub config: Arc<Config>,
    /// SigV4 credential resolution backed by the store.
    pub credentials: Arc<StoreCredentialProvider>,
}

impl AppState {
    /// Assemble the shared state.
    #[must_use]
    pub fn new(store: Arc<Store>, cluster: Arc<Cluster>, config: Arc<Config>) -> Self {
        let credentials = Arc::new(StoreCredentialProvider::new(store.clone()));
        Self { store, cluster, config, credentials }
    }
}
