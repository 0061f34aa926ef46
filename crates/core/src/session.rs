use std::sync::Arc;

use crate::cache::QueryCache;
use crate::config::AppConfig;
use crate::coordinator::MutationCoordinator;
use crate::queries::QueryClient;
use crate::remote::RemoteStore;
use crate::selection::SelectionStore;
use crate::telemetry::Handle;

/// Everything one dashboard run shares: the cache, selection state, loaders and coordinator.
///
/// The cache lives exactly as long as the session and is handed to the loaders and the
/// coordinator explicitly.
#[derive(Debug, Clone)]
pub struct Session {
    config: AppConfig,
    cache: Arc<QueryCache>,
    selection: Arc<SelectionStore>,
    telemetry: Arc<Handle>,
    queries: QueryClient,
    coordinator: MutationCoordinator,
}

impl Session {
    pub fn start(remote: Arc<dyn RemoteStore>, config: AppConfig) -> Self {
        let cache = Arc::new(QueryCache::new());
        let selection = Arc::new(SelectionStore::new());
        let telemetry = Arc::new(Handle::new());
        let queries = QueryClient::new(cache.clone(), remote.clone(), telemetry.clone());
        let coordinator = MutationCoordinator::new(
            cache.clone(),
            remote,
            selection.clone(),
            telemetry.clone(),
            config.actor(),
        );
        tracing::debug!(api_url = config.api_url(), actor = config.actor(), "session started");

        Self {
            config,
            cache,
            selection,
            telemetry,
            queries,
            coordinator,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn selection(&self) -> &Arc<SelectionStore> {
        &self.selection
    }

    pub fn telemetry(&self) -> &Arc<Handle> {
        &self.telemetry
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    /// Drops every cached entry. Mutations still in flight settle against an empty cache.
    pub fn shutdown(&self) {
        let entries = self.cache.len();
        self.cache.clear();
        tracing::debug!(entries, "session cache cleared");
    }
}
