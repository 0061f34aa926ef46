//! Loads descriptors through the cache, fetching from the remote store when needed.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::{QueryCache, QueryData, QueryKey};
use crate::error::StoreError;
use crate::model::{Localizations, Project, ProjectStats, TranslationKey};
use crate::remote::RemoteStore;
use crate::telemetry::{Event, Handle};

#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<QueryCache>,
    remote: Arc<dyn RemoteStore>,
    telemetry: Arc<Handle>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    pub fn new(cache: Arc<QueryCache>, remote: Arc<dyn RemoteStore>, telemetry: Arc<Handle>) -> Self {
        Self {
            cache,
            remote,
            telemetry,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Returns the cached value for `key`.
    ///
    /// A fresh entry is returned without network access. A stale entry is returned as is and
    /// refreshed in the background. An absent entry is fetched and awaited; concurrent loads of
    /// the same descriptor share one fetch.
    pub async fn load(&self, key: &QueryKey) -> Result<QueryData, StoreError> {
        if let Some(entry) = self.cache.entry(key) {
            if entry.is_stale(key.kind(), Instant::now()) {
                self.refresh_in_background(key.clone());
            }
            return Ok(entry.data);
        }

        let gate = self.cache.fetch_gate(key);
        let _in_flight = gate.lock().await;
        if let Some(entry) = self.cache.entry(key) {
            if !entry.is_stale(key.kind(), Instant::now()) {
                return Ok(entry.data);
            }
        }
        self.fetch_and_store(key).await
    }

    /// Fetches `key` now and waits for the result, queueing behind an in-flight fetch.
    pub async fn refetch(&self, key: &QueryKey) -> Result<QueryData, StoreError> {
        let gate = self.cache.fetch_gate(key);
        let _in_flight = gate.lock().await;
        self.fetch_and_store(key).await
    }

    fn refresh_in_background(&self, key: QueryKey) {
        let gate = self.cache.fetch_gate(&key);
        let Ok(in_flight) = gate.try_lock_owned() else {
            tracing::trace!(descriptor = %key, "refetch already in flight");
            return;
        };
        let client = self.clone();
        tokio::spawn(async move {
            let _in_flight = in_flight;
            // Failures are logged and recorded by fetch_and_store; the stale value stays.
            let _ = client.fetch_and_store(&key).await;
        });
    }

    async fn fetch_and_store(&self, key: &QueryKey) -> Result<QueryData, StoreError> {
        let generation = self.cache.generation(key);
        let data = match self.fetch(key).await {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(descriptor = %key, error = %error, "query fetch failed");
                self.telemetry.record(Event::QueryFailed {
                    key: key.clone(),
                    error: error.to_string(),
                });
                return Err(error);
            }
        };

        if self.cache.write_if_current(key.clone(), data.clone(), generation) {
            tracing::debug!(descriptor = %key, "query fetched");
            self.telemetry.record(Event::QueryFetched { key: key.clone() });
            return Ok(data);
        }

        tracing::debug!(descriptor = %key, "discarded fetched value superseded by a newer write");
        self.telemetry.record(Event::QueryDiscarded { key: key.clone() });
        Ok(self.cache.read(key).unwrap_or(data))
    }

    async fn fetch(&self, key: &QueryKey) -> Result<QueryData, StoreError> {
        let remote = self.remote.as_ref();
        let data = match key {
            QueryKey::Keys { project_id } => {
                QueryData::Keys(remote.list_keys(project_id.as_deref()).await?)
            }
            QueryKey::KeyDetail { id } => QueryData::Key(remote.get_key(id).await?),
            QueryKey::Categories { project_id } => {
                QueryData::Categories(remote.list_categories(project_id.as_deref()).await?)
            }
            QueryKey::Projects => QueryData::Projects(remote.list_projects().await?),
            QueryKey::Project { id } => QueryData::Project(remote.get_project(id).await?),
            QueryKey::ProjectStats { project_id } => {
                QueryData::Stats(remote.project_stats(project_id).await?)
            }
            QueryKey::Localizations { project_id, locale } => {
                QueryData::Localizations(remote.localizations(project_id, locale).await?)
            }
        };
        Ok(data)
    }

    pub async fn keys(&self, project_id: Option<&str>) -> Result<Vec<TranslationKey>, StoreError> {
        let key = QueryKey::keys(project_id);
        match self.load(&key).await? {
            QueryData::Keys(keys) => Ok(keys),
            other => Err(unexpected(&key, &other)),
        }
    }

    pub async fn key(&self, id: &str) -> Result<Option<TranslationKey>, StoreError> {
        let key = QueryKey::key_detail(id);
        match self.load(&key).await? {
            QueryData::Key(found) => Ok(found),
            other => Err(unexpected(&key, &other)),
        }
    }

    pub async fn categories(&self, project_id: Option<&str>) -> Result<Vec<String>, StoreError> {
        let key = QueryKey::categories(project_id);
        match self.load(&key).await? {
            QueryData::Categories(categories) => Ok(categories),
            other => Err(unexpected(&key, &other)),
        }
    }

    pub async fn projects(&self) -> Result<Vec<Project>, StoreError> {
        let key = QueryKey::Projects;
        match self.load(&key).await? {
            QueryData::Projects(projects) => Ok(projects),
            other => Err(unexpected(&key, &other)),
        }
    }

    pub async fn project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let key = QueryKey::project(id);
        match self.load(&key).await? {
            QueryData::Project(found) => Ok(found),
            other => Err(unexpected(&key, &other)),
        }
    }

    pub async fn project_stats(&self, project_id: &str) -> Result<Option<ProjectStats>, StoreError> {
        let key = QueryKey::project_stats(project_id);
        match self.load(&key).await? {
            QueryData::Stats(stats) => Ok(stats),
            other => Err(unexpected(&key, &other)),
        }
    }

    pub async fn localizations(
        &self,
        project_id: &str,
        locale: &str,
    ) -> Result<Option<Localizations>, StoreError> {
        let key = QueryKey::localizations(project_id, locale);
        match self.load(&key).await? {
            QueryData::Localizations(found) => Ok(found),
            other => Err(unexpected(&key, &other)),
        }
    }
}

fn unexpected(key: &QueryKey, data: &QueryData) -> StoreError {
    StoreError::Decode(format!("{} payload cached under {key}", data.kind()))
}
