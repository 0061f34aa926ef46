use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use locdash_core::{
    AppConfig, Localizations, NewProject, NewTranslationKey, Project, ProjectChanges,
    ProjectStats, RemoteStore, StoreError, TranslationKey, TranslationValues,
};

/// [`RemoteStore`] backed by the localization management REST API.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base: Url,
}

#[derive(Serialize)]
struct UpdateTranslations<'a> {
    translations: &'a TranslationValues,
}

#[derive(Deserialize)]
struct CategoriesResponse {
    categories: Vec<String>,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(base_url)
            .map_err(|err| StoreError::Transport(format!("invalid API URL '{base_url}': {err}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "API URL '{base_url}' cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        Self::new(config.api_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport(format!("API URL '{}' cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(method = %method, url = %url, "remote store request");
        self.client.request(method, url)
    }

    /// Sends `request`, turning non-success statuses into errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_detail(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        tracing::debug!(status = status.as_u16(), message = message.as_str(), "remote store error response");
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(message));
        }
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self.send(request).await?;
        decode(response).await
    }

    /// Like [`HttpStore::fetch`], with 404 mapped to `None`.
    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, StoreError> {
        match self.send(request).await {
            Ok(response) => decode(response).await.map(Some),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Sends a request whose acknowledgement body is ignored.
    async fn acknowledge(&self, request: RequestBuilder) -> Result<(), StoreError> {
        self.send(request).await.map(|_| ())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    response.json::<T>().await.map_err(|err| {
        if err.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Decode(err.to_string())
        }
    })
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(err.to_string())
    }
}

/// Human-readable message from an error body: `detail` as a string or a list of validation
/// entries, or `message`.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail") {
        Some(serde_json::Value::String(detail)) if !detail.is_empty() => {
            return Some(detail.clone());
        }
        Some(serde_json::Value::Array(entries)) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(serde_json::Value::as_str))
                .collect();
            if !messages.is_empty() {
                return Some(messages.join("; "));
            }
        }
        _ => {}
    }
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn list_keys(&self, project_id: Option<&str>) -> Result<Vec<TranslationKey>, StoreError> {
        let mut url = self.url(&["translation-keys"])?;
        if let Some(project_id) = project_id {
            url.query_pairs_mut().append_pair("project_id", project_id);
        }
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_key(&self, id: &str) -> Result<Option<TranslationKey>, StoreError> {
        let url = self.url(&["translation-keys", id])?;
        self.fetch_optional(self.request(Method::GET, url)).await
    }

    async fn create_key(
        &self,
        project_id: &str,
        fields: &NewTranslationKey,
    ) -> Result<TranslationKey, StoreError> {
        let url = self.url(&["projects", project_id, "translation-keys"])?;
        self.fetch(self.request(Method::POST, url).json(fields)).await
    }

    async fn update_key(
        &self,
        id: &str,
        translations: &TranslationValues,
    ) -> Result<TranslationKey, StoreError> {
        let url = self.url(&["translation-keys", id])?;
        let body = UpdateTranslations { translations };
        self.fetch(self.request(Method::PUT, url).json(&body)).await
    }

    async fn delete_key(&self, id: &str) -> Result<(), StoreError> {
        let url = self.url(&["translation-keys", id])?;
        self.acknowledge(self.request(Method::DELETE, url)).await
    }

    async fn list_categories(&self, project_id: Option<&str>) -> Result<Vec<String>, StoreError> {
        let Some(project_id) = project_id else {
            // The API only serves categories per project.
            let keys = self.list_keys(None).await?;
            return Ok(keys
                .into_iter()
                .map(|key| key.category)
                .filter(|category| !category.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect());
        };
        let url = self.url(&["projects", project_id, "categories"])?;
        let response: CategoriesResponse = self.fetch(self.request(Method::GET, url)).await?;
        Ok(response.categories)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let url = self.url(&["projects"])?;
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let url = self.url(&["projects", id])?;
        self.fetch_optional(self.request(Method::GET, url)).await
    }

    async fn create_project(&self, fields: &NewProject) -> Result<Project, StoreError> {
        let url = self.url(&["projects"])?;
        self.fetch(self.request(Method::POST, url).json(fields)).await
    }

    async fn update_project(
        &self,
        id: &str,
        changes: &ProjectChanges,
    ) -> Result<Project, StoreError> {
        let url = self.url(&["projects", id])?;
        self.fetch(self.request(Method::PUT, url).json(changes)).await
    }

    async fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        let url = self.url(&["projects", id])?;
        self.acknowledge(self.request(Method::DELETE, url)).await
    }

    async fn add_language(&self, project_id: &str, code: &str) -> Result<(), StoreError> {
        let url = self.url(&["projects", project_id, "languages", code])?;
        self.acknowledge(self.request(Method::POST, url)).await
    }

    async fn remove_language(&self, project_id: &str, code: &str) -> Result<(), StoreError> {
        let url = self.url(&["projects", project_id, "languages", code])?;
        self.acknowledge(self.request(Method::DELETE, url)).await
    }

    async fn project_stats(&self, project_id: &str) -> Result<Option<ProjectStats>, StoreError> {
        let url = self.url(&["projects", project_id, "stats"])?;
        self.fetch_optional(self.request(Method::GET, url)).await
    }

    async fn localizations(
        &self,
        project_id: &str,
        locale: &str,
    ) -> Result<Option<Localizations>, StoreError> {
        let url = self.url(&["localizations", project_id, locale])?;
        self.fetch_optional(self.request(Method::GET, url)).await
    }
}
