//! Contract of the remote store the cache is synchronised against.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    Localizations, NewProject, NewTranslationKey, Project, ProjectChanges, ProjectStats,
    TranslationKey, TranslationValues,
};

/// Network-facing CRUD surface for projects and translation keys.
///
/// "Get" style calls return `Ok(None)` for a missing entity. Every other non-success
/// outcome is a [`StoreError`]; timeouts are reported as [`StoreError::Timeout`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Keys of one project, or of every project when `project_id` is `None`.
    async fn list_keys(&self, project_id: Option<&str>) -> Result<Vec<TranslationKey>, StoreError>;

    async fn get_key(&self, id: &str) -> Result<Option<TranslationKey>, StoreError>;

    /// The server assigns the id, timestamps and audit identity.
    async fn create_key(
        &self,
        project_id: &str,
        fields: &NewTranslationKey,
    ) -> Result<TranslationKey, StoreError>;

    async fn update_key(
        &self,
        id: &str,
        translations: &TranslationValues,
    ) -> Result<TranslationKey, StoreError>;

    async fn delete_key(&self, id: &str) -> Result<(), StoreError>;

    /// Sorted, de-duplicated category labels.
    async fn list_categories(&self, project_id: Option<&str>) -> Result<Vec<String>, StoreError>;

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError>;

    async fn create_project(&self, fields: &NewProject) -> Result<Project, StoreError>;

    async fn update_project(
        &self,
        id: &str,
        changes: &ProjectChanges,
    ) -> Result<Project, StoreError>;

    async fn delete_project(&self, id: &str) -> Result<(), StoreError>;

    async fn add_language(&self, project_id: &str, code: &str) -> Result<(), StoreError>;

    async fn remove_language(&self, project_id: &str, code: &str) -> Result<(), StoreError>;

    async fn project_stats(&self, project_id: &str) -> Result<Option<ProjectStats>, StoreError>;

    async fn localizations(
        &self,
        project_id: &str,
        locale: &str,
    ) -> Result<Option<Localizations>, StoreError>;
}
