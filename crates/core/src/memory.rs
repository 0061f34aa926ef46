//! In-process [`RemoteStore`] used for demos and as the test double of the coordinator.
//!
//! Behaves like the REST backend: ids are server-assigned, deleting a project cascades to its
//! keys, and missing entities on mutating calls are [`StoreError::NotFound`]. Calls can be made
//! to fail or to wait on a gate so the optimistic window can be observed.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use ulid::Ulid;

use crate::error::StoreError;
use crate::model::{
    Localizations, NewProject, NewTranslationKey, Project, ProjectChanges, ProjectStats,
    Translation, TranslationKey, TranslationValues,
};
use crate::remote::RemoteStore;

pub const SAMPLE_PROJECT_ID: &str = "web-app";
const DEFAULT_ACTOR: &str = "demo-user";

#[derive(Debug, Default)]
struct MemoryState {
    projects: Vec<Project>,
    keys: Vec<TranslationKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Read,
    Write,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    actor: String,
    calls: Mutex<Vec<&'static str>>,
    read_failures: Mutex<VecDeque<StoreError>>,
    write_failures: Mutex<VecDeque<StoreError>>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            actor: DEFAULT_ACTOR.to_string(),
            calls: Mutex::new(Vec::new()),
            read_failures: Mutex::new(VecDeque::new()),
            write_failures: Mutex::new(VecDeque::new()),
            write_gate: Mutex::new(None),
        }
    }

    /// A store holding one project with five keys translated into four languages.
    pub fn with_sample_data() -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            state.keys = sample_keys();
            let key_count = state.keys.len();
            state.projects.push(Project {
                id: SAMPLE_PROJECT_ID.to_string(),
                name: "Web App".to_string(),
                description: Some("Customer-facing web application".to_string()),
                default_language: "en".to_string(),
                supported_languages: vec!["en".into(), "es".into(), "fr".into(), "de".into()],
                created_at: sample_time(1, 9, 0),
                updated_at: sample_time(15, 10, 30),
                created_by: "admin".to_string(),
                translation_key_count: key_count,
                is_active: true,
            });
        }
        store
    }

    pub fn insert_project(&self, project: Project) {
        self.state.lock().projects.push(project);
    }

    pub fn insert_key(&self, key: TranslationKey) {
        self.state.lock().keys.push(key);
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.state
            .lock()
            .projects
            .iter()
            .find(|project| project.id == id)
            .cloned()
    }

    pub fn key(&self, id: &str) -> Option<TranslationKey> {
        self.state.lock().keys.iter().find(|key| key.id == id).cloned()
    }

    /// Names of the calls received so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|name| !is_read(name))
            .count()
    }

    /// Queue an error for the next mutating call.
    pub fn fail_next_write(&self, error: StoreError) {
        self.write_failures.lock().push_back(error);
    }

    pub fn fail_next_read(&self, error: StoreError) {
        self.read_failures.lock().push_back(error);
    }

    /// Make mutating calls wait until [`MemoryStore::release_write`] is called.
    pub fn hold_writes(&self) {
        *self.write_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_write(&self) {
        if let Some(gate) = self.write_gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn release_all_writes(&self) {
        if let Some(gate) = self.write_gate.lock().take() {
            gate.close();
        }
    }

    async fn enter(&self, name: &'static str, kind: CallKind) -> Result<(), StoreError> {
        self.calls.lock().push(name);
        match kind {
            CallKind::Read => {
                if let Some(error) = self.read_failures.lock().pop_front() {
                    return Err(error);
                }
            }
            CallKind::Write => {
                let gate = self.write_gate.lock().clone();
                if let Some(gate) = gate {
                    // A closed gate lets every waiter through.
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                }
                if let Some(error) = self.write_failures.lock().pop_front() {
                    return Err(error);
                }
            }
        }
        Ok(())
    }
}

fn is_read(name: &str) -> bool {
    name.starts_with("list_")
        || name.starts_with("get_")
        || name == "project_stats"
        || name == "localizations"
}

fn key_not_found() -> StoreError {
    StoreError::NotFound("Translation key not found".to_string())
}

fn project_not_found() -> StoreError {
    StoreError::NotFound("Project not found".to_string())
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_keys(&self, project_id: Option<&str>) -> Result<Vec<TranslationKey>, StoreError> {
        self.enter("list_keys", CallKind::Read).await?;
        let state = self.state.lock();
        Ok(state
            .keys
            .iter()
            .filter(|key| project_id.map_or(true, |id| key.project_id == id))
            .cloned()
            .collect())
    }

    async fn get_key(&self, id: &str) -> Result<Option<TranslationKey>, StoreError> {
        self.enter("get_key", CallKind::Read).await?;
        Ok(self.key(id))
    }

    async fn create_key(
        &self,
        project_id: &str,
        fields: &NewTranslationKey,
    ) -> Result<TranslationKey, StoreError> {
        self.enter("create_key", CallKind::Write).await?;
        let mut state = self.state.lock();
        let project = state
            .projects
            .iter_mut()
            .find(|project| project.id == project_id)
            .ok_or_else(project_not_found)?;
        project.translation_key_count += 1;
        let key = fields.to_key(Ulid::new().to_string(), project_id, &self.actor, Utc::now());
        state.keys.push(key.clone());
        Ok(key)
    }

    async fn update_key(
        &self,
        id: &str,
        translations: &TranslationValues,
    ) -> Result<TranslationKey, StoreError> {
        self.enter("update_key", CallKind::Write).await?;
        let mut state = self.state.lock();
        let key = state
            .keys
            .iter_mut()
            .find(|key| key.id == id)
            .ok_or_else(key_not_found)?;
        key.merge_values(translations, &self.actor, Utc::now());
        Ok(key.clone())
    }

    async fn delete_key(&self, id: &str) -> Result<(), StoreError> {
        self.enter("delete_key", CallKind::Write).await?;
        let mut state = self.state.lock();
        let index = state
            .keys
            .iter()
            .position(|key| key.id == id)
            .ok_or_else(key_not_found)?;
        let removed = state.keys.remove(index);
        if let Some(project) = state
            .projects
            .iter_mut()
            .find(|project| project.id == removed.project_id)
        {
            project.translation_key_count = project.translation_key_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn list_categories(&self, project_id: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.enter("list_categories", CallKind::Read).await?;
        let state = self.state.lock();
        Ok(state
            .keys
            .iter()
            .filter(|key| project_id.map_or(true, |id| key.project_id == id))
            .filter(|key| !key.category.is_empty())
            .map(|key| key.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.enter("list_projects", CallKind::Read).await?;
        Ok(self.state.lock().projects.clone())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        self.enter("get_project", CallKind::Read).await?;
        Ok(self.project(id))
    }

    async fn create_project(&self, fields: &NewProject) -> Result<Project, StoreError> {
        self.enter("create_project", CallKind::Write).await?;
        let project = fields.to_project(Ulid::new().to_string(), &self.actor, Utc::now());
        self.state.lock().projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        id: &str,
        changes: &ProjectChanges,
    ) -> Result<Project, StoreError> {
        self.enter("update_project", CallKind::Write).await?;
        let mut state = self.state.lock();
        let project = state
            .projects
            .iter_mut()
            .find(|project| project.id == id)
            .ok_or_else(project_not_found)?;
        project.apply_changes(changes, Utc::now());
        Ok(project.clone())
    }

    async fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.enter("delete_project", CallKind::Write).await?;
        let mut state = self.state.lock();
        let before = state.projects.len();
        state.projects.retain(|project| project.id != id);
        if state.projects.len() == before {
            return Err(project_not_found());
        }
        state.keys.retain(|key| key.project_id != id);
        Ok(())
    }

    async fn add_language(&self, project_id: &str, code: &str) -> Result<(), StoreError> {
        self.enter("add_language", CallKind::Write).await?;
        let mut state = self.state.lock();
        let project = state
            .projects
            .iter_mut()
            .find(|project| project.id == project_id)
            .ok_or_else(project_not_found)?;
        if project.add_language(code) {
            project.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_language(&self, project_id: &str, code: &str) -> Result<(), StoreError> {
        self.enter("remove_language", CallKind::Write).await?;
        let mut state = self.state.lock();
        let project = state
            .projects
            .iter_mut()
            .find(|project| project.id == project_id)
            .ok_or_else(project_not_found)?;
        if project.default_language == code {
            return Err(StoreError::Status {
                status: 400,
                message: "Cannot remove the default language".to_string(),
            });
        }
        if !project.remove_language(code) {
            return Err(StoreError::NotFound(
                "Project not found or language not supported".to_string(),
            ));
        }
        project.updated_at = Utc::now();
        for key in state.keys.iter_mut().filter(|key| key.project_id == project_id) {
            key.purge_language(code);
        }
        Ok(())
    }

    async fn project_stats(&self, project_id: &str) -> Result<Option<ProjectStats>, StoreError> {
        self.enter("project_stats", CallKind::Read).await?;
        let state = self.state.lock();
        Ok(state
            .projects
            .iter()
            .find(|project| project.id == project_id)
            .map(|project| ProjectStats::compute(project, &state.keys)))
    }

    async fn localizations(
        &self,
        project_id: &str,
        locale: &str,
    ) -> Result<Option<Localizations>, StoreError> {
        self.enter("localizations", CallKind::Read).await?;
        let state = self.state.lock();
        if !state.projects.iter().any(|project| project.id == project_id) {
            return Ok(None);
        }
        Ok(Some(Localizations::compute(project_id, locale, &state.keys)))
    }
}

fn sample_time(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

struct SampleKey {
    id: &'static str,
    key: &'static str,
    category: &'static str,
    description: &'static str,
    day: u32,
    values: [(&'static str, &'static str, &'static str); 4],
}

const SAMPLE_KEYS: &[SampleKey] = &[
    SampleKey {
        id: "1",
        key: "button.save",
        category: "buttons",
        description: "Save button text",
        day: 15,
        values: [
            ("en", "Save", "john.doe"),
            ("es", "Guardar", "maria.garcia"),
            ("fr", "Enregistrer", "pierre.martin"),
            ("de", "Speichern", "hans.mueller"),
        ],
    },
    SampleKey {
        id: "2",
        key: "button.cancel",
        category: "buttons",
        description: "Cancel button text",
        day: 14,
        values: [
            ("en", "Cancel", "john.doe"),
            ("es", "Cancelar", "maria.garcia"),
            ("fr", "Annuler", "pierre.martin"),
            ("de", "Abbrechen", "hans.mueller"),
        ],
    },
    SampleKey {
        id: "3",
        key: "form.email.label",
        category: "forms",
        description: "Email input label",
        day: 13,
        values: [
            ("en", "Email Address", "jane.smith"),
            ("es", "Dirección de Correo", "maria.garcia"),
            ("fr", "Adresse Email", "pierre.martin"),
            ("de", "E-Mail-Adresse", "hans.mueller"),
        ],
    },
    SampleKey {
        id: "4",
        key: "navigation.home",
        category: "navigation",
        description: "Home navigation link",
        day: 12,
        values: [
            ("en", "Home", "admin"),
            ("es", "Inicio", "maria.garcia"),
            ("fr", "Accueil", "pierre.martin"),
            ("de", "Startseite", "hans.mueller"),
        ],
    },
    SampleKey {
        id: "5",
        key: "error.validation.required",
        category: "errors",
        description: "Required field validation error",
        day: 11,
        values: [
            ("en", "This field is required", "jane.smith"),
            ("es", "Este campo es obligatorio", "maria.garcia"),
            ("fr", "Ce champ est requis", "pierre.martin"),
            ("de", "Dieses Feld ist erforderlich", "hans.mueller"),
        ],
    },
];

fn sample_keys() -> Vec<TranslationKey> {
    SAMPLE_KEYS
        .iter()
        .map(|sample| TranslationKey {
            id: sample.id.to_string(),
            project_id: SAMPLE_PROJECT_ID.to_string(),
            key: sample.key.to_string(),
            category: sample.category.to_string(),
            description: Some(sample.description.to_string()),
            translations: sample
                .values
                .iter()
                .map(|(language, value, author)| {
                    (
                        language.to_string(),
                        Translation {
                            value: value.to_string(),
                            updated_at: sample_time(sample.day, 10, 30),
                            updated_by: author.to_string(),
                        },
                    )
                })
                .collect(),
        })
        .collect()
}
