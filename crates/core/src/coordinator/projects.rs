use std::sync::Arc;

use chrono::Utc;

use super::{
    update_cached_project, update_cached_project_keys, MutationCoordinator, MutationKind,
    MutationPlan,
};
use crate::cache::{MutationId, QueryCache, QueryData, QueryKey, QueryKind, QueryPattern};
use crate::error::{MutationError, ValidationError};
use crate::model::{placeholder_id, Project, ProjectChanges, ProjectDraft};
use crate::remote::RemoteStore;

impl MutationCoordinator {
    /// Adds `code` to the supported languages of `project_id`. Adding a supported code is a no-op
    /// on the cached project.
    pub async fn add_project_language(
        &self,
        project_id: &str,
        code: &str,
    ) -> Result<(), MutationError> {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(self.reject(MutationKind::AddLanguage, ValidationError::EmptyLanguageCode));
        }
        let project_id = project_id.to_string();

        let plan = MutationPlan::new(MutationKind::AddLanguage)
            .snapshot(QueryKey::Projects)
            .snapshot(QueryKey::project(&project_id));

        let apply = {
            let project_id = project_id.clone();
            let code = code.clone();
            move |cache: &QueryCache, mutation: MutationId| {
                update_cached_project(cache, Some(mutation), &project_id, |project| {
                    project.add_language(&code);
                });
            }
        };

        let call = {
            let project_id = project_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.add_language(&project_id, &code).await
            }
        };

        let commit = move |this: &MutationCoordinator, _: &()| {
            this.cache.invalidate(&QueryKey::Projects.into());
            this.cache.invalidate(&QueryKey::project(&project_id).into());
            this.cache
                .invalidate(&QueryKey::project_stats(&project_id).into());
        };

        self.with_optimistic_update(plan, apply, call, commit).await
    }

    /// Removes `code` from `project_id` and purges its values from every cached key of the
    /// project. The default language is refused before anything is written or sent.
    pub async fn remove_project_language(
        &self,
        project_id: &str,
        code: &str,
    ) -> Result<(), MutationError> {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(self.reject(
                MutationKind::RemoveLanguage,
                ValidationError::EmptyLanguageCode,
            ));
        }
        if let Some(project) = self.project_for_checks(project_id).await? {
            if project.default_language == code {
                return Err(self.reject(
                    MutationKind::RemoveLanguage,
                    ValidationError::DefaultLanguageRemoval {
                        project_id: project.id,
                        code,
                    },
                ));
            }
        }
        let project_id = project_id.to_string();

        let plan = MutationPlan::new(MutationKind::RemoveLanguage)
            .snapshot(QueryKey::Projects)
            .snapshot(QueryKey::project(&project_id))
            .snapshot(QueryKind::Keys)
            .snapshot(QueryKind::KeyDetail);

        let apply = {
            let project_id = project_id.clone();
            let code = code.clone();
            move |cache: &QueryCache, mutation: MutationId| {
                update_cached_project(cache, Some(mutation), &project_id, |project| {
                    project.remove_language(&code);
                });
                update_cached_project_keys(cache, Some(mutation), &project_id, |key| {
                    key.purge_language(&code);
                });
            }
        };

        let call = {
            let project_id = project_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.remove_language(&project_id, &code).await
            }
        };

        let commit = move |this: &MutationCoordinator, _: &()| {
            for pattern in [
                QueryPattern::from(QueryKey::Projects),
                QueryKey::project(&project_id).into(),
                QueryKey::project_stats(&project_id).into(),
                QueryKind::Keys.into(),
                QueryPattern::scoped(QueryKind::Localizations, &project_id),
            ] {
                this.cache.invalidate(&pattern);
            }
        };

        self.with_optimistic_update(plan, apply, call, commit).await
    }

    /// Creates a project, listing a placeholder until the server assigns the id.
    pub async fn create_project(&self, draft: &ProjectDraft) -> Result<Project, MutationError> {
        let fields = draft
            .validate()
            .map_err(|error| self.reject(MutationKind::CreateProject, error))?;
        let placeholder = fields.to_project(placeholder_id(), &self.actor, Utc::now());

        let plan = MutationPlan::new(MutationKind::CreateProject).snapshot(QueryKey::Projects);

        let optimistic = placeholder.clone();
        let apply = move |cache: &QueryCache, mutation: MutationId| {
            cache.update_matching(&QueryKey::Projects.into(), Some(mutation), |_, data| {
                let QueryData::Projects(projects) = data else {
                    return None;
                };
                let mut next = projects.clone();
                next.push(optimistic.clone());
                Some(QueryData::Projects(next))
            });
        };

        let call = move |remote: Arc<dyn RemoteStore>| async move {
            remote.create_project(&fields).await
        };

        let commit = move |this: &MutationCoordinator, created: &Project| {
            this.cache
                .update_matching(&QueryKey::Projects.into(), None, |_, data| {
                    let QueryData::Projects(projects) = data else {
                        return None;
                    };
                    if !projects.iter().any(|project| project.id == placeholder.id) {
                        return None;
                    }
                    let already_listed = projects.iter().any(|project| project.id == created.id);
                    let next = projects
                        .iter()
                        .filter_map(|project| {
                            if project.id != placeholder.id {
                                Some(project.clone())
                            } else if already_listed {
                                None
                            } else {
                                Some(created.clone())
                            }
                        })
                        .collect();
                    Some(QueryData::Projects(next))
                });
            this.cache.write(
                QueryKey::project(&created.id),
                QueryData::Project(Some(created.clone())),
            );
            this.cache.invalidate(&QueryKey::Projects.into());
        };

        self.with_optimistic_update(plan, apply, call, commit).await
    }

    /// Applies `changes` to `project_id`.
    ///
    /// A new language set must keep the default language; languages it drops are purged from
    /// the project's cached keys. Returns `Ok(None)` without contacting the server when
    /// `changes` is empty.
    pub async fn update_project(
        &self,
        project_id: &str,
        changes: &ProjectChanges,
    ) -> Result<Option<Project>, MutationError> {
        let changes = changes
            .normalized()
            .map_err(|error| self.reject(MutationKind::UpdateProject, error))?;
        if changes.is_empty() {
            tracing::debug!(project_id, "no project changes to submit");
            return Ok(None);
        }

        let mut dropped = Vec::new();
        let project = match &changes.supported_languages {
            Some(_) => self.project_for_checks(project_id).await?,
            None => None,
        };
        if let (Some(project), Some(languages)) = (project, &changes.supported_languages) {
            if !languages.contains(&project.default_language) {
                return Err(self.reject(
                    MutationKind::UpdateProject,
                    ValidationError::DefaultLanguageDropped {
                        project_id: project.id,
                        code: project.default_language,
                    },
                ));
            }
            dropped = project
                .supported_languages
                .into_iter()
                .filter(|code| !languages.contains(code))
                .collect();
        }
        let project_id = project_id.to_string();

        let mut plan = MutationPlan::new(MutationKind::UpdateProject)
            .snapshot(QueryKey::Projects)
            .snapshot(QueryKey::project(&project_id));
        if !dropped.is_empty() {
            plan = plan.snapshot(QueryKind::Keys).snapshot(QueryKind::KeyDetail);
        }

        let apply = {
            let project_id = project_id.clone();
            let changes = changes.clone();
            let dropped = dropped.clone();
            move |cache: &QueryCache, mutation: MutationId| {
                let now = Utc::now();
                update_cached_project(cache, Some(mutation), &project_id, |project| {
                    project.apply_changes(&changes, now);
                });
                if !dropped.is_empty() {
                    update_cached_project_keys(cache, Some(mutation), &project_id, |key| {
                        for code in &dropped {
                            key.purge_language(code);
                        }
                    });
                }
            }
        };

        let call = {
            let project_id = project_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.update_project(&project_id, &changes).await
            }
        };

        let commit = move |this: &MutationCoordinator, updated: &Project| {
            update_cached_project(&this.cache, None, &updated.id, |project| {
                *project = updated.clone();
            });
            this.cache.invalidate(&QueryKey::Projects.into());
            this.cache
                .invalidate(&QueryKey::project_stats(&project_id).into());
            if !dropped.is_empty() {
                this.cache.invalidate(&QueryKind::Keys.into());
                this.cache
                    .invalidate(&QueryPattern::scoped(QueryKind::Localizations, &project_id));
            }
        };

        self.with_optimistic_update(plan, apply, call, commit)
            .await
            .map(Some)
    }

    /// Deletes `project_id` together with its keys from every cached list.
    pub async fn delete_project(&self, project_id: &str) -> Result<(), MutationError> {
        let project_id = project_id.to_string();

        let plan = MutationPlan::new(MutationKind::DeleteProject)
            .snapshot(QueryKey::Projects)
            .snapshot(QueryKey::project(&project_id))
            .snapshot(QueryKind::Keys);

        let apply = {
            let project_id = project_id.clone();
            move |cache: &QueryCache, mutation: MutationId| {
                cache.update_matching(&QueryKey::Projects.into(), Some(mutation), |_, data| {
                    let QueryData::Projects(projects) = data else {
                        return None;
                    };
                    if !projects.iter().any(|project| project.id == project_id) {
                        return None;
                    }
                    Some(QueryData::Projects(
                        projects
                            .iter()
                            .filter(|project| project.id != project_id)
                            .cloned()
                            .collect(),
                    ))
                });
                cache.update_matching(&QueryKind::Keys.into(), Some(mutation), |_, data| {
                    let QueryData::Keys(keys) = data else {
                        return None;
                    };
                    if !keys.iter().any(|key| key.project_id == project_id) {
                        return None;
                    }
                    Some(QueryData::Keys(
                        keys.iter()
                            .filter(|key| key.project_id != project_id)
                            .cloned()
                            .collect(),
                    ))
                });
            }
        };

        let call = {
            let project_id = project_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.delete_project(&project_id).await
            }
        };

        let commit = move |this: &MutationCoordinator, _: &()| {
            let cache = &this.cache;
            for pattern in [
                QueryPattern::from(QueryKey::project(&project_id)),
                QueryKey::project_stats(&project_id).into(),
                QueryKey::keys(Some(&project_id)).into(),
                QueryKey::categories(Some(&project_id)).into(),
                QueryPattern::scoped(QueryKind::Localizations, &project_id),
            ] {
                cache.remove(&pattern);
            }
            cache.remove_where(&QueryKind::KeyDetail.into(), |_, data| {
                matches!(data, QueryData::Key(Some(key)) if key.project_id == project_id)
            });
            cache.invalidate(&QueryKey::Projects.into());
            cache.invalidate(&QueryKind::Keys.into());
            cache.invalidate(&QueryKind::Categories.into());
            this.selection.forget_project(&project_id);
        };

        self.with_optimistic_update(plan, apply, call, commit).await
    }
}
