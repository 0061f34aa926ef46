use std::sync::Arc;

use chrono::Utc;

use super::{
    lists_containing, update_cached_project, MutationCoordinator, MutationKind, MutationPlan,
};
use crate::cache::{MutationId, QueryCache, QueryData, QueryKey, QueryKind, QueryPattern};
use crate::error::MutationError;
use crate::model::{placeholder_id, KeyDraft, TranslationKey, TranslationValues};
use crate::remote::RemoteStore;

impl MutationCoordinator {
    /// Creates a key in `project_id`, showing a placeholder in the matching key lists until the
    /// server answers.
    pub async fn create_translation_key(
        &self,
        project_id: &str,
        draft: &KeyDraft,
    ) -> Result<TranslationKey, MutationError> {
        let fields = draft
            .validate()
            .map_err(|error| self.reject(MutationKind::CreateKey, error))?;
        let project_id = project_id.to_string();
        let placeholder = fields.to_key(placeholder_id(), &project_id, &self.actor, Utc::now());

        let plan = MutationPlan::new(MutationKind::CreateKey)
            .snapshot(QueryKind::Keys)
            .snapshot(QueryKind::Categories)
            .snapshot(QueryKey::Projects)
            .snapshot(QueryKey::project(&project_id));

        let optimistic = placeholder.clone();
        let apply = move |cache: &QueryCache, mutation: MutationId| {
            cache.update_matching(&QueryKind::Keys.into(), Some(mutation), |descriptor, data| {
                let QueryData::Keys(keys) = data else {
                    return None;
                };
                if descriptor
                    .project_scope()
                    .is_some_and(|scope| scope != optimistic.project_id)
                {
                    return None;
                }
                let mut next = keys.clone();
                next.push(optimistic.clone());
                Some(QueryData::Keys(next))
            });
            update_cached_project(cache, Some(mutation), &optimistic.project_id, |project| {
                project.translation_key_count += 1;
            });
        };

        let call = {
            let project_id = project_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.create_key(&project_id, &fields).await
            }
        };

        let commit = move |this: &MutationCoordinator, created: &TranslationKey| {
            let cache = &this.cache;
            cache.update_matching(&QueryKind::Keys.into(), None, |_, data| {
                let QueryData::Keys(keys) = data else {
                    return None;
                };
                if !keys.iter().any(|key| key.id == placeholder.id) {
                    return None;
                }
                let already_listed = keys.iter().any(|key| key.id == created.id);
                let next = keys
                    .iter()
                    .filter_map(|key| {
                        if key.id != placeholder.id {
                            Some(key.clone())
                        } else if already_listed {
                            None
                        } else {
                            Some(created.clone())
                        }
                    })
                    .collect();
                Some(QueryData::Keys(next))
            });
            cache.write(
                QueryKey::key_detail(&created.id),
                QueryData::Key(Some(created.clone())),
            );

            let project_id = created.project_id.as_str();
            for pattern in [
                QueryPattern::from(QueryKey::categories(Some(project_id))),
                QueryKey::categories(None).into(),
                QueryKey::Projects.into(),
                QueryKey::project(project_id).into(),
                QueryKey::project_stats(project_id).into(),
                QueryPattern::scoped(QueryKind::Localizations, project_id),
            ] {
                cache.invalidate(&pattern);
            }
        };

        self.with_optimistic_update(plan, apply, call, commit).await
    }

    /// Merges `translations` into key `key_id`.
    ///
    /// Values are trimmed; blank values and values equal to the cached ones are dropped. Returns
    /// `Ok(None)` without contacting the server when nothing is left to change.
    pub async fn update_translation_key(
        &self,
        key_id: &str,
        translations: &TranslationValues,
    ) -> Result<Option<TranslationKey>, MutationError> {
        let current = self.cached_key(key_id);
        let changes: TranslationValues = translations
            .iter()
            .filter_map(|(language, value)| {
                let language = language.trim();
                let value = value.trim();
                if language.is_empty() || value.is_empty() {
                    return None;
                }
                let unchanged = current
                    .as_ref()
                    .and_then(|key| key.value(language))
                    .is_some_and(|existing| existing.trim() == value);
                (!unchanged).then(|| (language.to_string(), value.to_string()))
            })
            .collect();
        if changes.is_empty() {
            tracing::debug!(key_id, "no translation changes to submit");
            return Ok(None);
        }

        let key_id = key_id.to_string();
        let project_id = current.map(|key| key.project_id);
        let containing = lists_containing(&self.cache, &key_id);

        let mut plan = MutationPlan::new(MutationKind::UpdateKey)
            .snapshot(QueryKey::key_detail(&key_id))
            .settle(QueryKey::key_detail(&key_id))
            .settle(QueryKind::Keys);
        for descriptor in &containing {
            plan = plan.snapshot(descriptor.clone());
        }
        if let Some(project_id) = &project_id {
            plan = plan.settle(QueryPattern::scoped(QueryKind::Localizations, project_id));
        }

        let actor = self.actor.to_string();
        let stamped = changes.clone();
        let target = key_id.clone();
        let apply = move |cache: &QueryCache, mutation: MutationId| {
            let now = Utc::now();
            cache.update_matching(
                &QueryKey::key_detail(&target).into(),
                Some(mutation),
                |_, data| match data {
                    QueryData::Key(Some(key)) => {
                        let mut next = key.clone();
                        next.merge_values(&stamped, &actor, now);
                        Some(QueryData::Key(Some(next)))
                    }
                    _ => None,
                },
            );
            for descriptor in containing {
                cache.update_matching(&descriptor.into(), Some(mutation), |_, data| {
                    let QueryData::Keys(keys) = data else {
                        return None;
                    };
                    let mut next = keys.clone();
                    next.iter_mut()
                        .filter(|key| key.id == target)
                        .for_each(|key| key.merge_values(&stamped, &actor, now));
                    Some(QueryData::Keys(next))
                });
            }
        };

        let call = {
            let key_id = key_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.update_key(&key_id, &changes).await
            }
        };

        let commit = move |this: &MutationCoordinator, updated: &TranslationKey| {
            this.cache.write(
                QueryKey::key_detail(&updated.id),
                QueryData::Key(Some(updated.clone())),
            );
            this.cache
                .update_matching(&QueryKind::Keys.into(), None, |_, data| {
                    let QueryData::Keys(keys) = data else {
                        return None;
                    };
                    if !keys.iter().any(|key| key.id == updated.id) {
                        return None;
                    }
                    let next = keys
                        .iter()
                        .map(|key| {
                            if key.id == updated.id {
                                updated.clone()
                            } else {
                                key.clone()
                            }
                        })
                        .collect();
                    Some(QueryData::Keys(next))
                });
            this.cache
                .invalidate(&QueryKey::project_stats(&updated.project_id).into());
        };

        self.with_optimistic_update(plan, apply, call, commit)
            .await
            .map(Some)
    }

    /// Deletes key `key_id`, hiding it from every cached key list until the server confirms.
    pub async fn delete_translation_key(&self, key_id: &str) -> Result<(), MutationError> {
        let key_id = key_id.to_string();
        let project_id = self.cached_key(&key_id).map(|key| key.project_id);

        let mut plan = MutationPlan::new(MutationKind::DeleteKey)
            .snapshot(QueryKind::Keys)
            .snapshot(QueryKey::Projects);
        if let Some(project_id) = &project_id {
            plan = plan.snapshot(QueryKey::project(project_id));
        }

        let target = key_id.clone();
        let owner = project_id.clone();
        let apply = move |cache: &QueryCache, mutation: MutationId| {
            let removed = cache.update_matching(&QueryKind::Keys.into(), Some(mutation), |_, data| {
                let QueryData::Keys(keys) = data else {
                    return None;
                };
                if !keys.iter().any(|key| key.id == target) {
                    return None;
                }
                Some(QueryData::Keys(
                    keys.iter().filter(|key| key.id != target).cloned().collect(),
                ))
            });
            if let Some(project_id) = owner.filter(|_| removed > 0) {
                update_cached_project(cache, Some(mutation), &project_id, |project| {
                    project.translation_key_count = project.translation_key_count.saturating_sub(1);
                });
            }
        };

        let call = {
            let key_id = key_id.clone();
            move |remote: Arc<dyn RemoteStore>| async move {
                remote.delete_key(&key_id).await
            }
        };

        let commit = move |this: &MutationCoordinator, _: &()| {
            this.cache.remove(&QueryKey::key_detail(&key_id).into());
            this.cache.invalidate(&QueryKind::Categories.into());
            this.cache.invalidate(&QueryKey::Projects.into());
            if let Some(project_id) = &project_id {
                this.cache.invalidate(&QueryKey::project(project_id).into());
                this.cache
                    .invalidate(&QueryKey::project_stats(project_id).into());
                this.cache
                    .invalidate(&QueryPattern::scoped(QueryKind::Localizations, project_id));
            }
            this.selection.forget_key(&key_id);
        };

        self.with_optimistic_update(plan, apply, call, commit).await
    }
}
