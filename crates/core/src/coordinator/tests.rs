use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;
use crate::error::StoreError;
use crate::memory::{MemoryStore, SAMPLE_PROJECT_ID};
use crate::model::{
    is_placeholder, KeyDraft, ProjectChanges, ProjectDraft, TranslationValues,
};
use crate::queries::QueryClient;
use crate::telemetry::Event;

const ACTOR: &str = "current.user";
const MOBILE: &str = "mobile";

struct Fixture {
    store: Arc<MemoryStore>,
    cache: Arc<QueryCache>,
    coordinator: MutationCoordinator,
    telemetry: Arc<Handle>,
}

/// Sample store plus a second project with `supportedLanguages = [en, es]`, with every
/// descriptor the tests look at already loaded.
async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::with_sample_data());
    let now = Utc::now();
    let mut mobile = ProjectDraft {
        name: "Mobile".into(),
        default_language: "en".into(),
        supported_languages: vec!["es".into()],
        ..ProjectDraft::default()
    }
    .validate()
    .unwrap()
    .to_project(MOBILE.into(), "admin", now);
    mobile.translation_key_count = 1;
    store.insert_project(mobile);
    store.insert_key(
        KeyDraft {
            key: "tab.home".into(),
            category: "tabs".into(),
            translations: values(&[("en", "Home")]),
            ..KeyDraft::default()
        }
        .validate()
        .unwrap()
        .to_key("m1".into(), MOBILE, "admin", now),
    );

    let cache = Arc::new(QueryCache::new());
    let telemetry = Arc::new(Handle::new());
    let queries = QueryClient::new(cache.clone(), store.clone(), telemetry.clone());
    queries.keys(None).await.unwrap();
    queries.keys(Some(SAMPLE_PROJECT_ID)).await.unwrap();
    queries.keys(Some(MOBILE)).await.unwrap();
    queries.key("1").await.unwrap();
    queries.categories(None).await.unwrap();
    queries.categories(Some(SAMPLE_PROJECT_ID)).await.unwrap();
    queries.projects().await.unwrap();
    queries.project(SAMPLE_PROJECT_ID).await.unwrap();
    queries.project(MOBILE).await.unwrap();

    let coordinator = MutationCoordinator::new(
        cache.clone(),
        store.clone(),
        Arc::new(SelectionStore::new()),
        telemetry.clone(),
        ACTOR,
    );
    Fixture {
        store,
        cache,
        coordinator,
        telemetry,
    }
}

fn values(pairs: &[(&str, &str)]) -> TranslationValues {
    pairs
        .iter()
        .map(|(language, value)| (language.to_string(), value.to_string()))
        .collect()
}

fn everything() -> Vec<QueryPattern> {
    vec![
        QueryKind::Keys.into(),
        QueryKind::KeyDetail.into(),
        QueryKind::Categories.into(),
        QueryKind::Projects.into(),
        QueryKind::Project.into(),
    ]
}

/// Descriptor and payload of every cached entry, ignoring freshness flags.
fn cached_values(cache: &QueryCache) -> Vec<(QueryKey, QueryData)> {
    let snapshot = cache.snapshot(&everything());
    snapshot
        .keys()
        .filter_map(|key| snapshot.get(key).map(|data| (key.clone(), data.clone())))
        .collect()
}

fn listed(cache: &QueryCache, descriptor: QueryKey) -> Vec<TranslationKey> {
    match cache.read(&descriptor) {
        Some(QueryData::Keys(keys)) => keys,
        other => panic!("expected key list under {descriptor}, got {other:?}"),
    }
}

fn listed_ids(cache: &QueryCache, descriptor: QueryKey) -> Vec<String> {
    listed(cache, descriptor)
        .into_iter()
        .map(|key| key.id)
        .collect()
}

fn every_cached_key_id(cache: &QueryCache) -> Vec<String> {
    let mut ids = Vec::new();
    for (_, data) in cached_values(cache) {
        match data {
            QueryData::Keys(keys) => ids.extend(keys.into_iter().map(|key| key.id)),
            QueryData::Key(Some(key)) => ids.push(key.id),
            _ => {}
        }
    }
    ids
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn save_draft() -> KeyDraft {
    KeyDraft {
        key: "button.submit".into(),
        category: "buttons".into(),
        description: Some("Submit button".into()),
        translations: values(&[("en", "Submit"), ("es", "Enviar")]),
    }
}

#[rstest]
#[case(MutationPhase::Idle, MutationPhase::Snapshotting, true)]
#[case(MutationPhase::Snapshotting, MutationPhase::OptimisticallyApplied, true)]
#[case(MutationPhase::OptimisticallyApplied, MutationPhase::Committed, true)]
#[case(MutationPhase::OptimisticallyApplied, MutationPhase::RolledBack, true)]
#[case(MutationPhase::Idle, MutationPhase::Committed, false)]
#[case(MutationPhase::Committed, MutationPhase::RolledBack, false)]
#[case(MutationPhase::RolledBack, MutationPhase::Committed, false)]
#[case(MutationPhase::Committed, MutationPhase::Snapshotting, false)]
fn phase_transitions(
    #[case] from: MutationPhase,
    #[case] to: MutationPhase,
    #[case] allowed: bool,
) {
    assert_eq!(from.can_advance_to(to), allowed);
}

#[test]
fn terminal_run_refuses_further_phases() {
    let mut run = MutationRun::new(MutationId(1), MutationKind::DeleteKey);
    assert!(run.advance(MutationPhase::Snapshotting));
    assert!(run.advance(MutationPhase::OptimisticallyApplied));
    assert!(run.advance(MutationPhase::RolledBack));
    assert!(run.phase().is_terminal());
    assert!(!run.advance(MutationPhase::Committed));
    assert_eq!(run.phase(), MutationPhase::RolledBack);
}

#[tokio::test]
async fn create_key_shows_placeholder_until_committed() {
    let fx = fixture().await;
    fx.store.hold_writes();

    let task = tokio::spawn({
        let coordinator = fx.coordinator.clone();
        async move {
            coordinator
                .create_translation_key(SAMPLE_PROJECT_ID, &save_draft())
                .await
        }
    });

    let cache = fx.cache.clone();
    wait_until(move || cache.is_pending(&QueryKey::keys(None))).await;
    let all = listed(&fx.cache, QueryKey::keys(None));
    let placeholder = all.last().unwrap().clone();
    assert!(is_placeholder(&placeholder.id));
    assert_eq!(placeholder.translations["en"].updated_by, ACTOR);
    assert!(listed_ids(&fx.cache, QueryKey::keys(Some(SAMPLE_PROJECT_ID))).contains(&placeholder.id));
    assert!(!listed_ids(&fx.cache, QueryKey::keys(Some(MOBILE))).contains(&placeholder.id));
    assert_eq!(
        fx.coordinator
            .cached_project(SAMPLE_PROJECT_ID)
            .unwrap()
            .translation_key_count,
        6
    );

    fx.store.release_write();
    let created = task.await.unwrap().unwrap();

    let ids = every_cached_key_id(&fx.cache);
    assert!(ids.iter().all(|id| !is_placeholder(id)));
    for descriptor in [QueryKey::keys(None), QueryKey::keys(Some(SAMPLE_PROJECT_ID))] {
        let occurrences = listed_ids(&fx.cache, descriptor)
            .into_iter()
            .filter(|id| *id == created.id)
            .count();
        assert_eq!(occurrences, 1);
    }
    assert!(!fx.cache.is_pending(&QueryKey::keys(None)));
    assert!(fx.cache.is_stale(&QueryKey::categories(Some(SAMPLE_PROJECT_ID))));
    assert!(fx.cache.is_stale(&QueryKey::categories(None)));
    assert!(fx.cache.is_stale(&QueryKey::project(SAMPLE_PROJECT_ID)));
}

#[tokio::test]
async fn create_key_failure_restores_every_snapshot() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    fx.store.fail_next_write(StoreError::Status {
        status: 500,
        message: "database unavailable".into(),
    });

    let err = fx
        .coordinator
        .create_translation_key(SAMPLE_PROJECT_ID, &save_draft())
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(fx.cache.snapshot(&everything()), before);
    if fx.telemetry.is_enabled() {
        assert!(fx
            .telemetry
            .events()
            .iter()
            .any(|event| matches!(event, Event::MutationRolledBack { action: "create-key", .. })));
    }
}

#[tokio::test]
async fn whitespace_key_is_rejected_without_side_effects() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    let calls = fx.store.calls().len();

    let err = fx
        .coordinator
        .create_translation_key(
            SAMPLE_PROJECT_ID,
            &KeyDraft {
                key: "  ".into(),
                ..save_draft()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Validation(ValidationError::EmptyKey)));
    assert!(!err.is_rolled_back());
    assert_eq!(fx.cache.snapshot(&everything()), before);
    assert_eq!(fx.store.calls().len(), calls);
}

#[tokio::test]
async fn trimmed_equal_update_is_not_dispatched() {
    let fx = fixture().await;
    let original = fx.coordinator.cached_key("1").unwrap();

    let outcome = fx
        .coordinator
        .update_translation_key("1", &values(&[("en", "Save "), ("es", "   ")]))
        .await
        .unwrap();

    assert_eq!(outcome, None);
    assert_eq!(fx.store.write_calls(), 0);
    assert_eq!(fx.coordinator.cached_key("1").unwrap(), original);
}

#[tokio::test]
async fn update_key_stamps_actor_then_accepts_server_value() {
    let fx = fixture().await;
    fx.store.hold_writes();

    let task = tokio::spawn({
        let coordinator = fx.coordinator.clone();
        async move {
            coordinator
                .update_translation_key("1", &values(&[("es", " Guardar cambios ")]))
                .await
        }
    });

    let cache = fx.cache.clone();
    wait_until(move || cache.is_pending(&QueryKey::key_detail("1"))).await;
    for descriptor in [QueryKey::keys(None), QueryKey::keys(Some(SAMPLE_PROJECT_ID))] {
        let key = listed(&fx.cache, descriptor)
            .into_iter()
            .find(|key| key.id == "1")
            .unwrap();
        assert_eq!(key.value("es"), Some("Guardar cambios"));
        assert_eq!(key.translations["es"].updated_by, ACTOR);
        assert_eq!(key.value("en"), Some("Save"));
    }

    fx.store.release_write();
    let updated = task.await.unwrap().unwrap().unwrap();

    assert_eq!(updated.translations["es"].updated_by, "demo-user");
    assert_eq!(
        fx.cache.read(&QueryKey::key_detail("1")),
        Some(QueryData::Key(Some(updated)))
    );
    assert!(fx.cache.is_stale(&QueryKey::key_detail("1")));
    assert!(fx.cache.is_stale(&QueryKey::keys(None)));
}

#[tokio::test]
async fn update_key_failure_restores_and_still_invalidates() {
    let fx = fixture().await;
    let before = cached_values(&fx.cache);
    fx.store.fail_next_write(StoreError::Timeout);

    let err = fx
        .coordinator
        .update_translation_key("1", &values(&[("fr", "Sauvegarder")]))
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(cached_values(&fx.cache), before);
    assert!(fx.cache.is_stale(&QueryKey::key_detail("1")));
    assert!(fx.cache.is_stale(&QueryKey::keys(Some(SAMPLE_PROJECT_ID))));
    assert!(!fx.cache.is_pending(&QueryKey::key_detail("1")));
}

#[tokio::test]
async fn delete_key_drops_detail_and_selection() {
    let fx = fixture().await;
    fx.coordinator.selection().toggle_key("1");
    fx.coordinator.selection().start_editing("1");

    fx.coordinator.delete_translation_key("1").await.unwrap();

    assert!(!listed_ids(&fx.cache, QueryKey::keys(None)).contains(&"1".to_string()));
    assert!(!listed_ids(&fx.cache, QueryKey::keys(Some(SAMPLE_PROJECT_ID))).contains(&"1".to_string()));
    assert!(!fx.cache.contains(&QueryKey::key_detail("1")));
    assert_eq!(
        fx.coordinator
            .cached_project(SAMPLE_PROJECT_ID)
            .unwrap()
            .translation_key_count,
        4
    );
    assert!(fx.cache.is_stale(&QueryKey::categories(Some(SAMPLE_PROJECT_ID))));
    let selection = fx.coordinator.selection().get();
    assert!(selection.selected_keys.is_empty());
    assert_eq!(selection.editing_key, None);
}

#[tokio::test]
async fn delete_key_failure_restores_lists_and_counts() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    fx.store
        .fail_next_write(StoreError::NotFound("Translation key not found".into()));

    let err = fx.coordinator.delete_translation_key("1").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(err.is_rolled_back());
    assert_eq!(fx.cache.snapshot(&everything()), before);
}

#[tokio::test]
async fn abandoned_mutation_still_rolls_back() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    fx.store.hold_writes();
    fx.store.fail_next_write(StoreError::Timeout);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        fx.coordinator.delete_translation_key("1"),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(!listed_ids(&fx.cache, QueryKey::keys(None)).contains(&"1".to_string()));

    fx.store.release_write();
    let cache = fx.cache.clone();
    wait_until(move || !cache.is_pending(&QueryKey::keys(None))).await;
    assert_eq!(fx.cache.snapshot(&everything()), before);
}

#[tokio::test]
async fn adding_a_language_twice_keeps_set_semantics() {
    let fx = fixture().await;

    fx.coordinator.add_project_language(MOBILE, "fr").await.unwrap();
    fx.coordinator.add_project_language(MOBILE, " fr ").await.unwrap();

    let project = fx.coordinator.cached_project(MOBILE).unwrap();
    assert_eq!(project.supported_languages, ["en", "es", "fr"]);
    assert_eq!(fx.store.project(MOBILE).unwrap().supported_languages, ["en", "es", "fr"]);
    assert!(fx.cache.is_stale(&QueryKey::project(MOBILE)));
}

#[tokio::test]
async fn removing_a_language_purges_every_cached_copy() {
    let fx = fixture().await;

    fx.coordinator
        .remove_project_language(SAMPLE_PROJECT_ID, "es")
        .await
        .unwrap();

    let project = fx.coordinator.cached_project(SAMPLE_PROJECT_ID).unwrap();
    assert_eq!(project.supported_languages, ["en", "fr", "de"]);
    for descriptor in [QueryKey::keys(None), QueryKey::keys(Some(SAMPLE_PROJECT_ID))] {
        for key in listed(&fx.cache, descriptor) {
            if key.project_id == SAMPLE_PROJECT_ID {
                assert!(!key.translations.contains_key("es"), "{} kept es", key.key);
            }
        }
    }
    let Some(QueryData::Key(Some(detail))) = fx.cache.read(&QueryKey::key_detail("1")) else {
        panic!("key detail missing");
    };
    assert_eq!(
        detail.translations.keys().cloned().collect::<Vec<_>>(),
        ["de", "en", "fr"]
    );
    assert!(fx.cache.is_stale(&QueryKey::keys(None)));
}

#[tokio::test]
async fn removing_the_default_language_is_rejected_locally() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    let calls = fx.store.calls().len();

    let err = fx
        .coordinator
        .remove_project_language(SAMPLE_PROJECT_ID, "en")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MutationError::Validation(ValidationError::DefaultLanguageRemoval { .. })
    ));
    assert_eq!(fx.cache.snapshot(&everything()), before);
    assert_eq!(fx.store.calls().len(), calls);
}

#[tokio::test]
async fn remove_language_failure_restores_keys_and_project() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    fx.store.fail_next_write(StoreError::Transport("connection reset".into()));

    let err = fx
        .coordinator
        .remove_project_language(SAMPLE_PROJECT_ID, "de")
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(fx.cache.snapshot(&everything()), before);
}

#[tokio::test]
async fn create_project_replaces_placeholder_with_canonical() {
    let fx = fixture().await;

    let created = fx
        .coordinator
        .create_project(&ProjectDraft {
            name: "Docs".into(),
            default_language: "en".into(),
            supported_languages: vec!["fr".into()],
            ..ProjectDraft::default()
        })
        .await
        .unwrap();

    assert_eq!(created.supported_languages, ["en", "fr"]);
    let Some(QueryData::Projects(projects)) = fx.cache.read(&QueryKey::Projects) else {
        panic!("projects list missing");
    };
    assert!(projects.iter().all(|project| !is_placeholder(&project.id)));
    assert_eq!(
        projects.iter().filter(|project| project.id == created.id).count(),
        1
    );
    assert_eq!(fx.coordinator.cached_project(&created.id), Some(created));
}

#[tokio::test]
async fn update_project_cannot_drop_default_language() {
    let fx = fixture().await;

    let err = fx
        .coordinator
        .update_project(
            SAMPLE_PROJECT_ID,
            &ProjectChanges {
                supported_languages: Some(vec!["es".into(), "fr".into()]),
                ..ProjectChanges::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MutationError::Validation(ValidationError::DefaultLanguageDropped { .. })
    ));
    assert_eq!(fx.store.write_calls(), 0);
}

#[tokio::test]
async fn update_project_purges_dropped_languages() {
    let fx = fixture().await;

    let updated = fx
        .coordinator
        .update_project(
            SAMPLE_PROJECT_ID,
            &ProjectChanges {
                name: Some(" Web Dashboard ".into()),
                supported_languages: Some(vec!["en".into(), "es".into(), "fr".into()]),
                ..ProjectChanges::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.name, "Web Dashboard");
    assert_eq!(fx.coordinator.cached_project(SAMPLE_PROJECT_ID), Some(updated));
    let key = fx.coordinator.cached_key("1").unwrap();
    assert!(!key.translations.contains_key("de"));
    assert!(fx.cache.is_stale(&QueryKey::keys(None)));
}

#[tokio::test]
async fn delete_project_cascades_and_clears_current_project() {
    let fx = fixture().await;
    fx.coordinator.selection().select_project(Some(SAMPLE_PROJECT_ID));

    fx.coordinator.delete_project(SAMPLE_PROJECT_ID).await.unwrap();

    assert_eq!(listed_ids(&fx.cache, QueryKey::keys(None)), ["m1"]);
    assert!(!fx.cache.contains(&QueryKey::keys(Some(SAMPLE_PROJECT_ID))));
    assert!(!fx.cache.contains(&QueryKey::project(SAMPLE_PROJECT_ID)));
    assert!(!fx.cache.contains(&QueryKey::key_detail("1")));
    assert_eq!(fx.coordinator.cached_project(SAMPLE_PROJECT_ID), None);
    assert_eq!(fx.coordinator.selection().current_project(), None);
}

#[tokio::test]
async fn delete_project_failure_restores_projects_and_keys() {
    let fx = fixture().await;
    let before = fx.cache.snapshot(&everything());
    fx.store.fail_next_write(StoreError::Timeout);

    let err = fx
        .coordinator
        .delete_project(SAMPLE_PROJECT_ID)
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(fx.cache.snapshot(&everything()), before);
}

fn cold_coordinator(store: Arc<MemoryStore>) -> MutationCoordinator {
    MutationCoordinator::new(
        Arc::new(QueryCache::new()),
        store,
        Arc::new(SelectionStore::new()),
        Arc::new(Handle::new()),
        ACTOR,
    )
}

#[tokio::test]
async fn default_language_guard_fetches_an_uncached_project() {
    let store = Arc::new(MemoryStore::with_sample_data());
    let coordinator = cold_coordinator(store.clone());

    let err = coordinator
        .remove_project_language(SAMPLE_PROJECT_ID, "en")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MutationError::Validation(ValidationError::DefaultLanguageRemoval { .. })
    ));
    assert_eq!(store.calls(), ["get_project"]);
    assert_eq!(store.write_calls(), 0);
    assert!(store.project(SAMPLE_PROJECT_ID).unwrap().supports("en"));
    assert!(coordinator.cache().is_empty());
}

#[tokio::test]
async fn uncached_project_still_loses_other_languages() {
    let store = Arc::new(MemoryStore::with_sample_data());
    let coordinator = cold_coordinator(store.clone());

    coordinator
        .remove_project_language(SAMPLE_PROJECT_ID, "de")
        .await
        .unwrap();

    assert_eq!(store.calls(), ["get_project", "remove_language"]);
    assert_eq!(
        store.project(SAMPLE_PROJECT_ID).unwrap().supported_languages,
        ["en", "es", "fr"]
    );
}

#[tokio::test]
async fn update_project_checks_default_language_of_uncached_project() {
    let store = Arc::new(MemoryStore::with_sample_data());
    let coordinator = cold_coordinator(store.clone());

    let err = coordinator
        .update_project(
            SAMPLE_PROJECT_ID,
            &ProjectChanges {
                supported_languages: Some(vec!["es".into()]),
                ..ProjectChanges::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MutationError::Validation(ValidationError::DefaultLanguageDropped { .. })
    ));
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn unreachable_server_fails_the_guard_fetch_cleanly() {
    let store = Arc::new(MemoryStore::with_sample_data());
    store.fail_next_read(StoreError::Timeout);
    let coordinator = cold_coordinator(store.clone());

    let err = coordinator
        .remove_project_language(SAMPLE_PROJECT_ID, "de")
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Store(StoreError::Timeout)));
    assert_eq!(store.write_calls(), 0);
    assert!(coordinator.cache().is_empty());
}

#[tokio::test]
async fn add_language_failure_restores_project() {
    let fx = fixture().await;
    let before = cached_values(&fx.cache);
    fx.store.fail_next_write(StoreError::Status {
        status: 500,
        message: "database unavailable".into(),
    });

    let err = fx
        .coordinator
        .add_project_language(MOBILE, "fr")
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(cached_values(&fx.cache), before);
    assert_eq!(
        fx.coordinator.cached_project(MOBILE).unwrap().supported_languages,
        ["en", "es"]
    );
    assert!(!fx.cache.is_pending(&QueryKey::project(MOBILE)));
    assert!(!fx.cache.is_pending(&QueryKey::Projects));
}

#[tokio::test]
async fn create_project_failure_drops_placeholder() {
    let fx = fixture().await;
    let before = cached_values(&fx.cache);
    fx.store.fail_next_write(StoreError::Status {
        status: 500,
        message: "database unavailable".into(),
    });

    let err = fx
        .coordinator
        .create_project(&ProjectDraft {
            name: "Docs".into(),
            default_language: "en".into(),
            ..ProjectDraft::default()
        })
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(cached_values(&fx.cache), before);
    let Some(QueryData::Projects(projects)) = fx.cache.read(&QueryKey::Projects) else {
        panic!("projects list missing");
    };
    assert!(projects.iter().all(|project| !is_placeholder(&project.id)));
    if fx.telemetry.is_enabled() {
        assert!(fx
            .telemetry
            .events()
            .iter()
            .any(|event| matches!(event, Event::MutationRolledBack { action: "create-project", .. })));
    }
}

#[tokio::test]
async fn update_project_failure_restores_project_and_purged_keys() {
    let fx = fixture().await;
    let before = cached_values(&fx.cache);
    fx.store.fail_next_write(StoreError::Status {
        status: 500,
        message: "database unavailable".into(),
    });

    let err = fx
        .coordinator
        .update_project(
            SAMPLE_PROJECT_ID,
            &ProjectChanges {
                name: Some("Web Dashboard".into()),
                supported_languages: Some(vec!["en".into(), "es".into()]),
                ..ProjectChanges::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(cached_values(&fx.cache), before);
    let key = fx.coordinator.cached_key("1").unwrap();
    assert!(key.translations.contains_key("de"));
    assert!(key.translations.contains_key("fr"));
    assert_eq!(
        fx.coordinator.cached_project(SAMPLE_PROJECT_ID).unwrap().name,
        "Web App"
    );
}

#[tokio::test]
async fn panicking_commit_restores_snapshot() {
    let fx = fixture().await;
    let before = cached_values(&fx.cache);
    let plan = MutationPlan::new(MutationKind::DeleteProject)
        .snapshot(QueryKey::Projects)
        .settle(QueryKey::Projects);

    let err = fx
        .coordinator
        .with_optimistic_update(
            plan,
            |cache: &QueryCache, mutation: MutationId| {
                cache.update_matching(&QueryKey::Projects.into(), Some(mutation), |_, _| {
                    Some(QueryData::Projects(Vec::new()))
                });
            },
            |_: Arc<dyn RemoteStore>| async { Ok::<(), StoreError>(()) },
            |_: &MutationCoordinator, _: &()| panic!("commit failed"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Aborted(_)));
    assert_eq!(cached_values(&fx.cache), before);
    assert!(!fx.cache.is_pending(&QueryKey::Projects));
    assert!(fx.cache.is_stale(&QueryKey::Projects));
}
