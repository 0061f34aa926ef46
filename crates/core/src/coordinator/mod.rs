//! Optimistic mutation coordinator.
//!
//! Every write runs through [`MutationCoordinator::with_optimistic_update`]: the entries named
//! by the plan are snapshotted, the optimistic projection is written, and the remote call is
//! awaited on a spawned task that either commits the canonical result or restores the snapshot.
//! The spawned task keeps running when the caller stops awaiting, so optimistic entries are
//! never left behind.

mod keys;
mod projects;

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::{
    MutationId, QueryCache, QueryData, QueryKey, QueryKind, QueryPattern, Snapshot,
};
use crate::error::{MutationError, StoreError, ValidationError};
use crate::model::{Project, TranslationKey};
use crate::remote::RemoteStore;
use crate::selection::SelectionStore;
use crate::telemetry::{Event, Handle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateKey,
    UpdateKey,
    DeleteKey,
    AddLanguage,
    RemoveLanguage,
    CreateProject,
    UpdateProject,
    DeleteProject,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::CreateKey => "create-key",
            MutationKind::UpdateKey => "update-key",
            MutationKind::DeleteKey => "delete-key",
            MutationKind::AddLanguage => "add-language",
            MutationKind::RemoveLanguage => "remove-language",
            MutationKind::CreateProject => "create-project",
            MutationKind::UpdateProject => "update-project",
            MutationKind::DeleteProject => "delete-project",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Snapshotting,
    OptimisticallyApplied,
    Committed,
    RolledBack,
}

impl MutationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MutationPhase::Committed | MutationPhase::RolledBack)
    }

    pub fn can_advance_to(self, next: MutationPhase) -> bool {
        matches!(
            (self, next),
            (MutationPhase::Idle, MutationPhase::Snapshotting)
                | (MutationPhase::Snapshotting, MutationPhase::OptimisticallyApplied)
                | (MutationPhase::OptimisticallyApplied, MutationPhase::Committed)
                | (MutationPhase::OptimisticallyApplied, MutationPhase::RolledBack)
        )
    }
}

/// One pass of a mutation through its phases.
#[derive(Debug)]
pub struct MutationRun {
    id: MutationId,
    kind: MutationKind,
    phase: MutationPhase,
}

impl MutationRun {
    pub fn new(id: MutationId, kind: MutationKind) -> Self {
        Self {
            id,
            kind,
            phase: MutationPhase::Idle,
        }
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// Moves to `next`; illegal transitions are refused and leave the phase unchanged.
    pub fn advance(&mut self, next: MutationPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            tracing::error!(
                mutation_id = %self.id,
                kind = self.kind.as_str(),
                from = ?self.phase,
                to = ?next,
                "refused illegal mutation phase transition"
            );
            return false;
        }
        tracing::trace!(mutation_id = %self.id, kind = self.kind.as_str(), phase = ?next, "mutation phase");
        self.phase = next;
        true
    }
}

/// Descriptors a mutation snapshots before its optimistic apply, and those it invalidates once
/// settled whatever the outcome.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    kind: MutationKind,
    snapshot: Vec<QueryPattern>,
    settle: Vec<QueryPattern>,
}

impl MutationPlan {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            snapshot: Vec::new(),
            settle: Vec::new(),
        }
    }

    pub fn snapshot(mut self, pattern: impl Into<QueryPattern>) -> Self {
        self.snapshot.push(pattern.into());
        self
    }

    pub fn settle(mut self, pattern: impl Into<QueryPattern>) -> Self {
        self.settle.push(pattern.into());
        self
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }
}

/// Runs create/update/delete operations against the remote store with optimistic cache updates.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: Arc<QueryCache>,
    remote: Arc<dyn RemoteStore>,
    selection: Arc<SelectionStore>,
    telemetry: Arc<Handle>,
    actor: Arc<str>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("actor", &self.actor)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MutationCoordinator {
    pub fn new(
        cache: Arc<QueryCache>,
        remote: Arc<dyn RemoteStore>,
        selection: Arc<SelectionStore>,
        telemetry: Arc<Handle>,
        actor: &str,
    ) -> Self {
        Self {
            cache,
            remote,
            selection,
            telemetry,
            actor: Arc::from(actor),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn selection(&self) -> &Arc<SelectionStore> {
        &self.selection
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    fn next_mutation_id(&self) -> MutationId {
        MutationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn reject(&self, kind: MutationKind, error: ValidationError) -> MutationError {
        tracing::debug!(kind = kind.as_str(), error = %error, "mutation rejected");
        self.telemetry.record(Event::MutationRejected {
            action: kind.as_str(),
            error: error.to_string(),
        });
        MutationError::Validation(error)
    }

    /// Snapshot, optimistic apply, then commit or rollback.
    ///
    /// `apply` must only touch entries matched by the plan's snapshot patterns. `commit` runs
    /// after the remote call succeeded and receives its result. On failure every snapshotted
    /// entry is restored verbatim before the error is returned. A panicking `commit` rolls back
    /// the same way and surfaces as [`MutationError::Aborted`].
    pub async fn with_optimistic_update<T, Apply, Call, Fut, Commit>(
        &self,
        plan: MutationPlan,
        apply: Apply,
        call: Call,
        commit: Commit,
    ) -> Result<T, MutationError>
    where
        T: Send + 'static,
        Apply: FnOnce(&QueryCache, MutationId),
        Call: FnOnce(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        Commit: FnOnce(&MutationCoordinator, &T) + Send + 'static,
    {
        let mut run = MutationRun::new(self.next_mutation_id(), plan.kind);
        let id = run.id();
        let action = plan.kind.as_str();

        run.advance(MutationPhase::Snapshotting);
        let snapshot = self.cache.snapshot(&plan.snapshot);
        apply(&self.cache, id);
        run.advance(MutationPhase::OptimisticallyApplied);
        tracing::debug!(
            mutation_id = %id,
            kind = action,
            entries = snapshot.len(),
            "optimistic update applied"
        );
        self.telemetry.record(Event::MutationApplied { id, action });

        let request = call(self.remote.clone());
        let this = self.clone();
        let fallback = snapshot.clone();
        let settle = plan.settle.clone();
        let task = tokio::spawn(async move {
            let outcome = match request.await {
                Ok(value) => {
                    match panic::catch_unwind(AssertUnwindSafe(|| commit(&this, &value))) {
                        Ok(()) => {
                            this.cache.settle(id);
                            run.advance(MutationPhase::Committed);
                            tracing::debug!(mutation_id = %id, kind = action, "mutation committed");
                            this.telemetry.record(Event::MutationCommitted { id, action });
                            Ok(value)
                        }
                        Err(_) => {
                            this.roll_back(&mut run, &snapshot, "commit panicked");
                            Err(MutationError::Aborted("commit panicked".to_string()))
                        }
                    }
                }
                Err(error) => {
                    this.roll_back(&mut run, &snapshot, &error.to_string());
                    Err(MutationError::from(error))
                }
            };
            for pattern in &plan.settle {
                this.cache.invalidate(pattern);
            }
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(mutation_id = %id, kind = action, error = %error, "mutation task aborted");
                self.cache.restore(&fallback);
                self.cache.settle(id);
                for pattern in &settle {
                    self.cache.invalidate(pattern);
                }
                self.telemetry.record(Event::MutationRolledBack {
                    id,
                    action,
                    error: error.to_string(),
                });
                Err(MutationError::Aborted(error.to_string()))
            }
        }
    }

    fn roll_back(&self, run: &mut MutationRun, snapshot: &Snapshot, error: &str) {
        let id = run.id();
        let action = run.kind().as_str();
        self.cache.restore(snapshot);
        self.cache.settle(id);
        run.advance(MutationPhase::RolledBack);
        tracing::warn!(
            mutation_id = %id,
            kind = action,
            error,
            restored = snapshot.len(),
            "mutation rolled back"
        );
        self.telemetry.record(Event::MutationRolledBack {
            id,
            action,
            error: error.to_string(),
        });
    }

    /// The project as currently cached, preferring the detail entry over the list.
    pub fn cached_project(&self, project_id: &str) -> Option<Project> {
        let detail = self
            .cache
            .find_map(&QueryKey::project(project_id).into(), |_, data| match data {
                QueryData::Project(Some(project)) => Some(project.clone()),
                _ => None,
            });
        detail.or_else(|| {
            self.cache
                .find_map(&QueryKey::Projects.into(), |_, data| match data {
                    QueryData::Projects(projects) => {
                        projects.iter().find(|project| project.id == project_id).cloned()
                    }
                    _ => None,
                })
        })
    }

    /// The cached project, or the server's copy when nothing is cached. Used by checks that
    /// must hold whether or not the project was loaded first; the fetched copy is not cached.
    async fn project_for_checks(&self, project_id: &str) -> Result<Option<Project>, MutationError> {
        if let Some(project) = self.cached_project(project_id) {
            return Ok(Some(project));
        }
        tracing::debug!(project_id, "project not cached, fetching before validation");
        Ok(self.remote.get_project(project_id).await?)
    }

    /// The key as currently cached, preferring the detail entry over any list.
    pub fn cached_key(&self, key_id: &str) -> Option<TranslationKey> {
        let detail = self
            .cache
            .find_map(&QueryKey::key_detail(key_id).into(), |_, data| match data {
                QueryData::Key(Some(key)) => Some(key.clone()),
                _ => None,
            });
        detail.or_else(|| {
            self.cache
                .find_map(&QueryKind::Keys.into(), |_, data| match data {
                    QueryData::Keys(keys) => keys.iter().find(|key| key.id == key_id).cloned(),
                    _ => None,
                })
        })
    }
}

/// Rewrites `project_id` in the projects list and its detail entry.
fn update_cached_project<F>(
    cache: &QueryCache,
    pending: Option<MutationId>,
    project_id: &str,
    mut f: F,
) -> usize
where
    F: FnMut(&mut Project),
{
    let mut written = cache.update_matching(&QueryKey::Projects.into(), pending, |_, data| {
        let QueryData::Projects(projects) = data else {
            return None;
        };
        if !projects.iter().any(|project| project.id == project_id) {
            return None;
        }
        let mut next = projects.clone();
        next.iter_mut()
            .filter(|project| project.id == project_id)
            .for_each(&mut f);
        Some(QueryData::Projects(next))
    });
    written += cache.update_matching(&QueryKey::project(project_id).into(), pending, |_, data| {
        let QueryData::Project(Some(project)) = data else {
            return None;
        };
        let mut next = project.clone();
        f(&mut next);
        Some(QueryData::Project(Some(next)))
    });
    written
}

/// Rewrites every cached key of `project_id`, in key lists and key detail entries alike.
fn update_cached_project_keys<F>(
    cache: &QueryCache,
    pending: Option<MutationId>,
    project_id: &str,
    mut f: F,
) -> usize
where
    F: FnMut(&mut TranslationKey),
{
    let mut written = cache.update_matching(&QueryKind::Keys.into(), pending, |_, data| {
        let QueryData::Keys(keys) = data else {
            return None;
        };
        if !keys.iter().any(|key| key.project_id == project_id) {
            return None;
        }
        let mut next = keys.clone();
        next.iter_mut()
            .filter(|key| key.project_id == project_id)
            .for_each(&mut f);
        Some(QueryData::Keys(next))
    });
    written += cache.update_matching(&QueryKind::KeyDetail.into(), pending, |_, data| {
        match data {
            QueryData::Key(Some(key)) if key.project_id == project_id => {
                let mut next = key.clone();
                f(&mut next);
                Some(QueryData::Key(Some(next)))
            }
            _ => None,
        }
    });
    written
}

/// Key list descriptors currently holding a key with `key_id`.
fn lists_containing(cache: &QueryCache, key_id: &str) -> Vec<QueryKey> {
    cache
        .keys_matching(&QueryKind::Keys.into())
        .into_iter()
        .filter(|descriptor| {
            matches!(
                cache.read(descriptor),
                Some(QueryData::Keys(keys)) if keys.iter().any(|key| key.id == key_id)
            )
        })
        .collect()
}

#[cfg(test)]
mod tests;
