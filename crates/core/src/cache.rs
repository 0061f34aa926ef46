//! Descriptor-addressed store of query results shared by the loaders and the mutation coordinator.
//!
//! Every entry is addressed by a [`QueryKey`] and holds a whole [`QueryData`] value; writes
//! replace the value for a descriptor atomically. The cache never talks to the network, see
//! [`crate::queries::QueryClient`] for loading.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::{Localizations, Project, ProjectStats, TranslationKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKind {
    Keys,
    KeyDetail,
    Categories,
    Projects,
    Project,
    ProjectStats,
    Localizations,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Keys => "keys",
            QueryKind::KeyDetail => "key",
            QueryKind::Categories => "categories",
            QueryKind::Projects => "projects",
            QueryKind::Project => "project",
            QueryKind::ProjectStats => "project-stats",
            QueryKind::Localizations => "localizations",
        }
    }

    /// Age after which an entry of this kind is refetched on the next load.
    pub fn stale_after(self) -> Duration {
        match self {
            QueryKind::Keys | QueryKind::KeyDetail | QueryKind::Projects | QueryKind::Project => {
                Duration::from_secs(5 * 60)
            }
            QueryKind::Categories | QueryKind::Localizations => Duration::from_secs(10 * 60),
            QueryKind::ProjectStats => Duration::from_secs(2 * 60),
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a cache entry: entity kind plus scope parameters.
///
/// `project_id: None` on list kinds is the "all projects" scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Keys { project_id: Option<String> },
    KeyDetail { id: String },
    Categories { project_id: Option<String> },
    Projects,
    Project { id: String },
    ProjectStats { project_id: String },
    Localizations { project_id: String, locale: String },
}

impl QueryKey {
    pub fn keys(project_id: Option<&str>) -> Self {
        QueryKey::Keys {
            project_id: project_id.map(str::to_string),
        }
    }

    pub fn key_detail(id: &str) -> Self {
        QueryKey::KeyDetail { id: id.to_string() }
    }

    pub fn categories(project_id: Option<&str>) -> Self {
        QueryKey::Categories {
            project_id: project_id.map(str::to_string),
        }
    }

    pub fn project(id: &str) -> Self {
        QueryKey::Project { id: id.to_string() }
    }

    pub fn project_stats(project_id: &str) -> Self {
        QueryKey::ProjectStats {
            project_id: project_id.to_string(),
        }
    }

    pub fn localizations(project_id: &str, locale: &str) -> Self {
        QueryKey::Localizations {
            project_id: project_id.to_string(),
            locale: locale.to_string(),
        }
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            QueryKey::Keys { .. } => QueryKind::Keys,
            QueryKey::KeyDetail { .. } => QueryKind::KeyDetail,
            QueryKey::Categories { .. } => QueryKind::Categories,
            QueryKey::Projects => QueryKind::Projects,
            QueryKey::Project { .. } => QueryKind::Project,
            QueryKey::ProjectStats { .. } => QueryKind::ProjectStats,
            QueryKey::Localizations { .. } => QueryKind::Localizations,
        }
    }

    /// The project this descriptor is scoped to, if any.
    pub fn project_scope(&self) -> Option<&str> {
        match self {
            QueryKey::Keys { project_id } | QueryKey::Categories { project_id } => {
                project_id.as_deref()
            }
            QueryKey::Project { id } => Some(id),
            QueryKey::ProjectStats { project_id } | QueryKey::Localizations { project_id, .. } => {
                Some(project_id)
            }
            QueryKey::KeyDetail { .. } | QueryKey::Projects => None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Keys { project_id } | QueryKey::Categories { project_id } => write!(
                f,
                "{}/{}",
                self.kind(),
                project_id.as_deref().unwrap_or("all")
            ),
            QueryKey::KeyDetail { id } | QueryKey::Project { id } => {
                write!(f, "{}/{}", self.kind(), id)
            }
            QueryKey::Projects => f.write_str("projects"),
            QueryKey::ProjectStats { project_id } => write!(f, "project-stats/{project_id}"),
            QueryKey::Localizations { project_id, locale } => {
                write!(f, "localizations/{project_id}/{locale}")
            }
        }
    }
}

/// Selects a set of descriptors for snapshots, invalidation and removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPattern {
    Exact(QueryKey),
    Kind(QueryKind),
    /// Every descriptor of `kind` scoped to `project_id`; does not match the "all" scope.
    ProjectScoped { kind: QueryKind, project_id: String },
}

impl QueryPattern {
    pub fn scoped(kind: QueryKind, project_id: &str) -> Self {
        QueryPattern::ProjectScoped {
            kind,
            project_id: project_id.to_string(),
        }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            QueryPattern::Exact(expected) => expected == key,
            QueryPattern::Kind(kind) => key.kind() == *kind,
            QueryPattern::ProjectScoped { kind, project_id } => {
                key.kind() == *kind && key.project_scope() == Some(project_id.as_str())
            }
        }
    }
}

impl From<QueryKey> for QueryPattern {
    fn from(key: QueryKey) -> Self {
        QueryPattern::Exact(key)
    }
}

impl From<QueryKind> for QueryPattern {
    fn from(kind: QueryKind) -> Self {
        QueryPattern::Kind(kind)
    }
}

/// Cached result for one descriptor. `None` payloads are the not-found sentinel of "get" calls.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Keys(Vec<TranslationKey>),
    Key(Option<TranslationKey>),
    Categories(Vec<String>),
    Projects(Vec<Project>),
    Project(Option<Project>),
    Stats(Option<ProjectStats>),
    Localizations(Option<Localizations>),
}

impl QueryData {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryData::Keys(_) => QueryKind::Keys,
            QueryData::Key(_) => QueryKind::KeyDetail,
            QueryData::Categories(_) => QueryKind::Categories,
            QueryData::Projects(_) => QueryKind::Projects,
            QueryData::Project(_) => QueryKind::Project,
            QueryData::Stats(_) => QueryKind::ProjectStats,
            QueryData::Localizations(_) => QueryKind::Localizations,
        }
    }
}

/// Identifies one mutation run for pending markers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: QueryData,
    pub written_at: Instant,
    pub invalidated: bool,
    /// Set while the value is an unconfirmed optimistic projection.
    pub pending: Option<MutationId>,
}

impl CacheEntry {
    fn new(data: QueryData, pending: Option<MutationId>) -> Self {
        Self {
            data,
            written_at: Instant::now(),
            invalidated: false,
            pending,
        }
    }

    pub fn is_stale(&self, kind: QueryKind, now: Instant) -> bool {
        self.invalidated || now.saturating_duration_since(self.written_at) >= kind.stale_after()
    }
}

/// Verbatim copy of every entry matched at capture time, ordered by descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Vec<(QueryKey, CacheEntry)>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn get(&self, key: &QueryKey) -> Option<&QueryData> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, entry)| &entry.data)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, CacheEntry>,
    /// Bumped on every write or removal; never reset, so refetches can detect newer writes.
    generations: HashMap<QueryKey, u64>,
}

impl Inner {
    fn bump(&mut self, key: &QueryKey) {
        *self.generations.entry(key.clone()).or_insert(0) += 1;
    }

    fn put(&mut self, key: QueryKey, entry: CacheEntry) -> bool {
        if entry.data.kind() != key.kind() {
            tracing::warn!(
                descriptor = %key,
                payload = entry.data.kind().as_str(),
                "rejected cache write with mismatched payload"
            );
            return false;
        }
        self.bump(&key);
        self.entries.insert(key, entry);
        true
    }

    fn matching(&self, pattern: &QueryPattern) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .entries
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Shared query cache. Created once per [`crate::session::Session`] and passed explicitly to
/// the loaders and the coordinator.
#[derive(Default)]
pub struct QueryCache {
    inner: Mutex<Inner>,
    gates: Mutex<HashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.lock().entries.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, key: &QueryKey) -> Option<QueryData> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.data.clone())
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys_matching(&self, pattern: &QueryPattern) -> Vec<QueryKey> {
        self.inner.lock().matching(pattern)
    }

    /// Absent entries count as stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .map_or(true, |entry| entry.is_stale(key.kind(), Instant::now()))
    }

    pub fn is_pending(&self, key: &QueryKey) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.pending.is_some())
    }

    /// Replaces the value for `key` unconditionally.
    pub fn write(&self, key: QueryKey, data: QueryData) {
        self.inner.lock().put(key, CacheEntry::new(data, None));
    }

    pub fn write_optimistic(&self, key: QueryKey, data: QueryData, mutation: MutationId) {
        self.inner
            .lock()
            .put(key, CacheEntry::new(data, Some(mutation)));
    }

    /// Rewrites every entry matching `pattern` for which `f` yields a new value, under one lock.
    ///
    /// Returns the number of entries written.
    pub fn update_matching<F>(
        &self,
        pattern: &QueryPattern,
        pending: Option<MutationId>,
        mut f: F,
    ) -> usize
    where
        F: FnMut(&QueryKey, &QueryData) -> Option<QueryData>,
    {
        let mut inner = self.inner.lock();
        let mut written = 0;
        for key in inner.matching(pattern) {
            let Some(current) = inner.entries.get(&key) else {
                continue;
            };
            if let Some(next) = f(&key, &current.data) {
                if inner.put(key, CacheEntry::new(next, pending)) {
                    written += 1;
                }
            }
        }
        written
    }

    /// First value produced by `f` over the entries matching `pattern`, in descriptor order.
    pub fn find_map<T, F>(&self, pattern: &QueryPattern, mut f: F) -> Option<T>
    where
        F: FnMut(&QueryKey, &QueryData) -> Option<T>,
    {
        let inner = self.inner.lock();
        inner
            .matching(pattern)
            .into_iter()
            .find_map(|key| inner.entries.get(&key).and_then(|entry| f(&key, &entry.data)))
    }

    /// Marks matching entries stale; their next load refetches.
    pub fn invalidate(&self, pattern: &QueryPattern) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for entry in inner
            .entries
            .iter_mut()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(_, entry)| entry)
        {
            entry.invalidated = true;
            count += 1;
        }
        if count > 0 {
            tracing::trace!(?pattern, count, "invalidated cache entries");
        }
        count
    }

    pub fn remove(&self, pattern: &QueryPattern) -> usize {
        self.remove_where(pattern, |_, _| true)
    }

    pub fn remove_where<F>(&self, pattern: &QueryPattern, mut predicate: F) -> usize
    where
        F: FnMut(&QueryKey, &QueryData) -> bool,
    {
        let mut inner = self.inner.lock();
        let doomed: Vec<QueryKey> = inner
            .matching(pattern)
            .into_iter()
            .filter(|key| {
                inner
                    .entries
                    .get(key)
                    .is_some_and(|entry| predicate(key, &entry.data))
            })
            .collect();
        for key in &doomed {
            inner.entries.remove(key);
            inner.bump(key);
        }
        drop(inner);
        self.prune_gates(&doomed);
        doomed.len()
    }

    /// Captures every entry matched by any of `patterns`.
    pub fn snapshot(&self, patterns: &[QueryPattern]) -> Snapshot {
        let inner = self.inner.lock();
        let mut entries: Vec<(QueryKey, CacheEntry)> = inner
            .entries
            .iter()
            .filter(|(key, _)| patterns.iter().any(|pattern| pattern.matches(key)))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by(|(left, _), (right, _)| left.cmp(right));
        Snapshot { entries }
    }

    /// Puts every snapshotted entry back exactly as captured.
    pub fn restore(&self, snapshot: &Snapshot) {
        let mut inner = self.inner.lock();
        for (key, entry) in &snapshot.entries {
            inner.put(key.clone(), entry.clone());
        }
    }

    /// Clears the pending marker of entries still owned by `mutation`.
    pub fn settle(&self, mutation: MutationId) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for entry in inner.entries.values_mut() {
            if entry.pending == Some(mutation) {
                entry.pending = None;
                count += 1;
            }
        }
        count
    }

    pub fn generation(&self, key: &QueryKey) -> u64 {
        self.inner
            .lock()
            .generations
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Stores a fetched value unless the entry was written or removed since `generation`.
    pub fn write_if_current(&self, key: QueryKey, data: QueryData, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generations.get(&key).copied().unwrap_or(0) != generation {
            return false;
        }
        inner.put(key, CacheEntry::new(data, None))
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let keys: Vec<QueryKey> = inner.entries.keys().cloned().collect();
        for key in &keys {
            inner.bump(key);
        }
        inner.entries.clear();
        drop(inner);
        self.gates
            .lock()
            .retain(|_, gate| Arc::strong_count(gate) > 1);
    }

    /// Per-descriptor fetch gate; holding it marks a fetch as in flight.
    pub(crate) fn fetch_gate(&self, key: &QueryKey) -> Arc<tokio::sync::Mutex<()>> {
        self.gates
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops the gates of `keys` unless a fetch still holds one.
    fn prune_gates(&self, keys: &[QueryKey]) {
        let mut gates = self.gates.lock();
        for key in keys {
            if gates
                .get(key)
                .is_some_and(|gate| Arc::strong_count(gate) == 1)
            {
                gates.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn key(id: &str, project_id: &str) -> TranslationKey {
        TranslationKey {
            id: id.into(),
            project_id: project_id.into(),
            key: format!("label.{id}"),
            category: "labels".into(),
            description: None,
            translations: BTreeMap::new(),
        }
    }

    fn seeded() -> QueryCache {
        let cache = QueryCache::new();
        cache.write(QueryKey::keys(None), QueryData::Keys(vec![key("1", "p1"), key("2", "p2")]));
        cache.write(QueryKey::keys(Some("p1")), QueryData::Keys(vec![key("1", "p1")]));
        cache.write(QueryKey::categories(Some("p1")), QueryData::Categories(vec!["labels".into()]));
        cache.write(QueryKey::key_detail("1"), QueryData::Key(Some(key("1", "p1"))));
        cache
    }

    #[rstest]
    #[case(QueryPattern::Kind(QueryKind::Keys), QueryKey::keys(None), true)]
    #[case(QueryPattern::Kind(QueryKind::Keys), QueryKey::keys(Some("p1")), true)]
    #[case(QueryPattern::Kind(QueryKind::Keys), QueryKey::categories(None), false)]
    #[case(QueryPattern::scoped(QueryKind::Keys, "p1"), QueryKey::keys(Some("p1")), true)]
    #[case(QueryPattern::scoped(QueryKind::Keys, "p1"), QueryKey::keys(None), false)]
    #[case(QueryPattern::scoped(QueryKind::Localizations, "p1"), QueryKey::localizations("p1", "en"), true)]
    #[case(QueryPattern::Exact(QueryKey::Projects), QueryKey::Projects, true)]
    #[case(QueryPattern::Exact(QueryKey::project("p1")), QueryKey::project("p2"), false)]
    fn pattern_matching(
        #[case] pattern: QueryPattern,
        #[case] key: QueryKey,
        #[case] expected: bool,
    ) {
        assert_eq!(pattern.matches(&key), expected);
    }

    #[test]
    fn display_names_scope() {
        assert_eq!(QueryKey::keys(None).to_string(), "keys/all");
        assert_eq!(QueryKey::categories(Some("p1")).to_string(), "categories/p1");
        assert_eq!(QueryKey::localizations("p1", "fr").to_string(), "localizations/p1/fr");
    }

    #[test]
    fn write_replaces_whole_value() {
        let cache = seeded();
        cache.write(QueryKey::keys(Some("p1")), QueryData::Keys(Vec::new()));
        assert_eq!(cache.read(&QueryKey::keys(Some("p1"))), Some(QueryData::Keys(Vec::new())));
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let cache = seeded();
        cache.write(QueryKey::keys(Some("p1")), QueryData::Categories(Vec::new()));
        assert!(matches!(
            cache.read(&QueryKey::keys(Some("p1"))),
            Some(QueryData::Keys(keys)) if keys.len() == 1
        ));
    }

    #[test]
    fn invalidate_marks_matching_entries_stale() {
        let cache = seeded();
        assert!(!cache.is_stale(&QueryKey::keys(None)));

        let count = cache.invalidate(&QueryPattern::Kind(QueryKind::Keys));
        assert_eq!(count, 2);
        assert!(cache.is_stale(&QueryKey::keys(None)));
        assert!(cache.is_stale(&QueryKey::keys(Some("p1"))));
        assert!(!cache.is_stale(&QueryKey::categories(Some("p1"))));
        assert!(cache.is_stale(&QueryKey::Projects));
    }

    #[test]
    fn restore_puts_back_snapshot_verbatim() {
        let cache = seeded();
        cache.invalidate(&QueryPattern::Exact(QueryKey::keys(None)));
        let patterns = [QueryPattern::Kind(QueryKind::Keys), QueryPattern::Kind(QueryKind::KeyDetail)];
        let before = cache.snapshot(&patterns);
        assert_eq!(before.len(), 3);

        cache.update_matching(&patterns[0], Some(MutationId(7)), |_, _| {
            Some(QueryData::Keys(Vec::new()))
        });
        cache.remove(&QueryPattern::Kind(QueryKind::KeyDetail));
        assert_ne!(cache.snapshot(&patterns), before);

        cache.restore(&before);
        assert_eq!(cache.snapshot(&patterns), before);
        assert!(cache.is_stale(&QueryKey::keys(None)));
    }

    #[test]
    fn settle_clears_only_own_pending_marker() {
        let cache = seeded();
        cache.write_optimistic(QueryKey::keys(None), QueryData::Keys(Vec::new()), MutationId(1));
        cache.write_optimistic(QueryKey::keys(Some("p1")), QueryData::Keys(Vec::new()), MutationId(2));

        assert_eq!(cache.settle(MutationId(1)), 1);
        assert!(!cache.is_pending(&QueryKey::keys(None)));
        assert!(cache.is_pending(&QueryKey::keys(Some("p1"))));
    }

    #[test]
    fn fetched_value_discarded_after_newer_write() {
        let cache = seeded();
        let key = QueryKey::keys(Some("p1"));
        let generation = cache.generation(&key);

        cache.write_optimistic(key.clone(), QueryData::Keys(Vec::new()), MutationId(3));
        let stored = cache.write_if_current(key.clone(), QueryData::Keys(vec![key_stub()]), generation);

        assert!(!stored);
        assert_eq!(cache.read(&key), Some(QueryData::Keys(Vec::new())));
    }

    #[test]
    fn remove_where_filters_by_payload() {
        let cache = seeded();
        cache.write(QueryKey::key_detail("2"), QueryData::Key(Some(key("2", "p2"))));
        let removed = cache.remove_where(&QueryPattern::Kind(QueryKind::KeyDetail), |_, data| {
            matches!(data, QueryData::Key(Some(key)) if key.project_id == "p1")
        });
        assert_eq!(removed, 1);
        assert!(!cache.contains(&QueryKey::key_detail("1")));
        assert!(cache.contains(&QueryKey::key_detail("2")));
    }

    fn key_stub() -> TranslationKey {
        key("9", "p1")
    }

    #[test]
    fn removal_drops_idle_fetch_gates() {
        let cache = seeded();
        let busy = QueryKey::keys(Some("p1"));
        let idle = QueryKey::keys(None);
        let _in_flight = cache.fetch_gate(&busy);
        drop(cache.fetch_gate(&idle));

        assert_eq!(cache.remove(&QueryPattern::Kind(QueryKind::Keys)), 2);

        let gates = cache.gates.lock();
        assert!(gates.contains_key(&busy));
        assert!(!gates.contains_key(&idle));
    }

    #[test]
    fn clear_keeps_only_held_fetch_gates() {
        let cache = seeded();
        let busy = QueryKey::categories(Some("p1"));
        let _in_flight = cache.fetch_gate(&busy);
        for key in [QueryKey::keys(None), QueryKey::Projects, QueryKey::project("gone")] {
            drop(cache.fetch_gate(&key));
        }

        cache.clear();

        assert!(cache.is_empty());
        let gates = cache.gates.lock();
        assert_eq!(gates.keys().collect::<Vec<_>>(), [&busy]);
    }
}
