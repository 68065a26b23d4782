//! The in-memory cache store.

use super::clock::{Clock, SystemClock};
use super::dependency::{Dependency, DependencyIndex, EdgeOrigin};
use super::generation::{Generation, Generations};
use super::read::CacheRead;
use super::tracking::{TrackingRegistry, TrackingScope};
use super::traits::{CacheStats, Cacheable};
use serde::Serialize;
use serde_json::Value;
use sheetstock_core::{CacheKey, Namespace, StorageError, Timestamp, TrackingId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A stored value with its expiry metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Timestamp,
    pub ttl: Duration,
}

impl CacheEntry {
    /// An entry is stale once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age > ttl,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    deps: DependencyIndex,
    generations: Generations,
}

impl CacheState {
    /// Walk the dependency graph from `roots`, removing every reachable
    /// entry and stamping every visited node. Each node is processed at most
    /// once, so cycles terminate.
    fn cascade(&mut self, stamp: u64, roots: Vec<Dependency>) -> usize {
        let mut visited: HashSet<Dependency> = HashSet::new();
        let mut stack = roots;
        let mut removed = 0;

        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }

            match node {
                Dependency::Key(key) => {
                    self.generations.mark_key(&key, stamp);
                    if self.entries.remove(&key).is_some() {
                        removed += 1;
                    }
                    stack.extend(self.deps.key_subscribers(&key));
                    stack.extend(self.deps.namespace_subscribers(key.namespace));
                    self.deps.prune_key(&key);
                    self.deps.prune_namespace(key.namespace);
                }
                Dependency::Namespace(ns) => {
                    self.generations.mark_namespace(ns, stamp);
                    stack.extend(
                        self.entries
                            .keys()
                            .filter(|k| k.namespace == ns)
                            .cloned()
                            .map(Dependency::Key)
                            .collect::<Vec<_>>(),
                    );
                    stack.extend(self.deps.source_keys_in(ns).into_iter().map(Dependency::Key));
                    stack.extend(self.deps.namespace_subscribers(ns));
                    self.deps.prune_namespace(ns);
                }
            }
        }

        removed
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: usize) {
        counter.fetch_add(by as u64, Ordering::Relaxed);
    }
}

enum Lookup {
    Missing,
    Expired,
    Fresh(CacheEntry),
}

/// First observed key whose generation has moved on.
fn stale_source(state: &CacheState, observed: &[(CacheKey, Generation)]) -> Option<CacheKey> {
    observed
        .iter()
        .find(|(key, generation)| state.generations.of(key) != *generation)
        .map(|(key, _)| key.clone())
}

/// Namespaced key-value cache with TTL expiry, dependency edges and
/// cascading invalidation.
///
/// Entries and the dependency index share one lock, so a `set` and a whole
/// invalidation walk are each atomic with respect to other writers.
/// Tracking contexts live behind their own mutex; the two locks are never
/// held at the same time.
#[derive(Debug)]
pub struct CacheStore {
    state: RwLock<CacheState>,
    tracking: Mutex<TrackingRegistry>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            tracking: Mutex::new(TrackingRegistry::new()),
            clock,
            counters: Counters::default(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CacheState>, StorageError> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CacheState>, StorageError> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }

    fn registry(&self) -> Result<MutexGuard<'_, TrackingRegistry>, StorageError> {
        self.tracking.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ========================================================================
    // READS AND WRITES
    // ========================================================================

    /// Look up an entry.
    ///
    /// An entry older than its TTL is evicted and reported as a miss. On a
    /// hit, the key is recorded into the tracking context if one is open.
    /// Hit or miss, the context also remembers the key's generation.
    pub fn get<T: Cacheable>(
        &self,
        namespace: Namespace,
        key: &str,
        tracking: Option<&TrackingId>,
    ) -> Result<Option<CacheRead<T>>, StorageError> {
        let cache_key = CacheKey::new(namespace, key);
        let now = self.clock.now();

        let (lookup, generation) = {
            let state = self.read_state()?;
            let lookup = match state.entries.get(&cache_key) {
                None => Lookup::Missing,
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(entry) => Lookup::Fresh(entry.clone()),
            };
            (lookup, state.generations.of(&cache_key))
        };

        if let Some(id) = tracking {
            self.registry()?.observe(id, &cache_key, generation);
        }

        let entry = match lookup {
            Lookup::Missing => {
                Counters::bump(&self.counters.misses, 1);
                tracing::debug!(key = %cache_key, "Cache miss");
                return Ok(None);
            }
            Lookup::Expired => {
                let mut state = self.write_state()?;
                if state
                    .entries
                    .get(&cache_key)
                    .is_some_and(|entry| entry.is_expired(now))
                {
                    state.entries.remove(&cache_key);
                    Counters::bump(&self.counters.evictions, 1);
                }
                Counters::bump(&self.counters.misses, 1);
                tracing::debug!(key = %cache_key, "Cache entry expired");
                return Ok(None);
            }
            Lookup::Fresh(entry) => entry,
        };

        let value: T =
            serde_json::from_value(entry.value).map_err(|e| StorageError::Deserialization {
                namespace,
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(id) = tracking {
            self.registry()?.record_access(id, &cache_key);
        }

        Counters::bump(&self.counters.hits, 1);
        tracing::debug!(key = %cache_key, "Cache hit");
        Ok(Some(CacheRead::new(value, cache_key, entry.created_at, entry.ttl)))
    }

    /// Store or overwrite an entry with a fresh timestamp.
    ///
    /// Each of `deps` becomes a source of the new entry. With an open
    /// tracking context, every key the context has read becomes a source as
    /// well. The value is serialized before anything is touched, so a value
    /// that cannot be serialized leaves the store unchanged.
    ///
    /// With a tracking context, the write is skipped if any key the context
    /// looked at has been invalidated since, including `key` itself after a
    /// miss. Returns whether the value was stored.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
        ttl: Duration,
        deps: &[Dependency],
        tracking: Option<&TrackingId>,
    ) -> Result<bool, StorageError> {
        let value = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
            namespace,
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let cache_key = CacheKey::new(namespace, key);
        let (accessed, observed) = match tracking {
            Some(id) => {
                let registry = self.registry()?;
                (
                    registry.accessed(id).unwrap_or_default(),
                    registry.observed(id).unwrap_or_default(),
                )
            }
            None => (Vec::new(), Vec::new()),
        };

        let generation = {
            let mut state = self.write_state()?;
            if let Some(stale) = stale_source(&state, &observed) {
                tracing::debug!(
                    key = %cache_key,
                    stale = %stale,
                    "Skipping write computed from invalidated data"
                );
                return Ok(false);
            }

            state.entries.insert(
                cache_key.clone(),
                CacheEntry {
                    value,
                    created_at: self.clock.now(),
                    ttl,
                },
            );

            let target = Dependency::Key(cache_key.clone());
            for dep in deps {
                state.deps.add(dep.clone(), target.clone(), EdgeOrigin::Registered);
            }
            for source in accessed {
                state
                    .deps
                    .add(Dependency::Key(source), target.clone(), EdgeOrigin::Registered);
            }
            state.generations.of(&cache_key)
        };

        if let Some(id) = tracking {
            let mut registry = self.registry()?;
            registry.record_created(id, &cache_key);
            registry.observe(id, &cache_key, generation);
        }

        tracing::debug!(key = %cache_key, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(true)
    }

    /// Latest invalidation stamp covering a key.
    pub fn generation(&self, namespace: Namespace, key: &str) -> Result<Generation, StorageError> {
        Ok(self.read_state()?.generations.of(&CacheKey::new(namespace, key)))
    }

    /// Declare a standing edge, e.g. "all of `query_results` depends on
    /// `sheet_data`". Declared edges survive cascades. Returns `true` if the
    /// edge is new.
    pub fn declare_dependency(
        &self,
        source: Dependency,
        target: Dependency,
    ) -> Result<bool, StorageError> {
        let mut state = self.write_state()?;
        Ok(state.deps.add(source, target, EdgeOrigin::Declared))
    }

    /// Whether a live entry exists. Does not evict or count as a read.
    pub fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        let now = self.clock.now();
        let state = self.read_state()?;
        Ok(state
            .entries
            .get(&CacheKey::new(namespace, key))
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.read_state()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.read_state()?.entries.is_empty())
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Remove an entry and everything that depends on it. Returns the
    /// number of entries removed.
    pub fn invalidate(&self, namespace: Namespace, key: &str) -> Result<usize, StorageError> {
        let removed = {
            let mut state = self.write_state()?;
            let stamp = state.generations.next_stamp();
            state.cascade(stamp, vec![Dependency::key(namespace, key)])
        };
        self.record_invalidation(removed, || format!("{namespace}/{key}"));
        Ok(removed)
    }

    /// Invalidate every key of `namespace` starting with `prefix`, including
    /// keys that are absent but still have dependents.
    pub fn invalidate_by_prefix(
        &self,
        namespace: Namespace,
        prefix: &str,
    ) -> Result<usize, StorageError> {
        let removed = {
            let mut state = self.write_state()?;
            let mut roots: Vec<Dependency> = state
                .entries
                .keys()
                .filter(|k| k.namespace == namespace && k.key.starts_with(prefix))
                .cloned()
                .map(Dependency::Key)
                .collect();
            roots.extend(
                state
                    .deps
                    .source_keys_in(namespace)
                    .into_iter()
                    .filter(|k| k.key.starts_with(prefix))
                    .map(Dependency::Key),
            );
            let stamp = state.generations.next_stamp();
            state.generations.mark_prefix(namespace, prefix, stamp);
            state.cascade(stamp, roots)
        };
        self.record_invalidation(removed, || format!("{namespace}/{prefix}*"));
        Ok(removed)
    }

    /// Empty a namespace and cascade to everything depending on any of it.
    pub fn clear_namespace(&self, namespace: Namespace) -> Result<usize, StorageError> {
        let removed = {
            let mut state = self.write_state()?;
            let stamp = state.generations.next_stamp();
            state.cascade(stamp, vec![Dependency::namespace(namespace)])
        };
        self.record_invalidation(removed, || format!("{namespace}/*"));
        Ok(removed)
    }

    /// Drop every entry and every registered edge. Declared edges and open
    /// tracking contexts are kept.
    pub fn clear_all(&self) -> Result<usize, StorageError> {
        let mut state = self.write_state()?;
        let removed = state.entries.len();
        state.entries.clear();
        state.deps.clear_registered();
        let stamp = state.generations.next_stamp();
        state.generations.mark_all(stamp);
        tracing::info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Evict every expired entry. Eviction does not cascade.
    pub fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = self.clock.now();
        let mut state = self.write_state()?;
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - state.entries.len();
        Counters::bump(&self.counters.evictions, evicted);
        if evicted > 0 {
            tracing::debug!(evicted, "Purged expired cache entries");
        }
        Ok(evicted)
    }

    fn record_invalidation(&self, removed: usize, root: impl FnOnce() -> String) {
        Counters::bump(&self.counters.invalidations, removed);
        tracing::info!(root = %root(), removed, "Cache invalidated");
    }

    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let state = self.read_state()?;
        Ok(CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            entry_count: state.entries.len() as u64,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            dependency_edges: state.deps.edge_count() as u64,
        })
    }

    // ========================================================================
    // TRACKING
    // ========================================================================

    /// Open a tracking context. An id that is already open is reused.
    pub fn begin(&self, requested: Option<TrackingId>) -> Result<TrackingId, StorageError> {
        Ok(self.registry()?.begin(requested, None))
    }

    /// Open a context nested under `parent`. When it ends, what it read and
    /// wrote is recorded as read by the parent.
    pub fn begin_child(&self, parent: &TrackingId) -> Result<TrackingId, StorageError> {
        Ok(self.registry()?.begin(None, Some(parent.clone())))
    }

    /// Close a context, returning the keys it read.
    pub fn end(&self, id: &TrackingId) -> Result<Vec<CacheKey>, StorageError> {
        let context = self.registry()?.end(id)?;
        Ok(context.accessed.into_iter().collect())
    }

    /// Most recently begun open context.
    ///
    /// Only meaningful when a single logical operation runs at a time.
    /// Concurrent callers should carry their id explicitly.
    pub fn current_tracking_id(&self) -> Result<Option<TrackingId>, StorageError> {
        Ok(self.registry()?.current())
    }

    pub fn open_contexts(&self) -> Result<Vec<TrackingId>, StorageError> {
        Ok(self.registry()?.open_ids())
    }

    /// Open a context that ends when the returned scope is dropped.
    pub fn track(&self) -> Result<TrackingScope<'_>, StorageError> {
        let id = self.begin(None)?;
        Ok(TrackingScope::new(self, id))
    }

    /// Like [`track`](Self::track), nested under `parent` when given.
    pub fn track_child(&self, parent: Option<&TrackingId>) -> Result<TrackingScope<'_>, StorageError> {
        let id = match parent {
            Some(parent) => self.begin_child(parent)?,
            None => self.begin(None)?,
        };
        Ok(TrackingScope::new(self, id))
    }
}
