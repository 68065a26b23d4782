//! Tracking contexts: per-operation records of cache reads and writes.
//!
//! A context is identified by a [`TrackingId`] that callers carry
//! explicitly through their call chain. While open, every `get` hit tagged
//! with the id lands in `accessed`, and every `set` tagged with the id gains
//! an edge from each accessed key.
//!
//! A context also remembers the generation of every key it looked at, hit
//! or miss. A tagged `set` is dropped when any of those keys has been
//! invalidated since, so a result computed from stale reads never lands in
//! the cache after the invalidation that should have removed it.

use super::generation::Generation;
use super::store::CacheStore;
use sheetstock_core::{CacheKey, StorageError, TrackingId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Reads and writes recorded for one logical operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingContext {
    pub parent: Option<TrackingId>,
    pub accessed: BTreeSet<CacheKey>,
    pub created: BTreeSet<CacheKey>,
    /// Generation of each key when first looked at.
    pub observed: BTreeMap<CacheKey, Generation>,
}

/// All open tracking contexts.
///
/// Contexts are independent of each other. The begin order is kept only to
/// answer [`current`](Self::current) for single-threaded callers.
#[derive(Debug, Default)]
pub struct TrackingRegistry {
    contexts: HashMap<TrackingId, TrackingContext>,
    order: Vec<TrackingId>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a context, reusing `requested` if it is already open.
    pub fn begin(&mut self, requested: Option<TrackingId>, parent: Option<TrackingId>) -> TrackingId {
        let id = requested.unwrap_or_else(TrackingId::generate);
        if self.contexts.contains_key(&id) {
            return id;
        }

        self.contexts.insert(
            id.clone(),
            TrackingContext {
                parent,
                ..TrackingContext::default()
            },
        );
        self.order.push(id.clone());
        id
    }

    /// Close a context and hand back what it recorded.
    ///
    /// If the parent is still open, everything the child read or wrote is
    /// recorded as accessed by the parent.
    pub fn end(&mut self, id: &TrackingId) -> Result<TrackingContext, StorageError> {
        let context = self
            .contexts
            .remove(id)
            .ok_or_else(|| StorageError::UnknownTrackingContext { id: id.clone() })?;
        self.order.retain(|open| open != id);

        if let Some(parent) = context.parent.as_ref().and_then(|p| self.contexts.get_mut(p)) {
            parent.accessed.extend(context.accessed.iter().cloned());
            parent.accessed.extend(context.created.iter().cloned());
            for (key, generation) in &context.observed {
                parent.observed.entry(key.clone()).or_insert(*generation);
            }
        }

        Ok(context)
    }

    /// Record a read. Returns `false` if the context is not open.
    pub fn record_access(&mut self, id: &TrackingId, key: &CacheKey) -> bool {
        match self.contexts.get_mut(id) {
            Some(context) => {
                context.accessed.insert(key.clone());
                true
            }
            None => false,
        }
    }

    /// Record a write. Returns `false` if the context is not open.
    pub fn record_created(&mut self, id: &TrackingId, key: &CacheKey) -> bool {
        match self.contexts.get_mut(id) {
            Some(context) => {
                context.created.insert(key.clone());
                true
            }
            None => false,
        }
    }

    /// Record the generation a key had when the context first saw it.
    /// Later observations of the same key keep the first one.
    pub fn observe(&mut self, id: &TrackingId, key: &CacheKey, generation: Generation) -> bool {
        match self.contexts.get_mut(id) {
            Some(context) => {
                context.observed.entry(key.clone()).or_insert(generation);
                true
            }
            None => false,
        }
    }

    pub fn observed(&self, id: &TrackingId) -> Option<Vec<(CacheKey, Generation)>> {
        self.contexts.get(id).map(|context| {
            context
                .observed
                .iter()
                .map(|(key, generation)| (key.clone(), *generation))
                .collect()
        })
    }

    pub fn accessed(&self, id: &TrackingId) -> Option<Vec<CacheKey>> {
        self.contexts
            .get(id)
            .map(|context| context.accessed.iter().cloned().collect())
    }

    pub fn get(&self, id: &TrackingId) -> Option<&TrackingContext> {
        self.contexts.get(id)
    }

    pub fn is_open(&self, id: &TrackingId) -> bool {
        self.contexts.contains_key(id)
    }

    /// Most recently begun context that is still open.
    pub fn current(&self) -> Option<TrackingId> {
        self.order.last().cloned()
    }

    /// Open ids in begin order.
    pub fn open_ids(&self) -> Vec<TrackingId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Guard for a tracking context. Ends the context when dropped, so error
/// paths cannot leak it.
#[derive(Debug)]
pub struct TrackingScope<'a> {
    store: &'a CacheStore,
    id: TrackingId,
    finished: bool,
}

impl<'a> TrackingScope<'a> {
    pub(crate) fn new(store: &'a CacheStore, id: TrackingId) -> Self {
        Self {
            store,
            id,
            finished: false,
        }
    }

    pub fn id(&self) -> &TrackingId {
        &self.id
    }

    /// End the context explicitly, returning the accessed keys.
    pub fn finish(mut self) -> Result<Vec<CacheKey>, StorageError> {
        self.finished = true;
        self.store.end(&self.id)
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.store.end(&self.id) {
                tracing::debug!(tracking_id = %self.id, error = %e, "Tracking scope already closed");
            }
        }
    }
}
