//! Dependency edges between cache entries.
//!
//! An edge `source -> target` means "invalidating the source must also
//! invalidate the target". Either end may be a single key or a whole
//! namespace. Edges are indexed in two tiers: per-key subscribers and
//! namespace-wide subscribers, so a walk never has to pattern-match key
//! strings.

use sheetstock_core::{CacheKey, Namespace};
use std::collections::HashMap;

/// One end of a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// A single entry.
    Key(CacheKey),
    /// Every entry of a namespace.
    Namespace(Namespace),
}

impl Dependency {
    pub fn key(namespace: Namespace, key: impl Into<String>) -> Self {
        Dependency::Key(CacheKey::new(namespace, key))
    }

    pub fn namespace(namespace: Namespace) -> Self {
        Dependency::Namespace(namespace)
    }

    /// Namespace this end lives in.
    pub fn namespace_of(&self) -> Namespace {
        match self {
            Dependency::Key(key) => key.namespace,
            Dependency::Namespace(ns) => *ns,
        }
    }
}

impl From<CacheKey> for Dependency {
    fn from(key: CacheKey) -> Self {
        Dependency::Key(key)
    }
}

/// How an edge came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// Declared up front with `declare_dependency`; survives cascades.
    Declared,
    /// Registered by a `set` call; consumed when its source is invalidated,
    /// since the target is invalidated in the same pass.
    Registered,
}

type Subscribers = HashMap<Dependency, EdgeOrigin>;

/// Two-tier index of dependency edges keyed by source.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    by_key: HashMap<CacheKey, Subscribers>,
    by_namespace: HashMap<Namespace, Subscribers>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Returns `true` if the edge is new.
    ///
    /// Self-edges are ignored. Re-registering a declared edge keeps it
    /// declared.
    pub fn add(&mut self, source: Dependency, target: Dependency, origin: EdgeOrigin) -> bool {
        if source == target {
            return false;
        }

        let subscribers = match source {
            Dependency::Key(key) => self.by_key.entry(key).or_default(),
            Dependency::Namespace(ns) => self.by_namespace.entry(ns).or_default(),
        };

        match subscribers.get_mut(&target) {
            Some(existing) => {
                if origin == EdgeOrigin::Declared {
                    *existing = EdgeOrigin::Declared;
                }
                false
            }
            None => {
                subscribers.insert(target, origin);
                true
            }
        }
    }

    /// Targets subscribed to exactly this key.
    pub fn key_subscribers(&self, key: &CacheKey) -> Vec<Dependency> {
        self.by_key
            .get(key)
            .map(|subs| subs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Targets subscribed to every key of `namespace`.
    pub fn namespace_subscribers(&self, namespace: Namespace) -> Vec<Dependency> {
        self.by_namespace
            .get(&namespace)
            .map(|subs| subs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys of `namespace` that have per-key subscribers.
    pub fn source_keys_in(&self, namespace: Namespace) -> Vec<CacheKey> {
        self.by_key
            .keys()
            .filter(|key| key.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Drop the registered edges leaving `key`.
    pub fn prune_key(&mut self, key: &CacheKey) {
        if let Some(subs) = self.by_key.get_mut(key) {
            subs.retain(|_, origin| *origin == EdgeOrigin::Declared);
            if subs.is_empty() {
                self.by_key.remove(key);
            }
        }
    }

    /// Drop the registered edges leaving `namespace` as a whole.
    pub fn prune_namespace(&mut self, namespace: Namespace) {
        if let Some(subs) = self.by_namespace.get_mut(&namespace) {
            subs.retain(|_, origin| *origin == EdgeOrigin::Declared);
            if subs.is_empty() {
                self.by_namespace.remove(&namespace);
            }
        }
    }

    /// Drop every registered edge, keeping declared ones.
    pub fn clear_registered(&mut self) {
        self.by_key.retain(|_, subs| {
            subs.retain(|_, origin| *origin == EdgeOrigin::Declared);
            !subs.is_empty()
        });
        self.by_namespace.retain(|_, subs| {
            subs.retain(|_, origin| *origin == EdgeOrigin::Declared);
            !subs.is_empty()
        });
    }

    pub fn contains_edge(&self, source: &Dependency, target: &Dependency) -> bool {
        let subs = match source {
            Dependency::Key(key) => self.by_key.get(key),
            Dependency::Namespace(ns) => self.by_namespace.get(ns),
        };
        subs.is_some_and(|subs| subs.contains_key(target))
    }

    pub fn edge_count(&self) -> usize {
        self.by_key.values().map(HashMap::len).sum::<usize>()
            + self.by_namespace.values().map(HashMap::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: Namespace, k: &str) -> Dependency {
        Dependency::key(ns, k)
    }

    #[test]
    fn test_add_and_lookup_two_tiers() {
        let mut index = DependencyIndex::new();
        let raw = key(Namespace::SheetData, "inv:CASE");
        let record = key(Namespace::Inventory, "CASE-1");

        assert!(index.add(raw.clone(), record.clone(), EdgeOrigin::Registered));
        assert!(!index.add(raw.clone(), record.clone(), EdgeOrigin::Registered));
        assert!(index.add(
            Dependency::namespace(Namespace::SheetData),
            Dependency::namespace(Namespace::QueryResults),
            EdgeOrigin::Declared,
        ));

        let Dependency::Key(raw_key) = &raw else { unreachable!() };
        assert_eq!(index.key_subscribers(raw_key), vec![record.clone()]);
        assert_eq!(
            index.namespace_subscribers(Namespace::SheetData),
            vec![Dependency::namespace(Namespace::QueryResults)]
        );
        assert_eq!(index.edge_count(), 2);
        assert!(index.contains_edge(&raw, &record));
    }

    #[test]
    fn test_self_edges_ignored() {
        let mut index = DependencyIndex::new();
        let a = key(Namespace::Inventory, "A");
        assert!(!index.add(a.clone(), a, EdgeOrigin::Registered));
        assert_eq!(index.edge_count(), 0);
    }

    #[test]
    fn test_prune_keeps_declared() {
        let mut index = DependencyIndex::new();
        let src = CacheKey::new(Namespace::SheetData, "r");
        index.add(src.clone().into(), key(Namespace::Inventory, "x"), EdgeOrigin::Registered);
        index.add(src.clone().into(), key(Namespace::Inventory, "y"), EdgeOrigin::Declared);

        index.prune_key(&src);
        assert_eq!(index.key_subscribers(&src), vec![key(Namespace::Inventory, "y")]);
    }

    #[test]
    fn test_declared_is_not_downgraded() {
        let mut index = DependencyIndex::new();
        let src = CacheKey::new(Namespace::SheetData, "r");
        let dst = key(Namespace::Inventory, "x");
        index.add(src.clone().into(), dst.clone(), EdgeOrigin::Declared);
        index.add(src.clone().into(), dst.clone(), EdgeOrigin::Registered);

        index.prune_key(&src);
        assert!(index.contains_edge(&src.into(), &dst));
    }

    #[test]
    fn test_clear_registered() {
        let mut index = DependencyIndex::new();
        index.add(
            key(Namespace::SheetData, "a"),
            key(Namespace::Inventory, "b"),
            EdgeOrigin::Registered,
        );
        index.add(
            Dependency::namespace(Namespace::SheetTabs),
            Dependency::namespace(Namespace::Inventory),
            EdgeOrigin::Declared,
        );
        index.clear_registered();
        assert_eq!(index.edge_count(), 1);
        assert!(index.source_keys_in(Namespace::SheetData).is_empty());
    }
}
