//! Invalidation generations.
//!
//! Every invalidation pass takes a fresh stamp from a store-wide counter and
//! marks what it covered: single keys, key prefixes, whole namespaces, or
//! everything. The generation of a key is the latest stamp covering it, so
//! a reader can record it before a slow fetch and tell afterwards whether
//! the key was invalidated in the meantime.

use sheetstock_core::{CacheKey, Namespace};
use std::collections::HashMap;

/// Stamp of the latest invalidation covering a key. Zero means never.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub(crate) u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Generations {
    counter: u64,
    all: u64,
    namespaces: HashMap<Namespace, u64>,
    prefixes: HashMap<(Namespace, String), u64>,
    keys: HashMap<CacheKey, u64>,
}

impl Generations {
    /// Start an invalidation pass.
    pub fn next_stamp(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    pub fn mark_key(&mut self, key: &CacheKey, stamp: u64) {
        self.keys.insert(key.clone(), stamp);
    }

    pub fn mark_prefix(&mut self, namespace: Namespace, prefix: &str, stamp: u64) {
        self.prefixes.insert((namespace, prefix.to_string()), stamp);
    }

    pub fn mark_namespace(&mut self, namespace: Namespace, stamp: u64) {
        self.namespaces.insert(namespace, stamp);
    }

    /// Cover everything. Finer marks are older than `stamp` and can go.
    pub fn mark_all(&mut self, stamp: u64) {
        self.all = stamp;
        self.namespaces.clear();
        self.prefixes.clear();
        self.keys.clear();
    }

    pub fn of(&self, key: &CacheKey) -> Generation {
        let namespace = self.namespaces.get(&key.namespace).copied().unwrap_or(0);
        let own = self.keys.get(key).copied().unwrap_or(0);
        let prefix = self
            .prefixes
            .iter()
            .filter(|((ns, prefix), _)| *ns == key.namespace && key.key.starts_with(prefix.as_str()))
            .map(|(_, stamp)| *stamp)
            .max()
            .unwrap_or(0);
        Generation(self.all.max(namespace).max(own).max(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: Namespace, k: &str) -> CacheKey {
        CacheKey::new(ns, k)
    }

    #[test]
    fn test_untouched_key_is_generation_zero() {
        let generations = Generations::default();
        assert_eq!(generations.of(&key(Namespace::SheetData, "a")), Generation::default());
    }

    #[test]
    fn test_marks_cover_their_keys_only() {
        let mut generations = Generations::default();
        let a = key(Namespace::SheetData, "inv:CASE");
        let b = key(Namespace::SheetData, "inv:CASE!A1:B2");
        let c = key(Namespace::SheetData, "inv:LIGHT");
        let d = key(Namespace::Inventory, "inv:CASE!A1:B2");

        let stamp = generations.next_stamp();
        generations.mark_key(&a, stamp);
        assert_eq!(generations.of(&a).value(), 1);
        assert_eq!(generations.of(&b).value(), 0);

        let stamp = generations.next_stamp();
        generations.mark_prefix(Namespace::SheetData, "inv:CASE!", stamp);
        assert_eq!(generations.of(&a).value(), 1);
        assert_eq!(generations.of(&b).value(), 2);
        assert_eq!(generations.of(&c).value(), 0);
        assert_eq!(generations.of(&d).value(), 0);

        let stamp = generations.next_stamp();
        generations.mark_namespace(Namespace::Inventory, stamp);
        assert_eq!(generations.of(&d).value(), 3);
        assert_eq!(generations.of(&c).value(), 0);
    }

    #[test]
    fn test_mark_all_supersedes_finer_marks() {
        let mut generations = Generations::default();
        let a = key(Namespace::SheetData, "a");
        let stamp = generations.next_stamp();
        generations.mark_key(&a, stamp);

        let stamp = generations.next_stamp();
        generations.mark_all(stamp);
        assert_eq!(generations.of(&a).value(), 2);
        assert_eq!(generations.of(&key(Namespace::PackLists, "z")).value(), 2);
    }
}
