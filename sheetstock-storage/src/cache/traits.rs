//! Cacheable value marker and cache statistics.

use serde::{de::DeserializeOwned, Serialize};

/// Marker trait for values that can be stored in the cache.
///
/// Values are kept as JSON documents, so anything serde can round-trip
/// qualifies. Implemented automatically.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including reads of expired entries.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Entries removed because their TTL elapsed.
    pub evictions: u64,
    /// Entries removed by explicit or cascading invalidation.
    pub invalidations: u64,
    /// Number of registered dependency edges.
    pub dependency_edges: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
