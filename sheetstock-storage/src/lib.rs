//! Sheetstock Storage - In-Memory Cache Layer
//!
//! A process-wide, namespaced cache with lazy TTL expiry, explicit and
//! automatically-tracked dependency edges, and cascading invalidation.
//! Nothing here is persisted; the store lives as long as the process.

pub mod cache;

pub use cache::{
    CacheEntry, CacheRead, CacheStats, CacheStore, Cacheable, Clock, Dependency,
    DependencyIndex, EdgeOrigin, Generation, ManualClock, SystemClock, TrackingContext,
    TrackingRegistry, TrackingScope,
};
