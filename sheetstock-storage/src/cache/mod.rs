//! Cache layer with dependency tracking and cascading invalidation.
//!
//! Two complementary mechanisms bound staleness:
//!
//! - **TTL expiry** covers mutations this process never sees (someone edits
//!   the spreadsheet directly). Expired entries are evicted lazily on read.
//! - **Dependency cascades** cover mutations that do go through this
//!   process: invalidating a raw range invalidates everything derived from it.
//!
//! Dependency edges are either declared explicitly on `set`, or inferred
//! from a [`TrackingScope`]: every key read while the scope is open becomes
//! a source of whatever the scope writes.
//!
//! # Example
//!
//! ```ignore
//! let scope = cache.track();
//! let raw: Option<CacheRead<Grid>> = cache.get(Namespace::SheetData, "inv:CASE", Some(scope.id()))?;
//! // ... derive a record from `raw` ...
//! cache.set(Namespace::Inventory, "CASE-1", &record, ttl, &[], Some(scope.id()))?;
//! scope.finish()?;
//!
//! // Later: a write to the CASE tab drops the derived record too.
//! cache.invalidate(Namespace::SheetData, "inv:CASE")?;
//! ```

pub mod clock;
pub mod dependency;
pub mod generation;
pub mod read;
pub mod store;
pub mod tracking;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dependency::{Dependency, DependencyIndex, EdgeOrigin};
pub use generation::Generation;
pub use read::CacheRead;
pub use store::{CacheEntry, CacheStore};
pub use tracking::{TrackingContext, TrackingRegistry, TrackingScope};
pub use traits::{CacheStats, Cacheable};
