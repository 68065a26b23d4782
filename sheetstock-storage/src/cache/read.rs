//! Result of a cache hit, carrying age metadata.

use sheetstock_core::{CacheKey, Timestamp};
use std::time::Duration;

/// A value returned by [`CacheStore::get`](super::CacheStore::get).
///
/// A miss is `None`, so a legitimately empty or falsy cached value is never
/// confused with absence.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    key: CacheKey,
    cached_at: Timestamp,
    ttl: Duration,
}

impl<T> CacheRead<T> {
    pub(crate) fn new(value: T, key: CacheKey, cached_at: Timestamp, ttl: Duration) -> Self {
        Self {
            value,
            key,
            cached_at,
            ttl,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// When the entry was written.
    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The last instant at which the entry is still served.
    pub fn expires_at(&self) -> Timestamp {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        self.cached_at
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
    }

    /// How long the entry has been cached as of `now`.
    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            key: self.key,
            cached_at: self.cached_at,
            ttl: self.ttl,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
