//! Request coalescing: concurrent identical fetches share one in-flight call.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use sheetstock_core::StockResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

type InFlight<V> = Shared<BoxFuture<'static, StockResult<V>>>;

/// Deduplicates concurrent requests by key.
///
/// The first caller for a key starts the request; callers arriving while it
/// is in flight await the same future and receive a clone of its result.
/// Once the request settles, the next caller starts a fresh one.
pub struct RequestCoalescer<V: Clone> {
    in_flight: Mutex<HashMap<String, InFlight<V>>>,
}

impl<V> RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `start()` unless a request for `key` is already in flight.
    pub async fn run<F, Fut>(&self, key: &str, start: F) -> StockResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StockResult<V>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match in_flight.get(key) {
                Some(existing) => {
                    tracing::debug!(key, "Joining in-flight request");
                    existing.clone()
                }
                None => {
                    let fresh = start().boxed().shared();
                    in_flight.insert(key.to_string(), fresh.clone());
                    fresh
                }
            }
        };

        let result = shared.clone().await;

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.get(key).is_some_and(|current| current.ptr_eq(&shared)) {
            in_flight.remove(key);
        }
        result
    }

    /// Detach in-flight requests whose key matches, so the next caller for
    /// that key starts a fresh request. Callers already waiting still get
    /// the detached result. Returns the number detached.
    pub fn forget<P>(&self, matches: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let before = in_flight.len();
        in_flight.retain(|key, _| !matches(key));
        before - in_flight.len()
    }

    /// Number of keys with a request in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<V> Default for RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> std::fmt::Debug for RequestCoalescer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.in_flight.lock().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("RequestCoalescer")
            .field("in_flight", &count)
            .finish()
    }
}
