//! Sheetstock Test Utilities
//!
//! Shared test infrastructure for the sheetstock workspace:
//! - A flaky source wrapper that fails a set number of times
//! - Proptest generators for keys, grids and configs
//! - Sample spreadsheets matching the default sheet layout

// Re-export in-memory implementations from their source crates
pub use sheetstock_sheets::{InMemorySheetSource, SheetSource};
pub use sheetstock_storage::{CacheStore, ManualClock};

// Re-export core types for convenience
pub use sheetstock_core::{
    CacheKey, CellEdit, Grid, Namespace, RemoteError, RetryConfig, SheetLayout, StockConfig,
    StockError, StockResult, TabInfo, TableUpdate, TrackingId,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// FLAKY SOURCE
// ============================================================================

/// Wraps a source and fails its first `failures` calls with a fixed error.
///
/// Every call counts, whichever method it is, so a test can assert how many
/// attempts a retrying caller made.
#[derive(Debug)]
pub struct FlakySource<S> {
    inner: S,
    remaining: AtomicU32,
    calls: AtomicU32,
    error: StockError,
}

impl<S: SheetSource> FlakySource<S> {
    pub fn failing_with(inner: S, failures: u32, error: StockError) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            error,
        }
    }

    /// Fail with HTTP 429 `failures` times, then delegate.
    pub fn rate_limited(inner: S, failures: u32) -> Self {
        Self::failing_with(
            inner,
            failures,
            StockError::Remote(RemoteError::RateLimited {
                service: "google_sheets".to_string(),
                message: "Quota exceeded for quota metric 'Read requests'".to_string(),
            }),
        )
    }

    /// Total calls received, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn next(&self) -> StockResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: SheetSource> SheetSource for FlakySource<S> {
    async fn fetch_range(&self, table: &str, range: &str) -> StockResult<Grid> {
        self.next()?;
        self.inner.fetch_range(table, range).await
    }

    async fn write_cells(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        self.next()?;
        self.inner.write_cells(table, tab, update).await
    }

    async fn list_tabs(&self, table: &str) -> StockResult<Vec<TabInfo>> {
        self.next()?;
        self.inner.list_tabs(table).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for sheetstock types.

    use super::*;
    use proptest::prelude::*;

    /// Generate any cache namespace.
    pub fn arb_namespace() -> impl Strategy<Value = Namespace> {
        prop::sample::select(Namespace::ALL.to_vec())
    }

    /// Generate a short key drawn from a small alphabet, so collisions
    /// between generated keys are common.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-d][a-d0-2:]{0,4}"
    }

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (arb_namespace(), arb_key()).prop_map(|(ns, key)| CacheKey::new(ns, key))
    }

    /// Generate an item code such as `CASE-12` or `lt7`.
    pub fn arb_item_code() -> impl Strategy<Value = String> {
        "[A-Za-z]{1,5}-?[0-9]{1,4}"
    }

    /// Generate a tab title, sometimes needing quotes in A1 notation.
    pub fn arb_tab_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-Z][A-Za-z0-9]{0,10}",
            "[A-Z][a-z]{1,6} [A-Z][a-z]{1,6}",
            "[A-Z][a-z]{1,6}'s [A-Z][a-z]{1,6}",
        ]
    }

    /// Generate a ragged grid of up to `rows` x `cols` cells.
    pub fn arb_grid(rows: usize, cols: usize) -> impl Strategy<Value = Grid> {
        prop::collection::vec(
            prop::collection::vec("[A-Za-z0-9 ]{0,8}", 0..=cols),
            0..=rows,
        )
    }

    /// Generate a valid RetryConfig.
    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (1u32..8, 1u64..1000, 1000u64..60000, 1.0f64..4.0).prop_map(
            |(max_retries, initial_ms, max_ms, multiplier)| RetryConfig {
                max_retries,
                initial_backoff_ms: initial_ms,
                max_backoff_ms: max_ms,
                backoff_multiplier: multiplier,
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Sample spreadsheets laid out the way [`SheetLayout::default`] expects.

    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    /// Build a grid from string literals.
    pub fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    /// Default config with fast retries and the `LT` prefix routed to the
    /// `LIGHT` tab.
    pub fn sample_config() -> StockConfig {
        let mut config = StockConfig::default();
        config.retry.initial_backoff_ms = 10;
        config.retry.max_backoff_ms = 100;
        config
            .layout
            .tab_aliases
            .insert("LT".to_string(), "LIGHT".to_string());
        config
    }

    pub fn case_tab() -> Grid {
        grid(&[
            &["ITEM#", "Description", "QTY", "Location"],
            &["CASE-1", "Road case 24x24", "4", "Bay 1"],
            &["CASE-2", "Rack case 8U", "2", "Bay 1"],
            &["CASE-3", "Trunk", "6"],
        ])
    }

    pub fn light_tab() -> Grid {
        grid(&[
            &["ITEM#", "Description", "QTY", "Location"],
            &["LT-7", "Par can", "24", "Bay 3"],
            &["LT-9", "Moving head", "8", "Bay 4"],
        ])
    }

    /// Shows A and B overlap; C ships after both return. D has only set
    /// dates and spans the new year.
    pub fn schedule_tab() -> Grid {
        grid(&[
            &["Show", "Client", "Year", "Ship", "Return", "Set Start", "Set End"],
            &["Show A", "Acme Corp", "2024", "2024-03-01", "2024-03-10"],
            &["Show B", "Globex", "2024", "2024-03-05", "2024-03-15"],
            &["Show C", "Initech", "2024", "2024-04-01", "2024-04-05"],
            &["Show D", "Acme Corp", "2024", "", "", "12/28", "1/3"],
        ])
    }

    pub fn clients_tab() -> Grid {
        grid(&[
            &["Name", "Abbreviations"],
            &["Acme Corp", "ACME, AC"],
            &["Globex", "GBX"],
            &["Initech", "INI"],
        ])
    }

    pub fn shows_tab() -> Grid {
        grid(&[
            &["Name", "Abbreviations"],
            &["Spring Expo", "SPX"],
            &["Auto Show", ""],
            &["Winter Gala", "WG"],
        ])
    }

    pub fn pack_list_tab() -> Grid {
        grid(&[
            &["Piece #", "Contents", "Notes"],
            &["1", "Road case 24x24", "(2) CASE-1 spares"],
            &["", "(12) LT-7 Par can"],
            &["2", "(4) LT-9 Moving head"],
            &["", "(6) LT-7"],
        ])
    }

    /// An in-memory source holding every sample tab under the default
    /// layout's table ids.
    pub fn sample_source() -> InMemorySheetSource {
        let layout = SheetLayout::default();
        InMemorySheetSource::new()
            .with_tab(&layout.inventory_table, "CASE", case_tab())
            .with_tab(&layout.inventory_table, "LIGHT", light_tab())
            .with_tab(&layout.schedule_table, &layout.schedule_tab, schedule_tab())
            .with_tab(&layout.reference_table, &layout.clients_tab, clients_tab())
            .with_tab(&layout.reference_table, &layout.shows_tab, shows_tab())
            .with_tab(&layout.pack_list_table, "Spring Expo", pack_list_tab())
    }

    /// A cache on a manual clock fixed at 2024-03-01 09:00 UTC.
    pub fn manual_cache() -> (Arc<ManualClock>, Arc<CacheStore>) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);
        let clock = Arc::new(ManualClock::new(start));
        let cache = Arc::new(CacheStore::with_clock(clock.clone()));
        (clock, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_flaky_source_fails_then_delegates() {
        let source = FlakySource::rate_limited(sample_source(), 2);
        assert!(source.list_tabs("inventory").await.is_err());
        assert!(source.fetch_range("inventory", "CASE").await.is_err());
        let tabs = source.list_tabs("inventory").await.unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!(source.calls(), 3);
        assert_eq!(source.inner().list_calls(), 1);
    }

    #[test]
    fn test_sample_config_is_valid() {
        sample_config().validate().unwrap();
    }
}

#[cfg(test)]
mod prop_tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;
    use sheetstock_storage::Dependency;
    use std::time::Duration;

    proptest! {
        #[test]
        fn prop_generated_retry_configs_validate(retry in arb_retry_config()) {
            let config = StockConfig { retry, ..StockConfig::default() };
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_invalidation_reaches_dependent(
            source in arb_cache_key(),
            namespace in arb_namespace(),
            key in arb_key(),
        ) {
            let target = CacheKey::new(namespace, key);
            prop_assume!(source != target);

            let cache = CacheStore::new();
            let ttl = Duration::from_secs(60);
            cache.set(source.namespace, &source.key, &1, ttl, &[], None).unwrap();
            let dep = [Dependency::key(source.namespace, source.key.clone())];
            cache.set(target.namespace, &target.key, &2, ttl, &dep, None).unwrap();

            prop_assert_eq!(cache.invalidate(source.namespace, &source.key).unwrap(), 2);
            prop_assert!(!cache.contains(target.namespace, &target.key).unwrap());
        }
    }
}
