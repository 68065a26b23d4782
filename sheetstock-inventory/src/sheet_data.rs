//! Raw range access: every other accessor reads the spreadsheet through here.

use sheetstock_core::{
    CacheConfig, Grid, Namespace, StockConfig, StockResult, TabInfo, TableUpdate, TrackingId,
};
use sheetstock_sheets::{RangeRef, RequestCoalescer, RetryingSource, SheetSource};
use sheetstock_storage::CacheStore;
use std::sync::Arc;

/// Cached, coalesced, retrying reads of raw spreadsheet ranges.
///
/// Ranges are cached in [`Namespace::SheetData`] under `"{table}:{range}"`,
/// with the range in canonical A1 form so `CASE` and `'CASE'` share an
/// entry. Tab listings are cached in [`Namespace::SheetTabs`] under the
/// table id.
pub struct SheetData {
    cache: Arc<CacheStore>,
    source: Arc<dyn SheetSource>,
    ranges: RequestCoalescer<Grid>,
    config: CacheConfig,
}

impl SheetData {
    /// Wrap `source` so every remote call goes through backoff.
    pub fn new<S>(cache: Arc<CacheStore>, source: S, config: &StockConfig) -> Self
    where
        S: SheetSource + 'static,
    {
        Self {
            cache,
            source: Arc::new(RetryingSource::new(source, config.retry.clone())),
            ranges: RequestCoalescer::new(),
            config: config.cache.clone(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub(crate) fn ttl(&self, namespace: Namespace) -> std::time::Duration {
        self.config.ttl_for(namespace)
    }

    /// Cache key of a raw range. Fails on malformed A1 notation.
    pub fn range_key(table: &str, range: &str) -> StockResult<String> {
        let range = RangeRef::parse(range)?;
        Ok(format!("{table}:{range}"))
    }

    /// Fetch a range, from cache when fresh.
    pub async fn range(
        &self,
        table: &str,
        range: &str,
        tracking: Option<&TrackingId>,
    ) -> StockResult<Grid> {
        let canonical = RangeRef::parse(range)?.to_string();
        let key = format!("{table}:{canonical}");

        let scope = self.cache.track_child(tracking)?;
        if let Some(hit) = self
            .cache
            .get::<Grid>(Namespace::SheetData, &key, Some(scope.id()))?
        {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let source = Arc::clone(&self.source);
        let table_id = table.to_string();
        let grid = self
            .ranges
            .run(&key, move || async move {
                source.fetch_range(&table_id, &canonical).await
            })
            .await?;

        self.cache.set(
            Namespace::SheetData,
            &key,
            &grid,
            self.ttl(Namespace::SheetData),
            &[],
            Some(scope.id()),
        )?;
        scope.finish()?;
        Ok(grid)
    }

    /// Every row of one tab.
    pub async fn tab(
        &self,
        table: &str,
        tab: &str,
        tracking: Option<&TrackingId>,
    ) -> StockResult<Grid> {
        let range = RangeRef::whole_tab(tab).to_string();
        self.range(table, &range, tracking).await
    }

    /// List a table's tabs, from cache when fresh.
    pub async fn tabs(
        &self,
        table: &str,
        tracking: Option<&TrackingId>,
    ) -> StockResult<Vec<TabInfo>> {
        let scope = self.cache.track_child(tracking)?;
        if let Some(hit) = self
            .cache
            .get::<Vec<TabInfo>>(Namespace::SheetTabs, table, Some(scope.id()))?
        {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let tabs = self.source.list_tabs(table).await?;
        self.cache.set(
            Namespace::SheetTabs,
            table,
            &tabs,
            self.ttl(Namespace::SheetTabs),
            &[],
            Some(scope.id()),
        )?;
        scope.finish()?;
        Ok(tabs)
    }

    /// Write to a tab, then invalidate everything read from it.
    ///
    /// Cell edits leave the table's tab list cached; a full replace drops it
    /// as well. Invalidation runs even when the write fails, since a failed
    /// full replace may already have cleared the tab. Returns the write's
    /// result.
    pub async fn set_data(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        let written = self.source.write_cells(table, tab, update).await;
        let mut removed = self.invalidate_tab(table, tab)?;
        if matches!(update, TableUpdate::FullTableReplace { .. }) {
            removed += self.invalidate_tabs(table)?;
        }
        tracing::info!(
            table,
            tab,
            cells = update.cell_count(),
            removed,
            ok = written.is_ok(),
            "Sheet data updated"
        );
        written
    }

    /// Drop cached ranges of one tab and their dependents. Returns the
    /// number of entries removed.
    ///
    /// Fetches of the tab still in flight are detached, so later readers
    /// see the tab as it is now. The detached fetches cannot write back,
    /// since their keys' generations have moved on.
    pub fn invalidate_tab(&self, table: &str, tab: &str) -> StockResult<usize> {
        let whole = format!("{table}:{}", RangeRef::whole_tab(tab));
        let sub_ranges = format!("{whole}!");
        let detached = self
            .ranges
            .forget(|key| key == whole || key.starts_with(&sub_ranges));
        if detached > 0 {
            tracing::debug!(table, tab, detached, "Detached in-flight range fetches");
        }

        let mut removed = self.cache.invalidate(Namespace::SheetData, &whole)?;
        removed += self
            .cache
            .invalidate_by_prefix(Namespace::SheetData, &sub_ranges)?;
        Ok(removed)
    }

    /// Drop a table's cached tab list and everything that routed through it.
    pub fn invalidate_tabs(&self, table: &str) -> StockResult<usize> {
        Ok(self.cache.invalidate(Namespace::SheetTabs, table)?)
    }
}

impl std::fmt::Debug for SheetData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetData")
            .field("ranges", &self.ranges)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use sheetstock_test_utils::generators::arb_tab_name;

    proptest! {
        #[test]
        fn prop_quoted_and_plain_tab_share_key(tab in arb_tab_name()) {
            let canonical = RangeRef::whole_tab(tab.as_str()).to_string();
            let quoted = format!("'{}'", tab.replace('\'', "''"));
            let expected = format!("inv:{canonical}");

            prop_assert_eq!(SheetData::range_key("inv", &quoted).unwrap(), expected.clone());
            prop_assert_eq!(SheetData::range_key("inv", &canonical).unwrap(), expected);
        }
    }
}
