//! SHEETSTOCK sheets - remote spreadsheet access
//!
//! The cache layer reaches the spreadsheet only through [`SheetSource`]:
//! read a range, write cells, list tabs. Concrete bindings live under
//! [`providers`]; [`InMemorySheetSource`] stands in for them in tests.

pub mod a1;
pub mod coalesce;
pub mod providers;
pub mod retry;

pub use a1::{column_index, column_letters, CellRef, RangeRef};
pub use coalesce::RequestCoalescer;
pub use providers::GoogleSheetsClient;
pub use retry::with_backoff;

use async_trait::async_trait;
use sheetstock_core::{
    Grid, RemoteError, RetryConfig, StockError, StockResult, TabInfo, TableUpdate,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

// ============================================================================
// SHEET SOURCE TRAIT
// ============================================================================

/// The one external capability the cache layer consumes.
///
/// `table` identifies a spreadsheet, `range` is A1 notation. Implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Read raw rows for a range. Trailing empty cells may be omitted.
    async fn fetch_range(&self, table: &str, range: &str) -> StockResult<Grid>;

    /// Apply cell edits or a full-table replace to one tab.
    async fn write_cells(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()>;

    /// List the tabs of a spreadsheet in display order.
    async fn list_tabs(&self, table: &str) -> StockResult<Vec<TabInfo>>;
}

#[async_trait]
impl<S: SheetSource + ?Sized> SheetSource for Arc<S> {
    async fn fetch_range(&self, table: &str, range: &str) -> StockResult<Grid> {
        (**self).fetch_range(table, range).await
    }

    async fn write_cells(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        (**self).write_cells(table, tab, update).await
    }

    async fn list_tabs(&self, table: &str) -> StockResult<Vec<TabInfo>> {
        (**self).list_tabs(table).await
    }
}

// ============================================================================
// RETRYING DECORATOR
// ============================================================================

/// Wraps every call of an inner source in [`with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryingSource<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: SheetSource> RetryingSource<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl<S: SheetSource> SheetSource for RetryingSource<S> {
    async fn fetch_range(&self, table: &str, range: &str) -> StockResult<Grid> {
        with_backoff(&self.config, || self.inner.fetch_range(table, range)).await
    }

    async fn write_cells(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        with_backoff(&self.config, || self.inner.write_cells(table, tab, update)).await
    }

    async fn list_tabs(&self, table: &str) -> StockResult<Vec<TabInfo>> {
        with_backoff(&self.config, || self.inner.list_tabs(table)).await
    }
}

// ============================================================================
// IN-MEMORY SOURCE FOR TESTING
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryTab {
    title: String,
    id: i64,
    grid: Grid,
}

/// In-memory spreadsheet store with call counters.
#[derive(Debug, Default)]
pub struct InMemorySheetSource {
    tables: RwLock<HashMap<String, Vec<MemoryTab>>>,
    fetch_calls: AtomicUsize,
    write_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

const MEMORY_SERVICE: &str = "memory";

fn not_found(message: String) -> StockError {
    StockError::Remote(RemoteError::RequestFailed {
        service: MEMORY_SERVICE.to_string(),
        status: 404,
        reason: Some("notFound".to_string()),
        message,
    })
}

fn bad_request(message: String) -> StockError {
    StockError::Remote(RemoteError::RequestFailed {
        service: MEMORY_SERVICE.to_string(),
        status: 400,
        reason: Some("badRequest".to_string()),
        message,
    })
}

impl InMemorySheetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`put_tab`](Self::put_tab).
    pub fn with_tab(self, table: &str, tab: &str, grid: Grid) -> Self {
        self.put_tab(table, tab, grid);
        self
    }

    /// Create or replace a tab's contents.
    pub fn put_tab(&self, table: &str, tab: &str, grid: Grid) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let tabs = tables.entry(table.to_string()).or_default();
        match tabs.iter_mut().find(|t| t.title == tab) {
            Some(existing) => existing.grid = grid,
            None => {
                let id = tabs.iter().map(|t| t.id + 1).max().unwrap_or(0);
                tabs.push(MemoryTab {
                    title: tab.to_string(),
                    id,
                    grid,
                });
            }
        }
    }

    /// Current contents of a tab.
    pub fn tab(&self, table: &str, tab: &str) -> Option<Grid> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(table)?
            .iter()
            .find(|t| t.title == tab)
            .map(|t| t.grid.clone())
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn apply_update(grid: &mut Grid, update: &TableUpdate) {
    match update {
        TableUpdate::CellEdits(edits) => {
            for edit in edits {
                if grid.len() <= edit.row {
                    grid.resize(edit.row + 1, Vec::new());
                }
                let row = &mut grid[edit.row];
                if row.len() <= edit.col {
                    row.resize(edit.col + 1, String::new());
                }
                row[edit.col] = edit.value.clone();
            }
        }
        TableUpdate::FullTableReplace { values, start_row } => {
            let start = start_row.unwrap_or(0);
            grid.truncate(start);
            grid.resize(start, Vec::new());
            grid.extend(values.iter().cloned());
        }
    }
}

#[async_trait]
impl SheetSource for InMemorySheetSource {
    async fn fetch_range(&self, table: &str, range: &str) -> StockResult<Grid> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let range_ref = RangeRef::parse(range).map_err(|e| bad_request(e.to_string()))?;
        let grid = self
            .tab(table, &range_ref.tab)
            .ok_or_else(|| not_found(format!("Unable to parse range: {range}")))?;
        Ok(range_ref.slice(&grid))
    }

    async fn write_cells(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let target = tables
            .get_mut(table)
            .and_then(|tabs| tabs.iter_mut().find(|t| t.title == tab))
            .ok_or_else(|| not_found(format!("No tab {tab} in {table}")))?;
        apply_update(&mut target.grid, update);
        Ok(())
    }

    async fn list_tabs(&self, table: &str) -> StockResult<Vec<TabInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let tabs = tables
            .get(table)
            .ok_or_else(|| not_found(format!("Requested entity was not found: {table}")))?;
        Ok(tabs.iter().map(|t| TabInfo::new(t.title.clone(), t.id)).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
