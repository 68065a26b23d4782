//! Sheetstock Inventory - Domain Accessors
//!
//! Cached views over the spreadsheets that hold the inventory, pack lists,
//! production schedule and reference names. Every accessor follows the same
//! pattern: look up its cache key, on a miss read raw ranges through
//! [`SheetData`], transform them, and store the result under its namespace's
//! TTL. Reads are tracked, so editing a tab through [`Stock::set_data`]
//! invalidates everything derived from it.

pub mod identifiers;
pub mod inventory;
pub mod pack_list;
pub mod schedule;
pub mod sheet_data;

pub use identifiers::{canonical_table, format_identifier, Identifiers};
pub use inventory::{item_prefix, route_prefix, Inventory, ItemRecord};
pub use pack_list::{PackCrate, PackItem, PackList, PackLists};
pub use schedule::{
    compute_window, find_overlaps, parse_rows, DateWindow, PartialDate, ProductionSchedule,
    ScheduleColumns, ScheduleRow,
};
pub use sheet_data::SheetData;

use sheetstock_core::{StockConfig, StockResult, TableUpdate};
use sheetstock_sheets::SheetSource;
use sheetstock_storage::CacheStore;
use std::sync::Arc;

// ============================================================================
// STOCK
// ============================================================================

/// All accessors over one cache and one spreadsheet source.
#[derive(Debug)]
pub struct Stock {
    config: StockConfig,
    data: Arc<SheetData>,
    inventory: Inventory,
    pack_lists: PackLists,
    schedule: ProductionSchedule,
    identifiers: Identifiers,
}

impl Stock {
    /// Validate `config` and build accessors over a fresh cache.
    pub fn new<S>(source: S, config: StockConfig) -> StockResult<Self>
    where
        S: SheetSource + 'static,
    {
        Self::with_cache(Arc::new(CacheStore::new()), source, config)
    }

    /// Like [`new`](Self::new), sharing an existing cache.
    pub fn with_cache<S>(cache: Arc<CacheStore>, source: S, config: StockConfig) -> StockResult<Self>
    where
        S: SheetSource + 'static,
    {
        config.validate()?;
        let data = Arc::new(SheetData::new(cache, source, &config));
        let layout = config.layout.clone();

        tracing::debug!(
            inventory = %layout.inventory_table,
            pack_lists = %layout.pack_list_table,
            schedule = %layout.schedule_table,
            reference = %layout.reference_table,
            "Stock accessors ready"
        );

        Ok(Self {
            inventory: Inventory::new(Arc::clone(&data), layout.clone()),
            pack_lists: PackLists::new(Arc::clone(&data), layout.clone()),
            schedule: ProductionSchedule::new(Arc::clone(&data), layout.clone()),
            identifiers: Identifiers::new(Arc::clone(&data), layout),
            data,
            config,
        })
    }

    pub fn config(&self) -> &StockConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.data.cache()
    }

    pub fn sheet_data(&self) -> &SheetData {
        &self.data
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn pack_lists(&self) -> &PackLists {
        &self.pack_lists
    }

    pub fn schedule(&self) -> &ProductionSchedule {
        &self.schedule
    }

    pub fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    /// Write to a tab and invalidate everything derived from it.
    pub async fn set_data(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        self.data.set_data(table, tab, update).await
    }
}
