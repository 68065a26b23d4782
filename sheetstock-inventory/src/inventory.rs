//! Item lookups across the per-category inventory tabs.

use crate::sheet_data::SheetData;
use serde::{Deserialize, Serialize};
use sheetstock_core::{
    Grid, Namespace, SheetError, SheetLayout, StockResult, TabInfo, TrackingId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One requested item and the requested fields found for it.
///
/// A field is `None` when its column, row, or tab could not be found; the
/// matching [`SheetError`]s are collected in `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub code: String,
    /// Tab the code was routed to.
    pub tab: Option<String>,
    pub fields: BTreeMap<String, Option<String>>,
    #[serde(skip)]
    pub errors: Vec<SheetError>,
}

impl ItemRecord {
    fn new(code: &str, fields: &[String]) -> Self {
        Self {
            code: code.to_string(),
            tab: None,
            fields: fields.iter().map(|f| (f.clone(), None)).collect(),
            errors: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_deref())
    }
}

/// Alphabetic prefix of an item code, uppercased: `"case-12"` is `"CASE"`.
pub fn item_prefix(code: &str) -> String {
    code.trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Resolve the tab holding items with `prefix`: a configured alias first,
/// then a tab whose title matches case-insensitively.
pub fn route_prefix<'a>(prefix: &str, layout: &SheetLayout, tabs: &'a [TabInfo]) -> Option<&'a str> {
    let wanted = layout
        .tab_aliases
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(prefix))
        .map(|(_, tab)| tab.as_str())
        .unwrap_or(prefix);
    tabs.iter()
        .find(|t| t.title.eq_ignore_ascii_case(wanted))
        .map(|t| t.title.as_str())
}

/// Index of the header cell equal to `name`, ignoring case and padding.
pub fn column_of(header: &[String], name: &str) -> Option<usize> {
    let name = name.trim();
    header.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Item lookups over [`SheetLayout::inventory_table`].
#[derive(Debug)]
pub struct Inventory {
    data: Arc<SheetData>,
    layout: SheetLayout,
}

impl Inventory {
    pub fn new(data: Arc<SheetData>, layout: SheetLayout) -> Self {
        Self { data, layout }
    }

    fn cache_key(codes: &[String], fields: &[String]) -> String {
        format!("{}|{}", codes.join(","), fields.join(","))
    }

    /// Look up `fields` for each item code, in the order given.
    ///
    /// With no fields requested, every column of the item's tab is
    /// returned. Missing tabs, columns and rows are reported per item and
    /// never fail the whole call; only a fully resolved result is cached.
    pub async fn lookup<C, F>(
        &self,
        codes: &[C],
        fields: &[F],
        tracking: Option<&TrackingId>,
    ) -> StockResult<Vec<ItemRecord>>
    where
        C: AsRef<str>,
        F: AsRef<str>,
    {
        let codes: Vec<String> = codes.iter().map(|c| c.as_ref().trim().to_string()).collect();
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().trim().to_string()).collect();
        let key = Self::cache_key(&codes, &fields);
        let cache = self.data.cache();

        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());
        if let Some(hit) = cache.get::<Vec<ItemRecord>>(Namespace::Inventory, &key, id)? {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let table = &self.layout.inventory_table;
        let tabs = self.data.tabs(table, id).await?;

        let mut records: Vec<ItemRecord> = codes.iter().map(|c| ItemRecord::new(c, &fields)).collect();
        let mut by_tab: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter_mut().enumerate() {
            let prefix = item_prefix(&record.code);
            if prefix.is_empty() {
                record.errors.push(SheetError::UnroutableItem {
                    code: record.code.clone(),
                });
                continue;
            }
            match route_prefix(&prefix, &self.layout, &tabs) {
                Some(tab) => {
                    record.tab = Some(tab.to_string());
                    by_tab.entry(tab.to_string()).or_default().push(i);
                }
                None => record.errors.push(SheetError::TabNotFound {
                    table: table.clone(),
                    tab: prefix,
                }),
            }
        }

        for (tab, indices) in by_tab {
            let grid = self.data.tab(table, &tab, id).await?;
            for i in indices {
                self.fill_record(&mut records[i], &tab, &grid);
            }
        }

        if records.iter().all(ItemRecord::is_complete) {
            cache.set(
                Namespace::Inventory,
                &key,
                &records,
                self.data.ttl(Namespace::Inventory),
                &[],
                id,
            )?;
        } else {
            tracing::debug!(
                items = records.len(),
                incomplete = records.iter().filter(|r| !r.is_complete()).count(),
                "Inventory lookup incomplete, not cached"
            );
        }
        scope.finish()?;
        Ok(records)
    }

    fn fill_record(&self, record: &mut ItemRecord, tab: &str, grid: &Grid) {
        let Some(header) = grid.first() else {
            record.errors.push(SheetError::MissingHeader { tab: tab.to_string() });
            return;
        };
        let Some(item_col) = column_of(header, &self.layout.item_column) else {
            record.errors.push(SheetError::ColumnNotFound {
                tab: tab.to_string(),
                column: self.layout.item_column.clone(),
            });
            return;
        };
        let Some(row) = grid.iter().skip(1).find(|row| {
            row.get(item_col)
                .is_some_and(|cell| cell.trim().eq_ignore_ascii_case(&record.code))
        }) else {
            record.errors.push(SheetError::RowNotFound {
                tab: tab.to_string(),
                item: record.code.clone(),
            });
            return;
        };

        if record.fields.is_empty() {
            for (col, name) in header.iter().enumerate() {
                let name = name.trim();
                if !name.is_empty() {
                    let value = row.get(col).cloned().unwrap_or_default();
                    record.fields.insert(name.to_string(), Some(value));
                }
            }
            return;
        }

        for (field, value) in record.fields.iter_mut() {
            match column_of(header, field) {
                Some(col) => *value = Some(row.get(col).cloned().unwrap_or_default()),
                None => record.errors.push(SheetError::ColumnNotFound {
                    tab: tab.to_string(),
                    column: field.clone(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetstock_core::StockConfig;
    use sheetstock_sheets::InMemorySheetSource;
    use sheetstock_storage::CacheStore;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn inventory(layout: SheetLayout) -> (Arc<InMemorySheetSource>, Inventory) {
        let source = Arc::new(
            InMemorySheetSource::new()
                .with_tab(
                    "inventory",
                    "CASE",
                    grid(&[
                        &["ITEM#", "Description", "QTY"],
                        &["CASE-1", "Road case", "4"],
                        &["CASE-2", "Rack case"],
                    ]),
                )
                .with_tab(
                    "inventory",
                    "Lighting",
                    grid(&[&[" item# ", "QTY"], &["LT-7", "12"]]),
                ),
        );
        let config = StockConfig::default();
        let data = SheetData::new(Arc::new(CacheStore::new()), Arc::clone(&source), &config);
        (source, Inventory::new(Arc::new(data), layout))
    }

    fn aliased() -> SheetLayout {
        let mut layout = SheetLayout::default();
        layout.tab_aliases.insert("LT".to_string(), "Lighting".to_string());
        layout
    }

    #[test]
    fn test_item_prefix() {
        assert_eq!(item_prefix("case-12"), "CASE");
        assert_eq!(item_prefix(" LT7"), "LT");
        assert_eq!(item_prefix("42"), "");
    }

    #[test]
    fn test_route_prefix_prefers_alias() {
        let tabs = vec![TabInfo::new("case", 0), TabInfo::new("Lighting", 1)];
        let layout = aliased();
        assert_eq!(route_prefix("CASE", &layout, &tabs), Some("case"));
        assert_eq!(route_prefix("lt", &layout, &tabs), Some("Lighting"));
        assert_eq!(route_prefix("CABLE", &layout, &tabs), None);
    }

    #[tokio::test]
    async fn test_lookup_resolves_fields() {
        let (_, inventory) = inventory(aliased());
        let records = inventory
            .lookup(&["case-1", "LT-7"], &["QTY"], None)
            .await
            .unwrap();
        assert_eq!(records[0].field("QTY"), Some("4"));
        assert_eq!(records[0].tab.as_deref(), Some("CASE"));
        assert_eq!(records[1].field("QTY"), Some("12"));
        assert!(records.iter().all(ItemRecord::is_complete));
    }

    #[tokio::test]
    async fn test_short_row_reads_as_empty() {
        let (_, inventory) = inventory(aliased());
        let records = inventory.lookup(&["CASE-2"], &["QTY"], None).await.unwrap();
        assert_eq!(records[0].field("QTY"), Some(""));
    }

    #[tokio::test]
    async fn test_all_columns_when_no_fields() {
        let (_, inventory) = inventory(aliased());
        let no_fields: [&str; 0] = [];
        let records = inventory.lookup(&["CASE-1"], &no_fields, None).await.unwrap();
        assert_eq!(records[0].field("Description"), Some("Road case"));
        assert_eq!(records[0].field("ITEM#"), Some("CASE-1"));
    }

    #[tokio::test]
    async fn test_partial_results_reported_per_item() {
        let (_, inventory) = inventory(SheetLayout::default());
        let records = inventory
            .lookup(&["CASE-1", "CASE-9", "LT-7", "99", "CASE-1"], &["QTY", "Weight"], None)
            .await
            .unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[0].field("QTY"), Some("4"));
        assert_eq!(records[0].fields.get("Weight"), Some(&None));
        assert!(matches!(records[0].errors[..], [SheetError::ColumnNotFound { .. }]));
        assert!(matches!(records[1].errors[..], [SheetError::RowNotFound { .. }]));
        assert!(matches!(records[2].errors[..], [SheetError::TabNotFound { .. }]));
        assert!(matches!(records[3].errors[..], [SheetError::UnroutableItem { .. }]));
    }

    #[tokio::test]
    async fn test_only_complete_results_are_cached() {
        let (source, inventory) = inventory(aliased());
        let cache = Arc::clone(inventory.data.cache());

        inventory.lookup(&["CASE-1"], &["QTY"], None).await.unwrap();
        assert_eq!(cache.stats().unwrap().entry_count, 3);

        inventory.lookup(&["CASE-1"], &["Nope"], None).await.unwrap();
        assert!(!cache.contains(Namespace::Inventory, "CASE-1|Nope").unwrap());
        assert!(cache.contains(Namespace::Inventory, "CASE-1|QTY").unwrap());
        assert_eq!(source.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookup_depends_on_its_tab() {
        let (source, inventory) = inventory(aliased());
        let cache = Arc::clone(inventory.data.cache());
        inventory.lookup(&["LT-7"], &["QTY"], None).await.unwrap();

        source.put_tab("inventory", "Lighting", grid(&[&["ITEM#", "QTY"], &["LT-7", "3"]]));
        inventory.data.invalidate_tab("inventory", "Lighting").unwrap();

        assert!(!cache.contains(Namespace::Inventory, "LT-7|QTY").unwrap());
        let records = inventory.lookup(&["LT-7"], &["QTY"], None).await.unwrap();
        assert_eq!(records[0].field("QTY"), Some("3"));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use sheetstock_test_utils::generators::arb_item_code;

    proptest! {
        #[test]
        fn prop_prefix_is_leading_letters(code in arb_item_code()) {
            let prefix = item_prefix(&code);
            prop_assert!(!prefix.is_empty());
            prop_assert!(prefix.chars().all(|c| c.is_ascii_uppercase()));
            prop_assert!(code.to_ascii_uppercase().starts_with(&prefix));
            prop_assert_eq!(item_prefix(&format!("  {}", code.to_ascii_lowercase())), prefix);
        }
    }
}
