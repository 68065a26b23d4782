//! Pack-list parsing: crates and the items packed in them.

use crate::sheet_data::SheetData;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sheetstock_core::{Grid, Namespace, SheetLayout, StockResult, TrackingId};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Header of the column whose non-empty cells start a new crate.
pub const PIECE_HEADER: &str = "PIECE";

fn item_line() -> &'static Regex {
    static ITEM_LINE: OnceLock<Regex> = OnceLock::new();
    ITEM_LINE.get_or_init(|| {
        Regex::new(r"^\(\s*(\d+)\s*\)\s*([A-Za-z][A-Za-z0-9#./-]*)\s*(.*)$")
            .expect("Invalid item line regex")
    })
}

/// One `(qty) CODE description` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackItem {
    pub quantity: u32,
    pub code: String,
    pub description: String,
}

impl PackItem {
    /// Parse an item line. Anything else yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = item_line().captures(line.trim())?;
        Some(Self {
            quantity: caps[1].parse().ok()?,
            code: caps[2].to_ascii_uppercase(),
            description: caps[3].trim().to_string(),
        })
    }
}

/// A crate: its piece label, free-text details and packed items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackCrate {
    pub piece: String,
    pub details: Vec<String>,
    pub items: Vec<PackItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackList {
    pub tab: String,
    pub crates: Vec<PackCrate>,
    /// Item lines that appear before the first crate.
    pub loose_items: Vec<PackItem>,
}

impl PackList {
    /// Parse a pack-list tab. The piece column is found by header, falling
    /// back to the first column; the header row itself is skipped when
    /// present.
    pub fn parse(tab: &str, grid: &Grid) -> Self {
        let header_col = grid.first().and_then(|header| {
            header
                .iter()
                .position(|h| h.trim().to_ascii_uppercase().starts_with(PIECE_HEADER))
        });
        let piece_col = header_col.unwrap_or(0);
        let body = if header_col.is_some() { &grid[1..] } else { &grid[..] };

        let mut list = PackList {
            tab: tab.to_string(),
            ..Default::default()
        };

        for row in body {
            let piece = row.get(piece_col).map(|c| c.trim()).unwrap_or_default();
            if !piece.is_empty() {
                list.crates.push(PackCrate {
                    piece: piece.to_string(),
                    details: Vec::new(),
                    items: Vec::new(),
                });
            }

            for (col, cell) in row.iter().enumerate() {
                let cell = cell.trim();
                if col == piece_col || cell.is_empty() {
                    continue;
                }
                match (PackItem::parse(cell), list.crates.last_mut()) {
                    (Some(item), Some(current)) => current.items.push(item),
                    (Some(item), None) => list.loose_items.push(item),
                    (None, Some(current)) if !piece.is_empty() => {
                        current.details.push(cell.to_string())
                    }
                    (None, _) => {}
                }
            }
        }
        list
    }

    /// Total quantity per item code across every crate and loose line.
    /// Totals saturate rather than wrap.
    pub fn item_totals(&self) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        let items = self
            .crates
            .iter()
            .flat_map(|c| c.items.iter())
            .chain(self.loose_items.iter());
        for item in items {
            let total = totals.entry(item.code.clone()).or_insert(0u64);
            *total = total.saturating_add(u64::from(item.quantity));
        }
        totals
    }

    pub fn item_count(&self) -> usize {
        self.crates.iter().map(|c| c.items.len()).sum::<usize>() + self.loose_items.len()
    }
}

/// Parsed pack lists from [`SheetLayout::pack_list_table`].
#[derive(Debug)]
pub struct PackLists {
    data: Arc<SheetData>,
    layout: SheetLayout,
}

impl PackLists {
    pub fn new(data: Arc<SheetData>, layout: SheetLayout) -> Self {
        Self { data, layout }
    }

    pub async fn get(&self, tab: &str, tracking: Option<&TrackingId>) -> StockResult<PackList> {
        let cache = self.data.cache();
        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());
        if let Some(hit) = cache.get::<PackList>(Namespace::PackLists, tab, id)? {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let grid = self.data.tab(&self.layout.pack_list_table, tab, id).await?;
        let list = PackList::parse(tab, &grid);
        tracing::debug!(tab, crates = list.crates.len(), items = list.item_count(), "Parsed pack list");

        cache.set(
            Namespace::PackLists,
            tab,
            &list,
            self.data.ttl(Namespace::PackLists),
            &[],
            id,
        )?;
        scope.finish()?;
        Ok(list)
    }

    /// Quantity of every requested item code in one pack list.
    pub async fn quantities<C: AsRef<str>>(
        &self,
        tab: &str,
        codes: &[C],
        tracking: Option<&TrackingId>,
    ) -> StockResult<BTreeMap<String, u64>> {
        let totals = self.get(tab, tracking).await?.item_totals();
        Ok(codes
            .iter()
            .map(|code| {
                let code = code.as_ref().trim().to_ascii_uppercase();
                let qty = totals.get(&code).copied().unwrap_or(0);
                (code, qty)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn sample() -> Grid {
        grid(&[
            &["Piece #", "Contents", "Notes"],
            &["", "(1) LT-7 stray fixture"],
            &["1", "Road case 24x24", "(2) CASE-1 spare"],
            &["", "(4) lt-7 Par can"],
            &["", "", "(1) CABLE-50 50ft"],
            &["2", "(3) LT-7"],
            &["", "just a note"],
        ])
    }

    #[test]
    fn test_item_line_parse() {
        assert_eq!(
            PackItem::parse("(12) cab-3 Stage pin, 25'"),
            Some(PackItem {
                quantity: 12,
                code: "CAB-3".to_string(),
                description: "Stage pin, 25'".to_string(),
            })
        );
        assert_eq!(PackItem::parse("( 2 ) LT-7").map(|i| i.quantity), Some(2));
        assert_eq!(PackItem::parse("Road case"), None);
        assert_eq!(PackItem::parse("(x) LT-7"), None);
    }

    #[test]
    fn test_crates_start_on_piece_rows() {
        let list = PackList::parse("Show", &sample());
        assert_eq!(list.crates.len(), 2);
        assert_eq!(list.crates[0].piece, "1");
        assert_eq!(list.crates[0].details, vec!["Road case 24x24".to_string()]);
        assert_eq!(list.crates[0].items.len(), 3);
        assert_eq!(list.crates[1].items[0].quantity, 3);
        assert_eq!(list.loose_items.len(), 1);
    }

    #[test]
    fn test_item_totals() {
        let totals = PackList::parse("Show", &sample()).item_totals();
        assert_eq!(totals.get("LT-7"), Some(&8));
        assert_eq!(totals.get("CASE-1"), Some(&2));
        assert_eq!(totals.get("CABLE-50"), Some(&1));
    }

    #[test]
    fn test_large_quantities_do_not_overflow() {
        let list = PackList::parse(
            "Show",
            &grid(&[&["1", "(4000000000) X-1"], &["2", "(4000000000) X-1"]]),
        );
        assert_eq!(list.item_totals().get("X-1"), Some(&8_000_000_000));
    }

    #[test]
    fn test_headerless_grid_uses_first_column() {
        let list = PackList::parse("Show", &grid(&[&["A", "(1) X-1"], &["B", "(2) X-1"]]));
        assert_eq!(list.crates.len(), 2);
        assert_eq!(list.item_totals().get("X-1"), Some(&3));
    }

    #[test]
    fn test_empty_grid() {
        let list = PackList::parse("Show", &Vec::new());
        assert!(list.crates.is_empty());
        assert_eq!(list.item_count(), 0);
    }
}
