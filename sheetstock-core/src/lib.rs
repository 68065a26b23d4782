//! Sheetstock Core - Shared Types
//!
//! Data types shared by every sheetstock crate: cache namespaces and keys,
//! tracking ids, TTL tiers, and the shapes exchanged with the spreadsheet
//! service. This crate contains no caching or matching logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{CacheConfig, RetryConfig, SheetLayout, StockConfig};
pub use error::{
    ConfigError, MatchError, RemoteError, SheetError, StockError, StockResult, StorageError,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Raw cell values of a range, row-major.
pub type Grid = Vec<Vec<String>>;

// ============================================================================
// NAMESPACES AND KEYS
// ============================================================================

/// A named partition of the cache key space.
///
/// Two namespaces may use identical key strings without collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Raw ranges fetched from the spreadsheet service.
    SheetData,
    /// Derived query results (identifiers, lookups spanning several sheets).
    QueryResults,
    /// Inventory records resolved by item code.
    Inventory,
    /// Parsed pack lists.
    PackLists,
    /// Parsed production schedule rows.
    ProdSchedule,
    /// Canonical name tables used by the fuzzy matcher.
    FuzzyMatching,
    /// Tab listings per table.
    SheetTabs,
}

impl Namespace {
    /// Every namespace, in declaration order.
    pub const ALL: [Namespace; 7] = [
        Namespace::SheetData,
        Namespace::QueryResults,
        Namespace::Inventory,
        Namespace::PackLists,
        Namespace::ProdSchedule,
        Namespace::FuzzyMatching,
        Namespace::SheetTabs,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::SheetData => "sheet_data",
            Namespace::QueryResults => "query_results",
            Namespace::Inventory => "inventory",
            Namespace::PackLists => "pack_lists",
            Namespace::ProdSchedule => "prod_schedule",
            Namespace::FuzzyMatching => "fuzzy_matching",
            Namespace::SheetTabs => "sheet_tabs",
        }
    }

    /// Parse a snake_case namespace name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.as_str() == name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cache key scoped to exactly one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: Namespace,
    pub key: String,
}

impl CacheKey {
    pub fn new(namespace: Namespace, key: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

// ============================================================================
// TRACKING IDS
// ============================================================================

/// Identifier of a tracking context.
///
/// Generated ids are UUIDv7 strings; callers may also supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackingId(String);

impl TrackingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh, timestamp-sortable id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// TTL TIERS
// ============================================================================

/// Coarse expiry classes, chosen per namespace by how often the underlying
/// sheet changes. Concrete durations live in [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlTier {
    Short,
    Medium,
    Long,
    VeryLong,
}

// ============================================================================
// SPREADSHEET SHAPES
// ============================================================================

/// A single-cell edit. `row` and `col` are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEdit {
    pub row: usize,
    pub col: usize,
    pub value: String,
}

impl CellEdit {
    pub fn new(row: usize, col: usize, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

/// A write against one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableUpdate {
    /// Individual cell edits.
    CellEdits(Vec<CellEdit>),
    /// Replace the tab contents starting at `start_row` (zero-based, default 0).
    FullTableReplace {
        values: Grid,
        start_row: Option<usize>,
    },
}

impl TableUpdate {
    /// Number of cells touched by this update.
    pub fn cell_count(&self) -> usize {
        match self {
            TableUpdate::CellEdits(edits) => edits.len(),
            TableUpdate::FullTableReplace { values, .. } => values.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }
}

/// A tab (sheet) inside a table (spreadsheet).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabInfo {
    pub title: String,
    pub id: i64,
}

impl TabInfo {
    pub fn new(title: impl Into<String>, id: i64) -> Self {
        Self {
            title: title.into(),
            id,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names_round_trip() {
        for ns in Namespace::ALL {
            assert_eq!(Namespace::from_name(ns.as_str()), Some(ns));
        }
        assert_eq!(Namespace::from_name("nope"), None);
    }

    #[test]
    fn test_namespace_serde_matches_display() {
        let json = serde_json::to_string(&Namespace::ProdSchedule).unwrap();
        assert_eq!(json, "\"prod_schedule\"");
        assert_eq!(Namespace::ProdSchedule.to_string(), "prod_schedule");
    }

    #[test]
    fn test_same_key_in_different_namespaces_differs() {
        let a = CacheKey::new(Namespace::Inventory, "X");
        let b = CacheKey::new(Namespace::PackLists, "X");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "inventory/X");
    }

    #[test]
    fn test_tracking_ids_are_unique() {
        let a = TrackingId::generate();
        let b = TrackingId::generate();
        assert_ne!(a, b);
        assert_eq!(TrackingId::from("op-1").as_str(), "op-1");
    }

    #[test]
    fn test_table_update_cell_count() {
        let edits = TableUpdate::CellEdits(vec![CellEdit::new(0, 0, "a"), CellEdit::new(1, 2, "b")]);
        assert_eq!(edits.cell_count(), 2);

        let replace = TableUpdate::FullTableReplace {
            values: vec![vec!["a".into(), "b".into()], vec!["c".into()]],
            start_row: Some(1),
        };
        assert_eq!(replace.cell_count(), 3);
        assert!(TableUpdate::CellEdits(vec![]).is_empty());
    }

    #[test]
    fn test_table_update_serde_tagged() {
        let update = TableUpdate::FullTableReplace {
            values: vec![vec!["x".into()]],
            start_row: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "full_table_replace");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn any_namespace() -> impl Strategy<Value = Namespace> {
        prop::sample::select(Namespace::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Keys with the same string collide only within one namespace.
        #[test]
        fn prop_cache_key_equality_requires_namespace(
            a in any_namespace(),
            b in any_namespace(),
            key in "[A-Z0-9:!-]{1,20}"
        ) {
            let ka = CacheKey::new(a, key.clone());
            let kb = CacheKey::new(b, key);
            prop_assert_eq!(ka == kb, a == b);
        }
    }
}
