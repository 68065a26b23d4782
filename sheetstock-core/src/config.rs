//! Configuration types
//!
//! Configuration is assembled from defaults, an optional TOML document and
//! `SHEETSTOCK_*` environment variables, then validated once at startup.

use crate::{ConfigError, Namespace, StockError, StockResult, TtlTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// TTL tiers and the tier assigned to each namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_short_secs: u64,
    pub ttl_medium_secs: u64,
    pub ttl_long_secs: u64,
    pub ttl_very_long_secs: u64,
    /// Tier used for each namespace; unlisted namespaces use `Medium`.
    pub namespace_tiers: BTreeMap<Namespace, TtlTier>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let namespace_tiers = BTreeMap::from([
            (Namespace::SheetData, TtlTier::Short),
            (Namespace::QueryResults, TtlTier::Medium),
            (Namespace::Inventory, TtlTier::Medium),
            (Namespace::PackLists, TtlTier::Medium),
            (Namespace::ProdSchedule, TtlTier::Medium),
            (Namespace::FuzzyMatching, TtlTier::VeryLong),
            (Namespace::SheetTabs, TtlTier::Long),
        ]);

        Self {
            ttl_short_secs: 60,
            ttl_medium_secs: 300,
            ttl_long_secs: 1800,
            ttl_very_long_secs: 7200,
            namespace_tiers,
        }
    }
}

impl CacheConfig {
    /// Duration of a tier.
    pub fn tier_ttl(&self, tier: TtlTier) -> Duration {
        let secs = match tier {
            TtlTier::Short => self.ttl_short_secs,
            TtlTier::Medium => self.ttl_medium_secs,
            TtlTier::Long => self.ttl_long_secs,
            TtlTier::VeryLong => self.ttl_very_long_secs,
        };
        Duration::from_secs(secs)
    }

    /// Tier assigned to a namespace.
    pub fn tier_for(&self, namespace: Namespace) -> TtlTier {
        self.namespace_tiers
            .get(&namespace)
            .copied()
            .unwrap_or(TtlTier::Medium)
    }

    /// TTL for entries written into `namespace`.
    pub fn ttl_for(&self, namespace: Namespace) -> Duration {
        self.tier_ttl(self.tier_for(namespace))
    }
}

// ============================================================================
// RETRY CONFIGURATION
// ============================================================================

/// Retry configuration for remote spreadsheet calls.
///
/// `max_retries` caps the total number of attempts, including the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Override the attempt cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the initial delay.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff_ms = delay.as_millis() as u64;
        self
    }
}

// ============================================================================
// SHEET LAYOUT
// ============================================================================

/// Where the domain data lives and how its tabs are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Table holding one tab per item category.
    pub inventory_table: String,
    /// Table holding one pack-list tab per show.
    pub pack_list_table: String,
    /// Table holding the production schedule.
    pub schedule_table: String,
    pub schedule_tab: String,
    /// Table holding the canonical client and show names.
    pub reference_table: String,
    pub clients_tab: String,
    pub shows_tab: String,
    /// Header of the item-code column in inventory tabs.
    pub item_column: String,
    /// Item-code prefix to tab title, for prefixes that differ from their tab.
    pub tab_aliases: BTreeMap<String, String>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            inventory_table: "inventory".to_string(),
            pack_list_table: "pack-lists".to_string(),
            schedule_table: "schedule".to_string(),
            schedule_tab: "ProductionSchedule".to_string(),
            reference_table: "reference".to_string(),
            clients_tab: "Clients".to_string(),
            shows_tab: "Shows".to_string(),
            item_column: "ITEM#".to_string(),
            tab_aliases: BTreeMap::new(),
        }
    }
}

// ============================================================================
// MASTER CONFIGURATION
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub layout: SheetLayout,
}

impl StockConfig {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(source: &str) -> StockResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| {
            StockError::Config(ConfigError::Parse {
                source_name: "toml".to_string(),
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `SHEETSTOCK_TTL_SHORT_SECS`, `SHEETSTOCK_TTL_MEDIUM_SECS`,
    ///   `SHEETSTOCK_TTL_LONG_SECS`, `SHEETSTOCK_TTL_VERY_LONG_SECS`
    /// - `SHEETSTOCK_RETRY_MAX_RETRIES` (default: 5)
    /// - `SHEETSTOCK_RETRY_INITIAL_BACKOFF_MS` (default: 500)
    /// - `SHEETSTOCK_RETRY_MAX_BACKOFF_MS` (default: 60000)
    /// - `SHEETSTOCK_INVENTORY_TABLE`, `SHEETSTOCK_PACK_LIST_TABLE`,
    ///   `SHEETSTOCK_SCHEDULE_TABLE`, `SHEETSTOCK_REFERENCE_TABLE`
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        if let Some(v) = number("SHEETSTOCK_TTL_SHORT_SECS") {
            self.cache.ttl_short_secs = v;
        }
        if let Some(v) = number("SHEETSTOCK_TTL_MEDIUM_SECS") {
            self.cache.ttl_medium_secs = v;
        }
        if let Some(v) = number("SHEETSTOCK_TTL_LONG_SECS") {
            self.cache.ttl_long_secs = v;
        }
        if let Some(v) = number("SHEETSTOCK_TTL_VERY_LONG_SECS") {
            self.cache.ttl_very_long_secs = v;
        }
        // Values beyond u32 are ignored, not truncated.
        let max_retries = number("SHEETSTOCK_RETRY_MAX_RETRIES").and_then(|v| u32::try_from(v).ok());
        if let Some(v) = max_retries {
            self.retry.max_retries = v;
        }
        if let Some(v) = number("SHEETSTOCK_RETRY_INITIAL_BACKOFF_MS") {
            self.retry.initial_backoff_ms = v;
        }
        if let Some(v) = number("SHEETSTOCK_RETRY_MAX_BACKOFF_MS") {
            self.retry.max_backoff_ms = v;
        }

        let tables = [
            ("SHEETSTOCK_INVENTORY_TABLE", &mut self.layout.inventory_table),
            ("SHEETSTOCK_PACK_LIST_TABLE", &mut self.layout.pack_list_table),
            ("SHEETSTOCK_SCHEDULE_TABLE", &mut self.layout.schedule_table),
            ("SHEETSTOCK_REFERENCE_TABLE", &mut self.layout.reference_table),
        ];
        for (name, slot) in tables {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *slot = value.trim().to_string();
            }
        }

        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every TTL tier is positive
    /// - at least one attempt is allowed and the multiplier is >= 1
    /// - table ids, tab names and the item column are non-empty
    pub fn validate(&self) -> StockResult<()> {
        let tiers = [
            ("cache.ttl_short_secs", self.cache.ttl_short_secs),
            ("cache.ttl_medium_secs", self.cache.ttl_medium_secs),
            ("cache.ttl_long_secs", self.cache.ttl_long_secs),
            ("cache.ttl_very_long_secs", self.cache.ttl_very_long_secs),
        ];
        for (field, secs) in tiers {
            if secs == 0 {
                return Err(invalid(field, secs.to_string(), "TTL must be positive"));
            }
        }

        if self.retry.max_retries == 0 {
            return Err(invalid(
                "retry.max_retries",
                "0".to_string(),
                "at least one attempt is required",
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier.to_string(),
                "backoff_multiplier must be >= 1.0",
            ));
        }

        let required = [
            ("layout.inventory_table", &self.layout.inventory_table),
            ("layout.pack_list_table", &self.layout.pack_list_table),
            ("layout.schedule_table", &self.layout.schedule_table),
            ("layout.schedule_tab", &self.layout.schedule_tab),
            ("layout.reference_table", &self.layout.reference_table),
            ("layout.clients_tab", &self.layout.clients_tab),
            ("layout.shows_tab", &self.layout.shows_tab),
            ("layout.item_column", &self.layout.item_column),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(StockError::Config(ConfigError::MissingRequired {
                    field: field.to_string(),
                }));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> StockError {
    StockError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
