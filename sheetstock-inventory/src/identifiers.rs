//! Show identifiers built from fuzzily matched client and show names.

use crate::sheet_data::SheetData;
use sheetstock_core::{Grid, MatchError, Namespace, SheetLayout, StockResult, TrackingId};
use sheetstock_match::{normalize, CanonicalTable, Matcher};
use std::sync::Arc;

/// Build a canonical-name table from a reference tab: names in the first
/// column, comma-separated abbreviations in the second. The header row is
/// skipped.
pub fn canonical_table(grid: &Grid) -> CanonicalTable {
    CanonicalTable::from_rows(grid.iter().skip(1).filter_map(|row| {
        let name = row.first()?.trim();
        if name.is_empty() {
            return None;
        }
        let abbreviations = row.get(1).map(|a| a.trim().to_string()).unwrap_or_default();
        Some((name.to_string(), abbreviations))
    }))
}

/// `"{client} {year} {show}"`.
pub fn format_identifier(client: &str, year: i32, show: &str) -> String {
    format!("{client} {year} {show}")
}

/// Computes show identifiers from reference tables in
/// [`SheetLayout::reference_table`].
#[derive(Debug)]
pub struct Identifiers {
    data: Arc<SheetData>,
    layout: SheetLayout,
    matcher: Matcher,
}

impl Identifiers {
    pub fn new(data: Arc<SheetData>, layout: SheetLayout) -> Self {
        Self {
            data,
            layout,
            matcher: Matcher::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Identifier for a show, e.g. `"Acme Corp 2024 Spring Expo"`.
    ///
    /// Client and show are matched against their canonical tables. An input
    /// with no match, or an ambiguous one, is used as typed (trimmed), so
    /// results are keyed on the trimmed inputs rather than normalized ones.
    pub async fn compute(
        &self,
        show: &str,
        client: &str,
        year: i32,
        tracking: Option<&TrackingId>,
    ) -> StockResult<String> {
        let key = format!("identifier:{}|{}|{year}", show.trim(), client.trim());
        let cache = self.data.cache();
        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());
        if let Some(hit) = cache.get::<String>(Namespace::QueryResults, &key, id)? {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let client_name = self.resolve(&self.layout.clients_tab, client, id).await?;
        let show_name = self.resolve(&self.layout.shows_tab, show, id).await?;
        let identifier = format_identifier(&client_name, year, &show_name);

        cache.set(
            Namespace::QueryResults,
            &key,
            &identifier,
            self.data.ttl(Namespace::QueryResults),
            &[],
            id,
        )?;
        scope.finish()?;
        Ok(identifier)
    }

    /// Canonical form of `input` from one reference tab, or the trimmed
    /// input when nothing matches unambiguously.
    pub async fn resolve(
        &self,
        tab: &str,
        input: &str,
        tracking: Option<&TrackingId>,
    ) -> StockResult<String> {
        let key = format!("{tab}:{}", normalize(input));
        let cache = self.data.cache();
        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());

        // A cached `None` records a failed match.
        let matched = match cache.get::<Option<String>>(Namespace::FuzzyMatching, &key, id)? {
            Some(hit) => hit.into_value(),
            None => {
                let table = self.reference(tab, id).await?;
                let matched = match table.best_match(input, &self.matcher) {
                    Ok(m) => Some(m.candidate),
                    Err(MatchError::NoMatch { .. }) => None,
                    Err(e @ MatchError::Ambiguous { .. }) => {
                        tracing::debug!(tab, input, error = %e, "Ambiguous name, keeping input");
                        None
                    }
                };
                cache.set(
                    Namespace::FuzzyMatching,
                    &key,
                    &matched,
                    self.data.ttl(Namespace::FuzzyMatching),
                    &[],
                    id,
                )?;
                matched
            }
        };
        scope.finish()?;
        Ok(matched.unwrap_or_else(|| input.trim().to_string()))
    }

    /// The canonical table of a reference tab, cached in
    /// [`Namespace::FuzzyMatching`].
    pub async fn reference(
        &self,
        tab: &str,
        tracking: Option<&TrackingId>,
    ) -> StockResult<CanonicalTable> {
        let key = format!("table:{tab}");
        let cache = self.data.cache();
        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());
        if let Some(hit) = cache.get::<CanonicalTable>(Namespace::FuzzyMatching, &key, id)? {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let grid = self.data.tab(&self.layout.reference_table, tab, id).await?;
        let table = canonical_table(&grid);
        cache.set(
            Namespace::FuzzyMatching,
            &key,
            &table,
            self.data.ttl(Namespace::FuzzyMatching),
            &[],
            id,
        )?;
        scope.finish()?;
        Ok(table)
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

    fn identifiers() -> (Arc<InMemorySheetSource>, Identifiers) {
        let source = Arc::new(
            InMemorySheetSource::new()
                .with_tab(
                    "reference",
                    "Clients",
                    grid(&[
                        &["Name", "Abbreviations"],
                        &["Acme Corp", "ACME, AC"],
                        &["Globex", "GBX"],
                        &["AB", ""],
                    ]),
                )
                .with_tab(
                    "reference",
                    "Shows",
                    grid(&[&["Name"], &["Spring Expo", "SPX"], &["Auto Show"]]),
                ),
        );
        let data = SheetData::new(
            Arc::new(CacheStore::new()),
            Arc::clone(&source),
            &StockConfig::default(),
        );
        (source, Identifiers::new(Arc::new(data), SheetLayout::default()))
    }

    #[test]
    fn test_canonical_table_skips_header_and_blanks() {
        let table = canonical_table(&grid(&[&["Name"], &["Acme", "AC"], &[""], &["Globex"]]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].abbreviations, "AC");
        assert_eq!(table.rows()[1].abbreviations, "");
    }

    #[tokio::test]
    async fn test_compute_uses_canonical_names() {
        let (_, ids) = identifiers();
        let id = ids.compute("spring expo", "acme", 2024, None).await.unwrap();
        assert_eq!(id, "Acme Corp 2024 Spring Expo");
    }

    #[tokio::test]
    async fn test_compute_tolerates_typos() {
        let (_, ids) = identifiers();
        let id = ids.compute("Auto Shwo", "Globx", 2025, None).await.unwrap();
        assert_eq!(id, "Globex 2025 Auto Show");
    }

    #[tokio::test]
    async fn test_unknown_names_fall_back_to_input() {
        let (_, ids) = identifiers();
        let id = ids
            .compute("  Unknown Show ", "Unknown Client", 2024, None)
            .await
            .unwrap();
        assert_eq!(id, "Unknown Client 2024 Unknown Show");
    }

    #[tokio::test]
    async fn test_ambiguous_client_falls_back_to_input() {
        let (source, ids) = identifiers();
        // "AA" is one edit from both "AC" (Acme Corp) and "AB".
        let id = ids.compute("Spring Expo", " aa ", 2024, None).await.unwrap();
        assert_eq!(id, "aa 2024 Spring Expo");

        let cache = ids.data.cache();
        let cached = cache
            .get::<Option<String>>(Namespace::FuzzyMatching, "Clients:AA", None)
            .unwrap()
            .unwrap();
        assert_eq!(cached.into_value(), None);

        let hits = cache.stats().unwrap().hits;
        assert_eq!(ids.resolve("Clients", "Aa", None).await.unwrap(), "Aa");
        assert_eq!(cache.stats().unwrap().hits, hits + 1);
        assert_eq!(source.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_fallback_keeps_each_spelling() {
        let (_, ids) = identifiers();
        let lower = ids.compute("Pop-up Fair", "new client", 2024, None).await.unwrap();
        let upper = ids.compute("Pop-Up Fair.", "NEW CLIENT", 2024, None).await.unwrap();
        assert_eq!(lower, "new client 2024 Pop-up Fair");
        assert_eq!(upper, "NEW CLIENT 2024 Pop-Up Fair.");
    }

    #[tokio::test]
    async fn test_reference_tables_fetched_once() {
        let (source, ids) = identifiers();
        ids.compute("Spring Expo", "Acme", 2024, None).await.unwrap();
        ids.compute("Auto Show", "Globex", 2024, None).await.unwrap();
        assert_eq!(source.fetch_calls(), 2);

        let cache = ids.data.cache();
        assert!(cache.contains(Namespace::FuzzyMatching, "table:Clients").unwrap());
        assert!(cache.contains(Namespace::FuzzyMatching, "Clients:ACME").unwrap());
    }

    #[tokio::test]
    async fn test_reference_edit_invalidates_identifier() {
        let (source, ids) = identifiers();
        ids.compute("Spring Expo", "Acme", 2024, None).await.unwrap();

        source.put_tab(
            "reference",
            "Clients",
            grid(&[&["Name", "Abbreviations"], &["ACME Holdings", "ACME"]]),
        );
        ids.data.invalidate_tab("reference", "Clients").unwrap();

        let id = ids.compute("Spring Expo", "Acme", 2024, None).await.unwrap();
        assert_eq!(id, "ACME Holdings 2024 Spring Expo");
    }
}
