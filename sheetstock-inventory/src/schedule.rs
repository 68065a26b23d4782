//! Production schedule rows and their ship/return windows.

use crate::inventory::column_of;
use crate::sheet_data::SheetData;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sheetstock_core::{Grid, Namespace, SheetError, SheetLayout, StockResult, TrackingId};
use std::sync::Arc;

/// Days added around set start/end when a row has no ship or return date.
pub const SET_PADDING_DAYS: i64 = 10;

const ROWS_KEY: &str = "rows";

/// Header names of the schedule columns. Matched ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleColumns {
    pub show: String,
    pub client: String,
    pub year: String,
    pub ship: String,
    pub return_date: String,
    pub set_start: String,
    pub set_end: String,
}

impl Default for ScheduleColumns {
    fn default() -> Self {
        Self {
            show: "Show".to_string(),
            client: "Client".to_string(),
            year: "Year".to_string(),
            ship: "Ship".to_string(),
            return_date: "Return".to_string(),
            set_start: "Set Start".to_string(),
            set_end: "Set End".to_string(),
        }
    }
}

/// Inclusive date range during which a show's equipment is out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub ship: NaiveDate,
    pub ret: NaiveDate,
}

impl DateWindow {
    pub fn overlaps(&self, other: &DateWindow) -> bool {
        self.ret >= other.ship && self.ship <= other.ret
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub show: String,
    pub client: String,
    pub year: Option<i32>,
    /// `None` when neither ship/return nor set dates give both ends.
    pub window: Option<DateWindow>,
}

impl ScheduleRow {
    pub fn overlaps(&self, other: &ScheduleRow) -> bool {
        match (&self.window, &other.window) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    }

    fn is_show(&self, show: &str, year: i32) -> bool {
        self.year == Some(year) && self.show.trim().eq_ignore_ascii_case(show.trim())
    }
}

// ============================================================================
// DATE PARSING
// ============================================================================

/// A date cell: month and day, with the year if the cell carried one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDate {
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
}

impl PartialDate {
    /// Accepts `YYYY-MM-DD`, `M/D`, `M/D/YY` and `M/D/YYYY`.
    pub fn parse(value: &str) -> Result<Self, SheetError> {
        let invalid = |reason: &str| SheetError::InvalidDate {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = value.trim();

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self {
                year: Some(date.year()),
                month: date.month(),
                day: date.day(),
            });
        }

        let parts: Vec<&str> = trimmed.split('/').map(str::trim).collect();
        let number = |s: &str| s.parse::<u32>().map_err(|_| invalid("not a number"));
        let (month, day, year) = match parts.as_slice() {
            [m, d] => (number(*m)?, number(*d)?, None),
            [m, d, y] => {
                let y = number(*y)? as i32;
                (number(*m)?, number(*d)?, Some(if y < 100 { 2000 + y } else { y }))
            }
            _ => return Err(invalid("expected M/D, M/D/Y or YYYY-MM-DD")),
        };

        // Validate against a leap year so 2/29 is accepted without a year.
        if NaiveDate::from_ymd_opt(year.unwrap_or(2000), month, day).is_none() {
            return Err(invalid("no such day"));
        }
        Ok(Self { year, month, day })
    }

    /// This month/day in `year`. Feb 29 falls back to Feb 28 off leap years.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .or_else(|| NaiveDate::from_ymd_opt(year, self.month, self.day.saturating_sub(1)))
    }
}

/// Build a row's ship/return window.
///
/// Ship falls back to set start minus the padding and return to set end
/// plus the padding. Every date is placed in `year`; if the return then
/// lands on or before the ship date it moves to the following year.
pub fn compute_window(
    year: i32,
    ship: Option<PartialDate>,
    ret: Option<PartialDate>,
    set_start: Option<PartialDate>,
    set_end: Option<PartialDate>,
) -> Option<DateWindow> {
    let padding = Duration::days(SET_PADDING_DAYS);
    let ship = match ship {
        Some(date) => date.in_year(year)?,
        None => set_start?.in_year(year)? - padding,
    };
    let mut ret = match ret {
        Some(date) => date.in_year(year)?,
        None => set_end?.in_year(year)? + padding,
    };
    if ret <= ship {
        ret = ret.with_year(ret.year() + 1).or_else(|| ret.checked_add_signed(Duration::days(365)))?;
    }
    Some(DateWindow { ship, ret })
}

/// Parse schedule rows. Unreadable dates are logged and treated as blank.
pub fn parse_rows(grid: &Grid, columns: &ScheduleColumns) -> Result<Vec<ScheduleRow>, SheetError> {
    let Some(header) = grid.first() else {
        return Ok(Vec::new());
    };
    let col = |name: &str| column_of(header, name);
    let show_col = col(&columns.show).ok_or_else(|| SheetError::ColumnNotFound {
        tab: "schedule".to_string(),
        column: columns.show.clone(),
    })?;
    let (client_col, year_col) = (col(&columns.client), col(&columns.year));
    let date_cols = [
        col(&columns.ship),
        col(&columns.return_date),
        col(&columns.set_start),
        col(&columns.set_end),
    ];

    let cell = |row: &Vec<String>, idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i)).map(|c| c.trim().to_string()).unwrap_or_default()
    };

    let mut rows = Vec::new();
    for row in grid.iter().skip(1) {
        let show = cell(row, Some(show_col));
        if show.is_empty() {
            continue;
        }

        let dates: Vec<Option<PartialDate>> = date_cols
            .iter()
            .map(|idx| {
                let value = cell(row, *idx);
                if value.is_empty() {
                    return None;
                }
                match PartialDate::parse(&value) {
                    Ok(date) => Some(date),
                    Err(e) => {
                        tracing::warn!(show = %show, error = %e, "Ignoring schedule date");
                        None
                    }
                }
            })
            .collect();

        let year = cell(row, year_col)
            .parse::<i32>()
            .ok()
            .or_else(|| dates.iter().flatten().find_map(|d| d.year));
        let window = year.and_then(|y| compute_window(y, dates[0], dates[1], dates[2], dates[3]));

        rows.push(ScheduleRow {
            show,
            client: cell(row, client_col),
            year,
            window,
        });
    }
    Ok(rows)
}

/// Rows other than `target` whose windows overlap it.
pub fn find_overlaps<'a>(rows: &'a [ScheduleRow], target: &ScheduleRow) -> Vec<&'a ScheduleRow> {
    rows.iter()
        .filter(|row| *row != target && row.overlaps(target))
        .collect()
}

// ============================================================================
// ACCESSOR
// ============================================================================

/// The production schedule tab, parsed and cached.
#[derive(Debug)]
pub struct ProductionSchedule {
    data: Arc<SheetData>,
    layout: SheetLayout,
    columns: ScheduleColumns,
}

impl ProductionSchedule {
    pub fn new(data: Arc<SheetData>, layout: SheetLayout) -> Self {
        Self {
            data,
            layout,
            columns: ScheduleColumns::default(),
        }
    }

    pub fn with_columns(mut self, columns: ScheduleColumns) -> Self {
        self.columns = columns;
        self
    }

    pub async fn rows(&self, tracking: Option<&TrackingId>) -> StockResult<Vec<ScheduleRow>> {
        let cache = self.data.cache();
        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());
        if let Some(hit) = cache.get::<Vec<ScheduleRow>>(Namespace::ProdSchedule, ROWS_KEY, id)? {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let grid = self
            .data
            .tab(&self.layout.schedule_table, &self.layout.schedule_tab, id)
            .await?;
        let rows = parse_rows(&grid, &self.columns)?;
        cache.set(
            Namespace::ProdSchedule,
            ROWS_KEY,
            &rows,
            self.data.ttl(Namespace::ProdSchedule),
            &[],
            id,
        )?;
        scope.finish()?;
        Ok(rows)
    }

    /// Shows whose windows overlap `show` in `year`. Empty when the show is
    /// not scheduled or has no usable window.
    pub async fn overlapping(
        &self,
        show: &str,
        year: i32,
        tracking: Option<&TrackingId>,
    ) -> StockResult<Vec<ScheduleRow>> {
        let key = format!("overlap:{}:{year}", show.trim().to_ascii_uppercase());
        let cache = self.data.cache();
        let scope = cache.track_child(tracking)?;
        let id = Some(scope.id());
        if let Some(hit) = cache.get::<Vec<ScheduleRow>>(Namespace::ProdSchedule, &key, id)? {
            scope.finish()?;
            return Ok(hit.into_value());
        }

        let rows = self.rows(id).await?;
        let overlapping: Vec<ScheduleRow> = match rows.iter().find(|r| r.is_show(show, year)) {
            Some(target) => find_overlaps(&rows, target).into_iter().cloned().collect(),
            None => Vec::new(),
        };
        cache.set(
            Namespace::ProdSchedule,
            &key,
            &overlapping,
            self.data.ttl(Namespace::ProdSchedule),
            &[],
            id,
        )?;
        scope.finish()?;
        Ok(overlapping)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_partial() -> impl Strategy<Value = PartialDate> {
        (1u32..=12, 1u32..=28).prop_map(|(month, day)| PartialDate { year: None, month, day })
    }

    fn arb_window() -> impl Strategy<Value = DateWindow> {
        (0i64..700, 0i64..60).prop_map(|(start, len)| {
            let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            DateWindow {
                ship: base + Duration::days(start),
                ret: base + Duration::days(start + len),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_return_always_after_ship(
            year in 2000i32..2100,
            ship in arb_partial(),
            ret in arb_partial(),
        ) {
            let window = compute_window(year, Some(ship), Some(ret), None, None).unwrap();
            prop_assert!(window.ret > window.ship);
            prop_assert_eq!(window.ship.year(), year);
        }

        #[test]
        fn prop_overlap_is_symmetric(a in arb_window(), b in arb_window()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
            prop_assert!(a.overlaps(&a));
        }
    }
}
