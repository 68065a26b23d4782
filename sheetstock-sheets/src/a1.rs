//! A1 range notation (`Tab!A1:C10`, `Tab!A:C`, `'My Tab'!B2`, `Tab`).

use sheetstock_core::{Grid, SheetError};
use std::fmt;

/// One corner of a range. Either coordinate may be open: `A` is a whole
/// column, `5` a whole row. Both are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellRef {
    pub row: Option<usize>,
    pub col: Option<usize>,
}

impl CellRef {
    pub fn at(row: usize, col: usize) -> Self {
        Self {
            row: Some(row),
            col: Some(col),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.col {
            f.write_str(&column_letters(col))?;
        }
        if let Some(row) = self.row {
            write!(f, "{}", row + 1)?;
        }
        Ok(())
    }
}

/// A parsed range. `start`/`end` of `None` means the whole tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRef {
    pub tab: String,
    pub start: Option<CellRef>,
    pub end: Option<CellRef>,
}

impl RangeRef {
    pub fn whole_tab(tab: impl Into<String>) -> Self {
        Self {
            tab: tab.into(),
            start: None,
            end: None,
        }
    }

    pub fn cell(tab: impl Into<String>, row: usize, col: usize) -> Self {
        let corner = CellRef::at(row, col);
        Self {
            tab: tab.into(),
            start: Some(corner),
            end: Some(corner),
        }
    }

    /// Rows from `start_row` (zero-based) to the bottom, all columns.
    pub fn from_row(tab: impl Into<String>, start_row: usize) -> Self {
        Self {
            tab: tab.into(),
            start: Some(CellRef::at(start_row, 0)),
            end: Some(CellRef {
                row: None,
                col: Some(MAX_COLUMN),
            }),
        }
    }

    pub fn parse(text: &str) -> Result<Self, SheetError> {
        let invalid = |reason: &str| SheetError::InvalidRange {
            range: text.to_string(),
            reason: reason.to_string(),
        };

        let (tab, cells) = split_tab(text).ok_or_else(|| invalid("unterminated quoted tab name"))?;
        if tab.is_empty() {
            return Err(invalid("missing tab name"));
        }

        let Some(cells) = cells else {
            return Ok(Self::whole_tab(tab));
        };

        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (parse_cell(start), parse_cell(end)),
            None => {
                let corner = parse_cell(cells);
                (corner, corner)
            }
        };
        let start = start.ok_or_else(|| invalid("bad start cell"))?;
        let end = end.ok_or_else(|| invalid("bad end cell"))?;

        Ok(Self {
            tab,
            start: Some(start),
            end: Some(end),
        })
    }

    /// Cut this range out of a full tab grid. Cells beyond the data are
    /// omitted rather than padded, as the remote API does.
    pub fn slice(&self, grid: &Grid) -> Grid {
        let first_row = self.start.and_then(|c| c.row).unwrap_or(0);
        let last_row = self.end.and_then(|c| c.row).unwrap_or(usize::MAX);
        let first_col = self.start.and_then(|c| c.col).unwrap_or(0);
        let last_col = self.end.and_then(|c| c.col).unwrap_or(usize::MAX);

        grid.iter()
            .enumerate()
            .skip(first_row)
            .take_while(|(i, _)| *i <= last_row)
            .map(|(_, row)| {
                row.iter()
                    .enumerate()
                    .skip(first_col)
                    .take_while(|(j, _)| *j <= last_col)
                    .map(|(_, cell)| cell.clone())
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tab.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            f.write_str(&self.tab)?;
        } else {
            write!(f, "'{}'", self.tab.replace('\'', "''"))?;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) if start == end => write!(f, "!{start}"),
            (Some(start), Some(end)) => write!(f, "!{start}:{end}"),
            (Some(start), None) => write!(f, "!{start}"),
            _ => Ok(()),
        }
    }
}

/// Widest column the remote API accepts (`ZZZ`).
pub const MAX_COLUMN: usize = 18_277;

fn split_tab(text: &str) -> Option<(String, Option<&str>)> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('\'') {
        // Quoted name; '' escapes a quote.
        let mut tab = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    tab.push('\'');
                    chars.next();
                    continue;
                }
                let after = &rest[i + 1..];
                return match after.strip_prefix('!') {
                    Some(cells) => Some((tab, Some(cells))),
                    None if after.is_empty() => Some((tab, None)),
                    None => None,
                };
            }
            tab.push(c);
        }
        return None;
    }

    Some(match text.split_once('!') {
        Some((tab, cells)) => (tab.to_string(), Some(cells)),
        None => (text.to_string(), None),
    })
}

fn parse_cell(cell: &str) -> Option<CellRef> {
    let cell = cell.trim().replace('$', "");
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);

    if letters.is_empty() && digits.is_empty() {
        return None;
    }

    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let n: usize = digits.parse().ok()?;
        Some(n.checked_sub(1)?)
    };

    Some(CellRef { row, col })
}

/// `A` -> 0, `Z` -> 25, `AA` -> 26.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, c| {
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        acc.checked_mul(26)?
            .checked_add((c as u8 - b'A') as usize + 1)
    })
    .map(|n| n - 1)
}

/// Inverse of [`column_index`].
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_column_conversions() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("ZZZ"), Some(MAX_COLUMN));
        assert_eq!(column_index("A1"), None);
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(MAX_COLUMN), "ZZZ");
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(RangeRef::parse("CASE").unwrap(), RangeRef::whole_tab("CASE"));

        let r = RangeRef::parse("CASE!A2:C10").unwrap();
        assert_eq!(r.start, Some(CellRef::at(1, 0)));
        assert_eq!(r.end, Some(CellRef::at(9, 2)));

        let cols = RangeRef::parse("CASE!A:C").unwrap();
        assert_eq!(cols.start, Some(CellRef { row: None, col: Some(0) }));

        let quoted = RangeRef::parse("'Pack ''A'' List'!B2").unwrap();
        assert_eq!(quoted.tab, "Pack 'A' List");
        assert_eq!(quoted.start, quoted.end);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RangeRef::parse("'Unclosed!A1").is_err());
        assert!(RangeRef::parse("!A1").is_err());
        assert!(RangeRef::parse("CASE!A0").is_err());
        assert!(RangeRef::parse("CASE!:").is_err());
    }

    #[test]
    fn test_display_round_trips_common_forms() {
        for text in ["CASE", "CASE!A2:C10", "'Pack List'!B2", "CASE!A:C"] {
            assert_eq!(RangeRef::parse(text).unwrap().to_string(), text);
        }
        assert_eq!(RangeRef::cell("CASE", 4, 2).to_string(), "CASE!C5");
    }

    #[test]
    fn test_slice() {
        let g = grid(&[&["h1", "h2", "h3"], &["a", "b", "c"], &["d"]]);
        assert_eq!(RangeRef::whole_tab("T").slice(&g), g);
        assert_eq!(
            RangeRef::parse("T!B1:C2").unwrap().slice(&g),
            grid(&[&["h2", "h3"], &["b", "c"]])
        );
        assert_eq!(
            RangeRef::parse("T!A2:B").unwrap().slice(&g),
            grid(&[&["a", "b"], &["d"]])
        );
        assert_eq!(RangeRef::parse("T!B3").unwrap().slice(&g), grid(&[&[]]));
    }
}
