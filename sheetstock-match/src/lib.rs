//! Fuzzy matching of human-entered names against canonical tables.
//!
//! Distances are Damerau-Levenshtein with weighted substitutions: a slip to
//! a neighbouring QWERTY key, or a swap between visually similar characters,
//! costs less than an arbitrary substitution. The distance computation
//! aborts as soon as a row exceeds the caller's bound.

use serde::{Deserialize, Serialize};
use sheetstock_core::{ConfigError, MatchError};
use std::collections::HashMap;

/// Default maximum distance accepted as a match.
pub const DEFAULT_MAX_DISTANCE: f64 = 2.0;

/// Cost of substituting a keyboard neighbour or a confusable character.
pub const NEAR_MISS_COST: f64 = 0.7;

const EPSILON: f64 = 1e-9;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How an adjacent transposition across a gap is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranspositionCost {
    /// Classic Damerau formula: characters skipped on both sides plus one.
    #[default]
    Standard,
    /// Skipped characters count half.
    HalvedGap,
}

impl TranspositionCost {
    fn cost(self, gap_a: usize, gap_b: usize) -> f64 {
        let gap = (gap_a + gap_b) as f64;
        match self {
            TranspositionCost::Standard => gap + 1.0,
            TranspositionCost::HalvedGap => gap / 2.0 + 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Best distance must be strictly below this to count as a match.
    pub max_distance: f64,
    pub near_miss_cost: f64,
    pub transposition: TranspositionCost,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            near_miss_cost: NEAR_MISS_COST,
            transposition: TranspositionCost::Standard,
        }
    }
}

impl MatchConfig {
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_transposition(mut self, transposition: TranspositionCost) -> Self {
        self.transposition = transposition;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_distance.is_finite() || self.max_distance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "max_distance".to_string(),
                value: self.max_distance.to_string(),
                reason: "must be a positive, finite number".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.near_miss_cost) {
            return Err(ConfigError::InvalidValue {
                field: "near_miss_cost".to_string(),
                value: self.near_miss_cost.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// CHARACTER COSTS
// ============================================================================

const KEYBOARD_ROWS: [&str; 4] = ["1234567890", "QWERTYUIOP", "ASDFGHJKL", "ZXCVBNM"];

const CONFUSABLE_PAIRS: [(char, char); 9] = [
    ('O', '0'),
    ('L', '1'),
    ('I', 'L'),
    ('C', 'E'),
    ('G', 'Q'),
    ('U', 'V'),
    ('M', 'N'),
    (' ', '_'),
    (' ', '-'),
];

fn key_position(c: char) -> Option<(i32, i32)> {
    KEYBOARD_ROWS.iter().enumerate().find_map(|(row, keys)| {
        keys.chars()
            .position(|k| k == c)
            .map(|col| (row as i32, col as i32))
    })
}

/// Whether two keys touch on a staggered QWERTY layout.
pub fn keyboard_adjacent(a: char, b: char) -> bool {
    let (Some((ra, ca)), Some((rb, cb))) = (key_position(a), key_position(b)) else {
        return false;
    };
    match rb - ra {
        0 => (ca - cb).abs() == 1,
        1 => cb == ca - 1 || cb == ca,
        -1 => cb == ca || cb == ca + 1,
        _ => false,
    }
}

pub fn is_confusable(a: char, b: char) -> bool {
    CONFUSABLE_PAIRS
        .iter()
        .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
}

fn substitution_cost(a: char, b: char, near_miss: f64) -> f64 {
    if a == b {
        0.0
    } else if keyboard_adjacent(a, b) || is_confusable(a, b) {
        near_miss
    } else {
        1.0
    }
}

// ============================================================================
// DISTANCE
// ============================================================================

/// Trim, uppercase and strip `( ) . ' "`.
pub fn normalize(s: &str) -> String {
    s.trim()
        .to_uppercase()
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '.' | '\'' | '"'))
        .collect()
}

/// Weighted Damerau-Levenshtein distance between two normalized strings.
///
/// Returns `bound + 1.0` as soon as every cell of a row exceeds `bound`.
pub fn distance(a: &str, b: &str, bound: f64, config: &MatchConfig) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    let too_far = bound + 1.0;

    if m == 0 || n == 0 {
        let d = (m + n) as f64;
        return if d > bound { too_far } else { d };
    }

    // Row/column 0 hold a sentinel larger than any real distance.
    let sentinel = (m + n) as f64 + 1.0;
    let width = n + 2;
    let mut h = vec![sentinel; (m + 2) * width];
    let at = |i: usize, j: usize| i * width + j;

    for i in 0..=m {
        h[at(i + 1, 1)] = i as f64;
    }
    for j in 0..=n {
        h[at(1, j + 1)] = j as f64;
    }

    let mut last_row: HashMap<char, usize> = HashMap::new();

    for i in 1..=m {
        let mut last_match_col = 0;
        let mut row_min = h[at(i + 1, 1)];

        for j in 1..=n {
            let k = last_row.get(&b[j - 1]).copied().unwrap_or(0);
            let l = last_match_col;
            let cost = substitution_cost(a[i - 1], b[j - 1], config.near_miss_cost);
            if a[i - 1] == b[j - 1] {
                last_match_col = j;
            }

            let substitution = h[at(i, j)] + cost;
            let insertion = h[at(i + 1, j)] + 1.0;
            let deletion = h[at(i, j + 1)] + 1.0;
            let transposition =
                h[at(k, l)] + config.transposition.cost(i - k - 1, j - l - 1);

            let value = substitution.min(insertion).min(deletion).min(transposition);
            h[at(i + 1, j + 1)] = value;
            row_min = row_min.min(value);
        }

        last_row.insert(a[i - 1], i);

        if row_min > bound + EPSILON {
            return too_far;
        }
    }

    let d = h[at(m + 1, n + 1)];
    if d > bound + EPSILON {
        too_far
    } else {
        d
    }
}

// ============================================================================
// MATCHING
// ============================================================================

/// A successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// The original candidate string, never an abbreviation.
    pub candidate: String,
    pub distance: f64,
}

struct PoolEntry<'a> {
    normalized: String,
    candidate: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatchConfig,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Find the single closest candidate to `input`.
    ///
    /// `abbreviations[i]` is a comma-separated list of labels for
    /// `candidates[i]`; a hit on a label returns the candidate itself.
    /// Fails with [`MatchError::NoMatch`] if nothing is strictly closer than
    /// `max_distance`, and with [`MatchError::Ambiguous`] if several distinct
    /// candidates share the best distance.
    pub fn find<C, A>(
        &self,
        input: &str,
        candidates: &[C],
        abbreviations: Option<&[A]>,
    ) -> Result<Match, MatchError>
    where
        C: AsRef<str>,
        A: AsRef<str>,
    {
        let needle = normalize(input);
        let pool = build_pool(&needle, candidates, abbreviations);
        let max = self.config.max_distance;
        let needle_len = needle.chars().count();

        let mut best = f64::INFINITY;
        let mut tied: Vec<&str> = Vec::new();

        for entry in &pool {
            let bound = best.min(max);
            let len_diff = needle_len.abs_diff(entry.normalized.chars().count()) as f64;
            if len_diff > bound {
                continue;
            }

            let d = distance(&needle, &entry.normalized, bound, &self.config);
            if d > bound + EPSILON {
                continue;
            }
            if d == 0.0 {
                return Ok(Match {
                    candidate: entry.candidate.to_string(),
                    distance: 0.0,
                });
            }

            if d < best - EPSILON {
                best = d;
                tied.clear();
                tied.push(entry.candidate);
            } else if (d - best).abs() <= EPSILON && !tied.contains(&entry.candidate) {
                tied.push(entry.candidate);
            }
        }

        if best >= max || tied.is_empty() {
            return Err(MatchError::NoMatch {
                input: input.to_string(),
                best_distance: best.is_finite().then_some(best),
            });
        }

        if tied.len() > 1 {
            tracing::debug!(input, distance = best, candidates = ?tied, "Ambiguous fuzzy match");
            return Err(MatchError::Ambiguous {
                input: input.to_string(),
                distance: best,
                candidates: tied.into_iter().map(str::to_string).collect(),
            });
        }

        Ok(Match {
            candidate: tied[0].to_string(),
            distance: best,
        })
    }
}

fn build_pool<'a, C, A>(
    needle: &str,
    candidates: &'a [C],
    abbreviations: Option<&[A]>,
) -> Vec<PoolEntry<'a>>
where
    C: AsRef<str>,
    A: AsRef<str>,
{
    let mut pool = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let candidate = candidate.as_ref();
        if candidate.trim().is_empty() {
            continue;
        }
        pool.push(PoolEntry {
            normalized: normalize(candidate),
            candidate,
        });

        let labels = abbreviations.and_then(|abbrevs| abbrevs.get(i));
        for label in labels.into_iter().flat_map(|l| l.as_ref().split(',')) {
            let normalized = normalize(label);
            if !normalized.is_empty() {
                pool.push(PoolEntry {
                    normalized,
                    candidate,
                });
            }
        }
    }

    if let Some(first) = needle.chars().next() {
        // Stable: same-initial entries first, relative order kept.
        pool.sort_by_key(|entry| !entry.normalized.starts_with(first));
    }
    pool
}

/// Match with the default configuration and the given threshold.
pub fn best_match<C, A>(
    input: &str,
    candidates: &[C],
    abbreviations: Option<&[A]>,
    max_distance: f64,
) -> Result<String, MatchError>
where
    C: AsRef<str>,
    A: AsRef<str>,
{
    Matcher::new(MatchConfig::default().with_max_distance(max_distance))
        .find(input, candidates, abbreviations)
        .map(|m| m.candidate)
}

// ============================================================================
// CANONICAL TABLES
// ============================================================================

/// A canonical name and its comma-separated abbreviations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalName {
    pub name: String,
    pub abbreviations: String,
}

/// Ordered list of canonical names for one domain (clients, shows).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTable {
    rows: Vec<CanonicalName>,
}

impl CanonicalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<I, N, A>(rows: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|(name, abbreviations)| CanonicalName {
                    name: name.into(),
                    abbreviations: abbreviations.into(),
                })
                .collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, abbreviations: impl Into<String>) {
        self.rows.push(CanonicalName {
            name: name.into(),
            abbreviations: abbreviations.into(),
        });
    }

    pub fn rows(&self) -> &[CanonicalName] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn best_match(&self, input: &str, matcher: &Matcher) -> Result<Match, MatchError> {
        let names: Vec<&str> = self.rows.iter().map(|r| r.name.as_str()).collect();
        let abbreviations: Vec<&str> = self.rows.iter().map(|r| r.abbreviations.as_str()).collect();
        matcher.find(input, &names, Some(abbreviations.as_slice()))
    }
}
