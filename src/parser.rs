//! # Result parser
//!
//! Turns the raw textual rendering of a query result into a [`RowSet`].
//!
//! The database collaborator renders each result row on its own line as a
//! parenthesized tuple, e.g.
//!
//! ```text
//! (1, 'Cardiology')
//! (2, 'Neurology')
//! ```
//!
//! Parsing is deliberately forgiving:
//!
//! - Lines that are not shaped like a tuple are skipped without error.
//! - Fields are split on `", "` and stripped of surrounding quotes; values are kept as
//!   strings (no numeric coercion).
//! - `\n`, `\r` and `\\` inside a field are read back as newline, carriage return
//!   and backslash; see [`escape_field`].
//! - A result with no parseable rows yields `None`, which callers read as
//!   "no structured table available".
//!
//! ## Column names
//!
//! The rendering carries no column names, so columns are labelled by position:
//! `Column_1`, `Column_2`, … when the result has at most
//! [`ParseOptions::relabel_column_limit`] columns. Wider results keep bare zero-based
//! indices (`0`, `1`, …).
//!
//! ## Large results
//!
//! [`sample_large`] caps the row count: above [`ParseOptions::sample_threshold`] rows a
//! subsample of [`ParseOptions::sample_size`] rows is drawn with a fixed-seed RNG, so the
//! same input always yields the same rows. The caller receives a note describing
//! the reduction, which is forwarded to the user and to the summarizer prompt.
//!
//! ```
//! use drquery::parser::{parse, ParseOptions};
//!
//! let rows = parse("(1, 'Cardiology')\n(2, 'Neurology')", &ParseOptions::default()).unwrap();
//! assert_eq!(rows.columns(), ["Column_1", "Column_2"]);
//! assert_eq!(rows.rows()[1], ["2", "Neurology"]);
//! ```

use rand::{SeedableRng, rngs::StdRng, seq::index};
use tracing::{debug, info};

/// Knobs for labelling and sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub relabel_column_limit: usize,
    pub sample_threshold: usize,
    pub sample_size: usize,
    pub sample_seed: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            relabel_column_limit: 10,
            sample_threshold: 5000,
            sample_size: 2000,
            sample_seed: 42,
        }
    }
}

/// Parsed tabular result: rows × positionally named columns.
///
/// Every row has exactly `columns().len()` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RowSet {
    /// Build a row set, padding short rows with empty strings to the widest row.
    ///
    /// Rows come out ragged when a quoted value itself contains `", "`.
    pub fn from_rows(mut rows: Vec<Vec<String>>, relabel_column_limit: usize) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in rows.iter_mut() {
            row.resize(width, String::new());
        }

        let columns = if width <= relabel_column_limit {
            (1..=width).map(|i| format!("Column_{i}")).collect()
        } else {
            (0..width).map(|i| i.to_string()).collect()
        };

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render back into the tuple-per-line form the parser reads.
    pub fn to_raw(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                let fields: Vec<String> =
                    row.iter().map(|v| format!("'{}'", escape_field(v))).collect();
                format!("({})", fields.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of [`sample_large`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampled {
    pub rows: RowSet,
    /// Row count before sampling; equal to `rows.len()` when nothing was dropped.
    pub total_rows: usize,
    /// Markdown note for the user, empty when no sampling happened.
    pub note: String,
}

/// Escape a text value so it stays on one tuple line.
pub fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_field(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('\\') => unescaped.push('\\'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Parse one line as a tuple, or `None` if it is not shaped like one.
pub fn parse_line(line: &str) -> Option<Vec<String>> {
    let line = line.trim();
    let inner = line.strip_prefix('(')?.strip_suffix(')')?;

    Some(
        inner
            .split(", ")
            .map(|value| unescape_field(value.trim_matches(|c| c == '\'' || c == '"')))
            .collect(),
    )
}

/// Parse a raw result into a [`RowSet`].
///
/// Returns `None` when the input is empty or no line parses as a tuple.
pub fn parse(raw: &str, options: &ParseOptions) -> Option<RowSet> {
    if raw.trim().is_empty() {
        return None;
    }

    let mut skipped = 0usize;
    let rows: Vec<Vec<String>> = raw
        .lines()
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() && !line.trim().is_empty() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    if skipped > 0 {
        debug!("Skipped {} line(s) not shaped like a tuple", skipped);
    }

    if rows.is_empty() {
        return None;
    }

    Some(RowSet::from_rows(rows, options.relabel_column_limit))
}

/// Deterministically subsample a row set that exceeds the threshold.
///
/// Row order within the sample follows the original order.
pub fn sample_large(rows: RowSet, options: &ParseOptions) -> Sampled {
    let total_rows = rows.len();

    if total_rows <= options.sample_threshold || options.sample_size >= total_rows {
        return Sampled {
            rows,
            total_rows,
            note: String::new(),
        };
    }

    let mut rng = StdRng::seed_from_u64(options.sample_seed);
    let mut picked = index::sample(&mut rng, total_rows, options.sample_size).into_vec();
    picked.sort_unstable();

    let RowSet { columns, rows: all } = rows;
    let mut keep = vec![false; total_rows];
    for i in picked {
        keep[i] = true;
    }
    let sampled: Vec<Vec<String>> = all
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();

    info!(
        "Sampled {} of {} rows (seed {})",
        sampled.len(),
        total_rows,
        options.sample_seed
    );

    let note = format!(
        "\n\n*Note: Showing sample of {} rows from {} total rows for performance.*",
        sampled.len(),
        total_rows
    );

    Sampled {
        rows: RowSet {
            columns,
            rows: sampled,
        },
        total_rows,
        note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_rows(n: usize) -> String {
        (0..n)
            .map(|i| format!("({i}, 'patient_{i}')"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parse_two_rows() {
        let rows = parse("(1, 'Cardiology')\n(2, 'Neurology')", &ParseOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.columns(), ["Column_1", "Column_2"]);
        assert_eq!(rows.rows()[0], ["1", "Cardiology"]);
        assert_eq!(rows.rows()[1], ["2", "Neurology"]);
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert!(parse("", &ParseOptions::default()).is_none());
        assert!(parse("   \n  ", &ParseOptions::default()).is_none());
    }

    #[test]
    fn test_parse_without_tuples_is_none() {
        assert!(parse("[]\nno rows", &ParseOptions::default()).is_none());
    }

    #[test]
    fn test_single_row_parses() {
        let rows = parse("(42,)", &ParseOptions::default());
        // A trailing comma without a space stays inside the value.
        assert_eq!(rows.unwrap().rows()[0], ["42,"]);

        let rows = parse("(7)", &ParseOptions::default()).unwrap();
        assert_eq!(rows.rows(), [vec!["7".to_string()]]);
    }

    #[test]
    fn test_non_tuple_lines_are_dropped() {
        let raw = "header line\n(1, 'John', 'Smith')\n  \n(2, 'Jane', 'Doe')  \nfooter)\n(oops";
        let rows = parse(raw, &ParseOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows()[1], ["2", "Jane", "Doe"]);
    }

    #[test]
    fn test_double_quotes_are_stripped() {
        let rows = parse(r#"("O'Brien", 3)"#, &ParseOptions::default()).unwrap();
        assert_eq!(rows.rows()[0], ["O'Brien", "3"]);
    }

    #[test]
    fn test_escaped_line_breaks_are_restored() {
        let raw = "(1, 'Ward A\\nNorth wing')\n(2, 'C:\\\\beds')";
        let rows = parse(raw, &ParseOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows()[0], ["1", "Ward A\nNorth wing"]);
        assert_eq!(rows.rows()[1], ["2", "C:\\beds"]);
        assert_eq!(escape_field("a\r\nb"), r"a\r\nb");
    }

    #[test]
    fn test_round_trip_of_tuple_lines() {
        let original = vec![
            vec!["1".to_string(), "Alice".to_string(), "2024-01-05".to_string()],
            vec!["2".to_string(), "Bob".to_string(), "2024-02-11".to_string()],
            vec!["3".to_string(), "".to_string(), "NULL".to_string()],
        ];
        let set = RowSet::from_rows(original.clone(), 10);
        let reparsed = parse(&set.to_raw(), &ParseOptions::default()).unwrap();
        assert_eq!(reparsed.rows(), original.as_slice());
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let raw = "(1, 'Smith, John')\n(2, 'Doe')";
        let rows = parse(raw, &ParseOptions::default()).unwrap();
        assert_eq!(rows.columns().len(), 3);
        assert!(rows.rows().iter().all(|r| r.len() == 3));
        assert_eq!(rows.rows()[1], ["2", "Doe", ""]);
    }

    #[test]
    fn test_wide_results_keep_positional_labels() {
        let raw = format!(
            "({})",
            (0..12).map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
        );
        let rows = parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(rows.columns().first().map(String::as_str), Some("0"));
        assert_eq!(rows.columns().last().map(String::as_str), Some("11"));
    }

    #[test]
    fn test_ten_columns_are_relabelled() {
        let raw = format!(
            "({})",
            (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
        );
        let rows = parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(rows.columns()[9], "Column_10");
    }

    #[test]
    fn test_small_results_are_not_sampled() {
        let rows = parse(&numbered_rows(5000), &ParseOptions::default()).unwrap();
        let sampled = sample_large(rows.clone(), &ParseOptions::default());
        assert_eq!(sampled.rows, rows);
        assert_eq!(sampled.total_rows, 5000);
        assert!(sampled.note.is_empty());
    }

    #[test]
    fn test_large_results_are_sampled() {
        let rows = parse(&numbered_rows(6000), &ParseOptions::default()).unwrap();
        let sampled = sample_large(rows, &ParseOptions::default());
        assert_eq!(sampled.rows.len(), 2000);
        assert_eq!(sampled.total_rows, 6000);
        assert_eq!(sampled.rows.columns(), ["Column_1", "Column_2"]);
        assert!(
            sampled
                .note
                .contains("Showing sample of 2000 rows from 6000 total rows")
        );

        let ids: Vec<usize> = sampled
            .rows
            .rows()
            .iter()
            .map(|r| r[0].parse().unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "original order kept");
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let rows = parse(&numbered_rows(6000), &ParseOptions::default()).unwrap();
        let first = sample_large(rows.clone(), &ParseOptions::default());
        let second = sample_large(rows.clone(), &ParseOptions::default());
        assert_eq!(first, second);

        let other_seed = ParseOptions {
            sample_seed: 7,
            ..ParseOptions::default()
        };
        let third = sample_large(rows, &other_seed);
        assert_ne!(first.rows, third.rows);
    }
}
