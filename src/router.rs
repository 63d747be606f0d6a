//! # Response router
//!
//! Decides whether an answer is shown as a table or summarised in prose.

use crate::parser::RowSet;

/// How a result is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Table,
    Narrative,
}

/// True when the question explicitly asks for a table.
pub fn wants_table(question: &str) -> bool {
    let lower = question.to_lowercase();
    lower.contains("table") || lower.contains("tabular")
}

/// Pick the presentation for `question` given the parsed result, if any.
///
/// A parsed [`RowSet`] is shown as a table when asked for, or whenever it has rows.
/// Without one, the answer is always narrative.
pub fn route(question: &str, rows: Option<&RowSet>) -> Presentation {
    match rows {
        Some(rows) if wants_table(question) || !rows.is_empty() => Presentation::Table,
        _ => Presentation::Narrative,
    }
}
