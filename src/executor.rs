//! # Query executor
//!
//! Runs a sanitized statement with at most one repair-and-retry.
//!
//! ```text
//! attempt 1 ── ok ──────────────────────────────▶ done
//!     │
//!     └─ error mentions a rewrite rule's marker ─▶ sanitize again ─▶ attempt 2 ── ok ─▶ done
//!     │                                                                 │
//!     └─ any other error ─▶ fail                                        └─ error ─▶ fail (first error)
//! ```
//!
//! A failed retry reports the *first* attempt's error.

use crate::{
    analysis::rate_execution,
    database::Database,
    error::QueryExecutionError,
    sanitizer::Sanitizer,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A statement that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// The statement that produced `raw`.
    pub sql: String,
    /// Rows rendered one tuple per line.
    pub raw: String,
    /// 1, or 2 when the retry path was taken.
    pub attempts: u8,
    pub elapsed: Duration,
}

/// Leading keyword of a statement, uppercased.
fn leading_keyword(sql: &str) -> String {
    sql.trim_start()
        .trim_start_matches('(')
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .find(|word| !word.is_empty())
        .unwrap_or_default()
        .to_uppercase()
}

/// Reject statements whose leading keyword is not in `allowed`.
///
/// `None` allows everything.
pub fn check_statement(sql: &str, allowed: Option<&[String]>) -> Result<(), QueryExecutionError> {
    let Some(allowed) = allowed else {
        return Ok(());
    };

    let keyword = leading_keyword(sql);
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&keyword)) {
        Ok(())
    } else {
        warn!("Refusing {} statement", keyword);
        Err(QueryExecutionError::new(format!(
            "{} statements are not allowed (allowed: {})",
            if keyword.is_empty() { "empty" } else { keyword.as_str() },
            allowed.join(", ")
        )))
    }
}

/// Run `sql` against `db`, retrying once when the error points at a known rewrite.
///
/// # Errors
/// [`QueryExecutionError`] when the statement is refused by `allowed`, or when the
/// database rejects it (after the retry, if one was made).
pub async fn execute(
    db: &dyn Database,
    sanitizer: &Sanitizer,
    sql: &str,
    allowed: Option<&[String]>,
) -> Result<Execution, QueryExecutionError> {
    check_statement(sql, allowed)?;

    let started = Instant::now();
    let (sql, raw, attempts) = match db.run(sql).await {
        Ok(raw) => (sql.to_string(), raw, 1),
        Err(first) => {
            let message = first.to_string();
            if !sanitizer.should_retry(&message) {
                return Err(QueryExecutionError::new(message));
            }

            let repaired = sanitizer.sanitize(sql);
            warn!("Retrying after: {}", message);
            debug!("Repaired statement: {}", repaired);

            match db.run(&repaired).await {
                Ok(raw) => (repaired, raw, 2),
                Err(second) => {
                    debug!("Retry failed too: {}", second);
                    return Err(QueryExecutionError::new(message));
                }
            }
        }
    };

    let elapsed = started.elapsed();
    info!(
        "Query finished in {:.3}s after {} attempt(s), rated {}",
        elapsed.as_secs_f64(),
        attempts,
        rate_execution(elapsed)
    );

    Ok(Execution {
        sql,
        raw,
        attempts,
        elapsed,
    })
}
