//! # Static query analysis
//!
//! Cheap, text-only heuristics about a SQL statement: a conservative rewrite
//! ([`optimize`]), a list of likely problems ([`analyze_complexity`]), a rough cost
//! score ([`estimate_performance`]) and a rating for a measured run time
//! ([`rate_execution`]).
//!
//! Nothing here talks to the database. All matching is case-insensitive and purely
//! lexical, so string literals and identifiers can trigger the checks too.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, time::Duration};

#[allow(clippy::expect_used)]
static JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bjoin\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static OR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bor\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bon\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static INNER_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\binner\s+join\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static LEADING_WILDCARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"like\s+['"]%"#).expect("valid regex"));
#[allow(clippy::expect_used)]
static DOUBLE_WILDCARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"like\s+['"]%.*%['"]"#).expect("valid regex"));
#[allow(clippy::expect_used)]
static FUNCTION_IN_WHERE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"where.*\b(upper|lower|substring|concat)\s*\(").expect("valid regex")
});

const AGGREGATE_MARKERS: [&str; 6] = ["count(", "sum(", "avg(", "max(", "min(", "group by"];

/// General advice shown next to every analysis.
pub const PERFORMANCE_TIPS: [&str; 5] = [
    "Use specific column names instead of SELECT *",
    "Add appropriate LIMIT clauses",
    "Ensure JOIN conditions use indexed columns",
    "Consider adding WHERE clauses to filter data early",
    "Use EXPLAIN to analyze query execution plan",
];

/// Cap unbounded row sets at 1000 rows and normalise `INNER JOIN` to `JOIN`.
///
/// Statements that already mention `limit`, or that aggregate, are left unlimited.
pub fn optimize(sql: &str) -> String {
    let trimmed = sql.trim();
    let lower = trimmed.to_lowercase();

    let limited = if lower.contains("limit") || AGGREGATE_MARKERS.iter().any(|m| lower.contains(m))
    {
        trimmed.to_string()
    } else if let Some(body) = trimmed.strip_suffix(';') {
        format!("{} LIMIT 1000;", body.trim_end())
    } else {
        format!("{trimmed} LIMIT 1000")
    };

    INNER_JOIN.replace_all(&limited, "JOIN").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexityReport {
    pub complexity: Complexity,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

fn subquery_count(lower: &str) -> usize {
    lower.matches("select").count().saturating_sub(1)
}

/// List the likely problems with a statement.
pub fn analyze_complexity(sql: &str) -> ComplexityReport {
    let lower = sql.to_lowercase();
    let mut report = ComplexityReport {
        complexity: Complexity::Low,
        issues: Vec::new(),
        suggestions: Vec::new(),
    };

    if lower.contains("select *") {
        report
            .issues
            .push("Using SELECT * - consider selecting only needed columns".to_string());
        report.complexity = Complexity::Medium;
    }

    if !lower.contains("limit") && !lower.contains("count(") && !lower.contains("group by") {
        report
            .issues
            .push("No LIMIT clause - may return large result set".to_string());
        report
            .suggestions
            .push("Add LIMIT clause to control result size".to_string());
    }

    let joins = JOIN.find_iter(&lower).count();
    if joins > 3 {
        report.complexity = Complexity::High;
        report
            .issues
            .push(format!("Multiple JOINs ({joins}) may impact performance"));
        report
            .suggestions
            .push("Consider breaking into smaller queries or adding indexes".to_string());
    }

    if sql.contains('(') {
        let subqueries = subquery_count(&lower);
        if subqueries > 0 {
            report.complexity = if subqueries == 1 {
                Complexity::Medium
            } else {
                Complexity::High
            };
            report
                .issues
                .push(format!("Contains {subqueries} subquery(ies)"));
        }
    }

    if LEADING_WILDCARD.is_match(&lower) {
        report
            .issues
            .push("LIKE with leading wildcard - may be slow on large tables".to_string());
        report
            .suggestions
            .push("Consider full-text search or alternative approaches".to_string());
    }

    let ors = OR.find_iter(&lower).count();
    if ors > 2 {
        report
            .issues
            .push(format!("Multiple OR conditions ({ors}) may impact performance"));
        report
            .suggestions
            .push("Consider using IN clause or UNION instead".to_string());
    }

    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceTier {
    Fast,
    Medium,
    Slow,
    VerySlow,
}

impl PerformanceTier {
    fn from_score(score: u8) -> Self {
        match score {
            0..=2 => PerformanceTier::Fast,
            3..=5 => PerformanceTier::Medium,
            6..=8 => PerformanceTier::Slow,
            _ => PerformanceTier::VerySlow,
        }
    }

    pub fn estimated_time(&self) -> &'static str {
        match self {
            PerformanceTier::Fast => "Fast (< 1 second)",
            PerformanceTier::Medium => "Medium (1-5 seconds)",
            PerformanceTier::Slow => "Slow (5-30 seconds)",
            PerformanceTier::VerySlow => "Very Slow (> 30 seconds)",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            PerformanceTier::Fast => "Query should execute quickly",
            PerformanceTier::Medium => "Query may take a few seconds to complete",
            PerformanceTier::Slow => {
                "Query may take some time to complete. Consider optimization."
            }
            PerformanceTier::VerySlow => {
                "Query may be very slow. Strong recommendation to optimize."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceEstimate {
    /// 0 to 10.
    pub complexity_score: u8,
    pub tier: PerformanceTier,
    pub warning: bool,
    pub message: String,
    pub killers: Vec<String>,
}

/// Weighted complexity score, truncated and clamped to `0..=10`.
pub fn complexity_score(sql: &str) -> u8 {
    let lower = sql.to_lowercase();
    let statement = lower.trim_start();
    let mut score = 0.0_f64;

    if statement.starts_with("select") {
        score += 1.0;
    } else if ["insert", "update", "delete"].iter().any(|k| statement.starts_with(k)) {
        score += 2.0;
    } else if ["create", "alter", "drop"].iter().any(|k| statement.starts_with(k)) {
        score += 3.0;
    }

    score += JOIN.find_iter(&lower).count() as f64 * 1.5;
    score += subquery_count(&lower) as f64 * 2.0;

    if lower.contains("group by") {
        score += 1.0;
    }
    if lower.contains("order by") {
        score += 0.5;
    }
    if lower.contains("distinct") {
        score += 1.0;
    }

    if DOUBLE_WILDCARD.is_match(&lower) {
        score += 2.0;
    } else if LEADING_WILDCARD.is_match(&lower) {
        score += 1.5;
    }

    score += OR.find_iter(&lower).count() as f64 * 0.5;

    if FUNCTION_IN_WHERE.is_match(&lower) {
        score += 1.0;
    }
    if !lower.contains("limit") && !lower.contains("count(") {
        score += 1.0;
    }

    score.clamp(0.0, 10.0) as u8
}

/// Patterns that are slow regardless of the overall score.
pub fn performance_killers(sql: &str) -> Vec<String> {
    let lower = sql.to_lowercase();
    let mut killers = Vec::new();

    if lower.contains("select *") {
        killers.push("SELECT * usage".to_string());
    }
    if LEADING_WILDCARD.is_match(&lower) {
        killers.push("LIKE with leading wildcard".to_string());
    }
    if lower.contains("from")
        && !lower.contains("where")
        && !lower.contains("limit")
        && !lower.contains("count(")
    {
        killers.push("No filtering conditions".to_string());
    }
    if FUNCTION_IN_WHERE.is_match(&lower) {
        killers.push("Functions in WHERE clause".to_string());
    }
    let ors = OR.find_iter(&lower).count();
    if ors > 3 {
        killers.push(format!("Many OR conditions ({ors})"));
    }
    if JOIN.is_match(&lower) && !ON.is_match(&lower) {
        killers.push("Potential cartesian product".to_string());
    }

    killers
}

/// Estimate how expensive a statement is likely to be.
pub fn estimate_performance(sql: &str) -> PerformanceEstimate {
    let complexity_score = complexity_score(sql);
    let tier = PerformanceTier::from_score(complexity_score);
    let killers = performance_killers(sql);

    let mut message = tier.message().to_string();
    if !killers.is_empty() {
        message.push_str(&format!(" Issues detected: {}", killers.join(", ")));
    }

    PerformanceEstimate {
        complexity_score,
        warning: matches!(tier, PerformanceTier::Slow | PerformanceTier::VerySlow)
            || !killers.is_empty(),
        tier,
        message,
        killers,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceRating {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl fmt::Display for PerformanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PerformanceRating::Excellent => "excellent",
            PerformanceRating::Good => "good",
            PerformanceRating::Fair => "fair",
            PerformanceRating::Poor => "poor",
            PerformanceRating::VeryPoor => "very_poor",
        })
    }
}

/// Rate a measured execution time.
pub fn rate_execution(elapsed: Duration) -> PerformanceRating {
    let secs = elapsed.as_secs_f64();
    if secs < 1.0 {
        PerformanceRating::Excellent
    } else if secs < 3.0 {
        PerformanceRating::Good
    } else if secs < 10.0 {
        PerformanceRating::Fair
    } else if secs < 30.0 {
        PerformanceRating::Poor
    } else {
        PerformanceRating::VeryPoor
    }
}

/// Everything `drq analyze` prints for one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecommendations {
    pub original: String,
    pub optimized: String,
    pub complexity: ComplexityReport,
    pub performance: PerformanceEstimate,
}

pub fn recommend(sql: &str) -> QueryRecommendations {
    QueryRecommendations {
        original: sql.to_string(),
        optimized: optimize(sql),
        complexity: analyze_complexity(sql),
        performance: estimate_performance(sql),
    }
}
