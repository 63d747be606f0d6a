//! # SQL sanitizer
//!
//! Deterministic textual corrections for mistakes the generator is known to make.
//!
//! The sanitizer is an ordered list of [`RewriteRule`]s, each a regex pattern and a
//! replacement. Rules are applied in order, and the result must be stable under
//! re-application: [`Sanitizer::sanitize`] runs once before execution and again on
//! the executor's retry path.
//!
//! The default rules target the department alias defect of the hospital schema
//! prompt: the model is told to alias `departments` as `de` but keeps writing
//! `d.department_name`, where `d` is the `doctors` alias. These rules are a
//! workaround for the prompt and should shrink as the prompt improves.
//!
//! Renaming the `departments d` declaration to `de` is guarded: it only fires when
//! `d.department_name` was rewritten in the same pass and no other `d.` reference is
//! left, so correct SQL that aliases `departments` as `d` passes through untouched.
//!
//! Rewrites are purely textual. A string literal that happens to contain
//! `d.department_name` is rewritten too. Replacements use the `regex` crate's
//! `$1` / `${name}` expansion syntax.
//!
//! ```
//! use drquery::sanitizer::Sanitizer;
//!
//! let sanitizer = Sanitizer::default();
//! assert_eq!(
//!     sanitizer.sanitize("SELECT d.department_name FROM departments d;"),
//!     "SELECT de.department_name FROM departments de;"
//! );
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Decides whether a rule may fire, given the statement as it entered
/// [`Sanitizer::sanitize`] and the statement as the earlier rules left it.
pub type RewriteGuard = fn(original: &str, current: &str) -> bool;

/// One pattern → replacement correction.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub name: String,
    pattern: Regex,
    replacement: String,
    /// Substring of a database error message that means this rule's defect slipped through.
    retry_marker: Option<String>,
    guard: Option<RewriteGuard>,
}

impl RewriteRule {
    /// Compile a rule.
    ///
    /// # Errors
    /// Returns the regex error if `pattern` does not compile.
    pub fn new(
        name: &str,
        pattern: &str,
        replacement: &str,
        retry_marker: Option<&str>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
            retry_marker: retry_marker.map(str::to_string),
            guard: None,
        })
    }

    /// Only fire when `guard` holds.
    pub fn with_guard(mut self, guard: RewriteGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn retry_marker(&self) -> Option<&str> {
        self.retry_marker.as_deref()
    }

    /// Apply this rule once, ignoring any guard.
    pub fn apply<'s>(&self, sql: &'s str) -> Cow<'s, str> {
        self.pattern.replace_all(sql, self.replacement.as_str())
    }

    /// Does a second application leave `sample` as the first one left it?
    pub fn is_stable_on(&self, sample: &str) -> bool {
        let once = self.apply(sample);
        self.apply(&once) == once
    }

    /// Stability on the rule's own output: its replacement text and retry marker.
    pub fn is_idempotent(&self) -> bool {
        std::iter::once(self.replacement.as_str())
            .chain(self.retry_marker())
            .all(|sample| self.is_stable_on(sample))
    }

    fn permits(&self, original: &str, current: &str) -> bool {
        self.guard.is_none_or(|guard| guard(original, current))
    }
}

/// Ordered collection of rewrite rules.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Vec<RewriteRule>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Sanitizer {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Apply every rule in order.
    pub fn sanitize(&self, sql: &str) -> String {
        let mut current = sql.to_string();
        for rule in &self.rules {
            if !rule.permits(sql, &current) {
                continue;
            }
            let rewritten = rule.apply(&current);
            if let Cow::Owned(rewritten) = rewritten {
                debug!("Rewrite rule '{}' applied", rule.name);
                current = rewritten;
            }
        }
        current
    }

    /// Does a database error message point at a defect one of the rules repairs?
    pub fn should_retry(&self, error_message: &str) -> bool {
        self.rules
            .iter()
            .filter_map(RewriteRule::retry_marker)
            .any(|marker| error_message.contains(marker))
    }
}

#[allow(clippy::expect_used)]
static DEPARTMENT_NAME_VIA_D: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bd\.department_name\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static ANY_D_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bd\.\w").expect("valid regex"));

/// `d` only becomes `de` once `d.department_name` was its sole use.
fn department_alias_was_rewritten(original: &str, current: &str) -> bool {
    DEPARTMENT_NAME_VIA_D.is_match(original) && !ANY_D_REFERENCE.is_match(current)
}

/// The department alias corrections.
#[allow(clippy::expect_used)]
fn default_rules() -> Vec<RewriteRule> {
    vec![
        RewriteRule::new(
            "department-alias",
            r"\bd\.department_name\b",
            "de.department_name",
            Some("d.department_name"),
        )
        .expect("built-in rewrite pattern compiles"),
        RewriteRule::new(
            "department-table-alias",
            r"\b(departments\s+(?:AS\s+)?)d\b",
            "${1}de",
            None,
        )
        .expect("built-in rewrite pattern compiles")
        .with_guard(department_alias_was_rewritten),
        RewriteRule::new(
            "group-concat-department-alias",
            r"GROUP_CONCAT\(DISTINCT d\.department_name",
            "GROUP_CONCAT(DISTINCT de.department_name",
            None,
        )
        .expect("built-in rewrite pattern compiles"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_table_listing_is_rewritten() {
        let sanitizer = Sanitizer::default();
        assert_eq!(
            sanitizer.sanitize("SELECT d.department_name FROM departments d;"),
            "SELECT de.department_name FROM departments de;"
        );
    }

    #[test]
    fn test_as_alias_declaration_is_rewritten() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT d.department_name, COUNT(*) FROM departments AS d GROUP BY d.department_name";
        assert_eq!(
            sanitizer.sanitize(sql),
            "SELECT de.department_name, COUNT(*) FROM departments AS de GROUP BY de.department_name"
        );
    }

    #[test]
    fn test_correct_departments_d_alias_is_untouched() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT d.department_id, d.location FROM departments d";
        assert_eq!(sanitizer.sanitize(sql), sql);
    }

    #[test]
    fn test_declaration_kept_while_other_d_references_remain() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT d.first_name, d.department_name FROM doctors d \
                   JOIN departments AS d ON d.department_id = d.department_id";
        let fixed = sanitizer.sanitize(sql);
        assert!(fixed.contains("SELECT d.first_name, de.department_name FROM doctors d"));
        assert!(fixed.contains("JOIN departments AS d ON"));
    }

    #[test]
    fn test_guard_gates_rule() {
        let rule = RewriteRule::new("ward", r"\bw\b", "wa", None)
            .unwrap()
            .with_guard(|original, _| original.contains("wards"));
        let sanitizer = Sanitizer::new(vec![rule]);
        assert_eq!(sanitizer.sanitize("SELECT w.x FROM wards w"), "SELECT wa.x FROM wards wa");
        assert_eq!(sanitizer.sanitize("SELECT w.x FROM beds w"), "SELECT w.x FROM beds w");
    }

    #[test]
    fn test_other_column_references_are_untouched() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT d.first_name FROM doctors d JOIN departments de USING (department_id)";
        assert_eq!(sanitizer.sanitize(sql), sql);
    }

    #[test]
    fn test_group_concat_distinct_is_rewritten() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT p.first_name, GROUP_CONCAT(DISTINCT d.department_name) FROM patients p";
        assert_eq!(
            sanitizer.sanitize(sql),
            "SELECT p.first_name, GROUP_CONCAT(DISTINCT de.department_name) FROM patients p"
        );
    }

    #[test]
    fn test_word_boundary_is_respected() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT dd.department_name, d.department_names FROM x";
        assert_eq!(sanitizer.sanitize(sql), sql);
    }

    #[test]
    fn test_case_sensitive() {
        let sanitizer = Sanitizer::default();
        let sql = "SELECT D.department_name FROM departments D";
        assert_eq!(sanitizer.sanitize(sql), sql);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let sanitizer = Sanitizer::default();
        let inputs = [
            "SELECT d.department_name FROM departments d;",
            "SELECT de.department_name, COUNT(*) FROM departments de GROUP BY de.department_name",
            "SELECT GROUP_CONCAT(DISTINCT d.department_name) FROM doctors d",
            "SELECT 'd.department_name' AS literal",
            "SELECT * FROM departments d JOIN departments AS d",
            "SELECT d.department_id, d.location FROM departments d",
            "SELECT d.department_name, d.location FROM departments d",
            "",
            "d.department_name d.department_name",
        ];
        for input in inputs {
            let once = sanitizer.sanitize(input);
            assert_eq!(sanitizer.sanitize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_should_retry_on_marker() {
        let sanitizer = Sanitizer::default();
        assert!(sanitizer.should_retry("1054 (42S22): Unknown column 'd.department_name' in 'field list'"));
        assert!(!sanitizer.should_retry("1146 (42S02): Table 'hospital.wards' doesn't exist"));
    }

    #[test]
    fn test_replacement_expands_groups() {
        let rule = RewriteRule::new("swap", r"(\w+)\.ward_id", "$1.ward_no", None).unwrap();
        let sanitizer = Sanitizer::new(vec![rule]);
        assert_eq!(sanitizer.sanitize("SELECT w.ward_id"), "SELECT w.ward_no");
    }

    #[test]
    fn test_growing_rule_is_not_idempotent() {
        let rule = RewriteRule::new("double", "x", "xx", None).unwrap();
        assert!(!rule.is_stable_on("x"));
        assert!(!rule.is_idempotent());
        assert!(Sanitizer::default().rules().iter().all(RewriteRule::is_idempotent));
    }

    #[test]
    fn test_empty_rule_list_is_identity() {
        let sanitizer = Sanitizer::new(Vec::new());
        assert_eq!(sanitizer.sanitize("SELECT d.department_name"), "SELECT d.department_name");
        assert!(!sanitizer.should_retry("d.department_name"));
    }
}
