//! # Prompt templates
//!
//! The text that surrounds every completion request made by DrQuery.
//!
//! A template is a small YAML document with the following fields:
//! - `system_prompt`: the role framing that opens both the SQL and the narrative prompt,
//! - `sql_rules`: domain rules for the generator (table aliases, GROUP BY legality,
//!   correct and forbidden patterns),
//! - `sql_examples`: worked question → SQL examples shown after the history,
//! - `narrative_instructions`: closing instruction of the summarizer prompt,
//! - optional `pre_user_message_content` / `post_user_message_content` strings that are
//!   wrapped around the user's question at runtime.
//!
//! Templates are stored per-user under the application's configuration directory,
//! inside a `templates/` subfolder:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! [`PromptTemplate::default`] carries the built-in hospital-domain prompt, and
//! `drq init` writes it to `templates/default.yaml` as a starting point for edits.
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "You are a data analyst at a company."
//! sql_rules: |
//!   IMPORTANT NOTES:
//!   - wards table uses alias 'w'
//! sql_examples: |
//!   Question: How many wards are there?
//!   SQL Query: SELECT COUNT(*) FROM wards;
//! narrative_instructions: "Answer in one sentence."
//! ```
//!
//! ## Loading a template
//!
//! ```no_run
//! use drquery::template::{PromptTemplate, load_template};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let template: PromptTemplate = load_template("default").await?;
//! println!("System prompt: {}", template.system_prompt);
//! # Ok(()) }
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's database.";

const DEFAULT_SQL_RULES: &str = r#"IMPORTANT NOTES:
- departments table has department_name column, use alias 'de' for departments
- doctors table links to departments via department_id
- prescriptions link directly to patients and doctors (no appointment_id needed)
- Always use de.department_name (not d.department_name) when referencing department names

MySQL GROUP BY RULES (CRITICAL - NEVER VIOLATE):
- When using GROUP BY, ALL non-aggregate columns in SELECT must be in GROUP BY clause
- NEVER select p.first_name, p.last_name with GROUP BY de.department_name
- If grouping by department: ONLY select de.department_name and aggregate functions
- If showing individual patients: GROUP BY p.patient_id, NOT by department

CORRECT PATTERNS:
- Count by department: SELECT de.department_name, COUNT(*) as patient_count FROM ... GROUP BY de.department_name
- List patients in department: SELECT p.first_name, p.last_name, de.department_name FROM ... (NO GROUP BY)
- Patients with details: SELECT p.first_name, p.last_name, GROUP_CONCAT(de.department_name) FROM ... GROUP BY p.patient_id

FORBIDDEN PATTERNS:
- SELECT p.first_name, p.last_name, de.department_name FROM ... GROUP BY de.department_name
- Any individual column with GROUP BY on different column"#;

const DEFAULT_SQL_EXAMPLES: &str = "Question: Show patients with prescriptions from multiple departments
SQL Query: SELECT p.first_name, p.last_name, GROUP_CONCAT(DISTINCT de.department_name) AS departments FROM patients p JOIN prescriptions pr ON p.patient_id = pr.patient_id JOIN doctors d ON pr.doctor_id = d.doctor_id JOIN departments de ON d.department_id = de.department_id GROUP BY p.patient_id HAVING COUNT(DISTINCT de.department_id) > 1;";

const DEFAULT_NARRATIVE_INSTRUCTIONS: &str = "Provide a clear, concise answer. Do not format data as ASCII tables - just describe the results naturally.";

/// The prompt text used by the generator and the summarizer.
///
/// Instances are typically created by deserializing YAML files with
/// [`load_template`]. Fields missing from the file fall back to the built-in prompt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PromptTemplate {
    /// Role framing placed at the top of every prompt.
    pub system_prompt: String,

    /// Domain rules placed after the schema in the SQL prompt.
    pub sql_rules: String,

    /// Worked examples placed before the user's question in the SQL prompt.
    pub sql_examples: String,

    /// Closing instruction of the narrative prompt.
    pub narrative_instructions: String,

    /// Extra text added **before** the user's question.
    pub pre_user_message_content: Option<String>,

    /// Extra text added **after** the user's question.
    pub post_user_message_content: Option<String>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            sql_rules: DEFAULT_SQL_RULES.to_string(),
            sql_examples: DEFAULT_SQL_EXAMPLES.to_string(),
            narrative_instructions: DEFAULT_NARRATIVE_INSTRUCTIONS.to_string(),
            pre_user_message_content: None,
            post_user_message_content: None,
        }
    }
}

impl PromptTemplate {
    /// Wrap a question with the template's pre/post user content.
    pub fn decorate_question(&self, question: &str) -> String {
        let mut decorated = String::new();
        if let Some(pre) = &self.pre_user_message_content {
            decorated.push_str(pre);
            decorated.push(' ');
        }
        decorated.push_str(question);
        if let Some(post) = &self.post_user_message_content {
            decorated.push(' ');
            decorated.push_str(post);
        }
        decorated
    }
}

/// Load a prompt template by name from the user's config directory.
///
/// Resolves `<config_dir>/templates/<name>.yaml`, reads the file, and
/// deserializes into a [`PromptTemplate`].
///
/// ### Errors
/// Returns an error if:
/// - the config directory cannot be determined,
/// - the template file does not exist or cannot be read,
/// - the YAML content cannot be deserialized into a `PromptTemplate`.
pub async fn load_template(name: &str) -> Result<PromptTemplate, Box<dyn Error>> {
    let path = format!("templates/{}.yaml", name);
    let config_path = crate::config_dir()?.join(&path);

    tracing::info!("Loading template: {}", config_path.display());

    let content = fs::read_to_string(config_path)?;
    parse_template(&content)
}

/// Parse template YAML. An empty document yields the built-in template.
pub fn parse_template(content: &str) -> Result<PromptTemplate, Box<dyn Error>> {
    if content.trim().is_empty() {
        return Ok(PromptTemplate::default());
    }
    let template: PromptTemplate = serde_yaml::from_str(content)?;
    Ok(template)
}
