//! # Query pipeline
//!
//! One question in, one [`ResponsePayload`] out:
//!
//! ```text
//! schema ─▶ generate ─▶ sanitize ─▶ execute (≤1 retry) ─▶ parse + sample ─▶ route
//!                                        │                                   │
//!                                        ▼                                   ├─▶ table
//!                                   error payload                            └─▶ summarize ─▶ narrative
//! ```
//!
//! [`Pipeline::ask`] never fails: every [`PipelineError`] is rendered into an
//! [`Outcome::Error`] payload whose text carries a per-stage prefix. The history is
//! read, never written; appending turns is the job of [`crate::history::Session`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use drquery::api::{ModelPolicy, OpenAiCompletion};
//! use drquery::config::DrQueryConfig;
//! use drquery::database::MySqlDatabase;
//! use drquery::history::ConversationHistory;
//! use drquery::pipeline::Pipeline;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DrQueryConfig::new("mysql://root@localhost/hospital");
//! let completion = Arc::new(OpenAiCompletion::new(&config)?);
//! let pipeline = Pipeline::builder(completion, ModelPolicy::from_models(config.models.clone()))
//!     .parse_options(config.parse_options())
//!     .build();
//!
//! let mut db = MySqlDatabase::new(&config);
//! db.connect().await?;
//! let payload = pipeline
//!     .ask("List all departments", &db, &ConversationHistory::with_greeting())
//!     .await;
//! println!("{}", payload.text);
//! # Ok(()) }
//! ```

use crate::{
    api::{Completion, ModelPolicy},
    config::DrQueryConfig,
    database::Database,
    error::PipelineError,
    executor::execute,
    generator::generate,
    history::ConversationHistory,
    parser::{ParseOptions, RowSet, parse, sample_large},
    router::{Presentation, route},
    sanitizer::Sanitizer,
    summarizer::{SummaryRequest, summarize},
    template::PromptTemplate,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lead-in of every tabular answer; the sampling note follows it.
pub const TABLE_TEXT: &str = "Here is the result in tabular format:";

/// How a [`ResponsePayload`] should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Table,
    Narrative,
    /// `text` is an error message; `table` and `sql` are `None`.
    Error,
}

/// What the caller gets back for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePayload {
    pub text: String,
    pub table: Option<RowSet>,
    /// The statement that actually produced the result, after any repair.
    pub sql: Option<String>,
    pub outcome: Outcome,
    /// Empty unless the table was sampled down.
    pub sample_note: String,
}

impl ResponsePayload {
    fn error(err: &PipelineError) -> Self {
        Self {
            text: err.response_text(),
            table: None,
            sql: None,
            outcome: Outcome::Error,
            sample_note: String::new(),
        }
    }
}

/// The configured question-answering pipeline.
pub struct Pipeline {
    completion: Arc<dyn Completion>,
    policy: ModelPolicy,
    sanitizer: Sanitizer,
    template: PromptTemplate,
    parse_options: ParseOptions,
    allowed_statements: Option<Vec<String>>,
}

/// Builder for [`Pipeline`]; everything but the completion side has a default.
pub struct PipelineBuilder {
    completion: Arc<dyn Completion>,
    policy: ModelPolicy,
    sanitizer: Sanitizer,
    template: PromptTemplate,
    parse_options: ParseOptions,
    allowed_statements: Option<Vec<String>>,
}

impl PipelineBuilder {
    pub fn sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn parse_options(mut self, parse_options: ParseOptions) -> Self {
        self.parse_options = parse_options;
        self
    }

    /// Restrict execution to statements starting with one of `keywords`.
    pub fn allowed_statements(mut self, keywords: Option<Vec<String>>) -> Self {
        self.allowed_statements = keywords;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            completion: self.completion,
            policy: self.policy,
            sanitizer: self.sanitizer,
            template: self.template,
            parse_options: self.parse_options,
            allowed_statements: self.allowed_statements,
        }
    }
}

impl Pipeline {
    pub fn builder(completion: Arc<dyn Completion>, policy: ModelPolicy) -> PipelineBuilder {
        PipelineBuilder {
            completion,
            policy,
            sanitizer: Sanitizer::default(),
            template: PromptTemplate::default(),
            parse_options: ParseOptions::default(),
            allowed_statements: None,
        }
    }

    /// A pipeline wired from `config`.
    ///
    /// # Errors
    /// Returns an error if a configured rewrite rule does not compile.
    pub fn from_config(
        config: &DrQueryConfig,
        completion: Arc<dyn Completion>,
        template: PromptTemplate,
    ) -> Result<Self, regex::Error> {
        Ok(
            Self::builder(completion, ModelPolicy::from_models(config.models.clone()))
                .sanitizer(config.sanitizer()?)
                .template(template)
                .parse_options(config.parse_options())
                .allowed_statements(config.allowed_statements.clone())
                .build(),
        )
    }

    /// Answer `question` against `db`, given the conversation so far.
    pub async fn ask(
        &self,
        question: &str,
        db: &dyn Database,
        history: &ConversationHistory,
    ) -> ResponsePayload {
        match self.run(question, db, history).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Pipeline failed: {}", err);
                ResponsePayload::error(&err)
            }
        }
    }

    async fn run(
        &self,
        question: &str,
        db: &dyn Database,
        history: &ConversationHistory,
    ) -> Result<ResponsePayload, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let schema = db.schema().await.map_err(PipelineError::Schema)?;
        debug!("Schema is {} bytes", schema.len());

        let generated = generate(
            self.completion.as_ref(),
            &self.policy,
            &self.template,
            question,
            history,
            &schema,
        )
        .await?;

        let sanitized = self.sanitizer.sanitize(&generated);
        if sanitized != generated {
            info!("Sanitized SQL: {}", sanitized);
        }

        let execution = execute(
            db,
            &self.sanitizer,
            &sanitized,
            self.allowed_statements.as_deref(),
        )
        .await?;

        let sampled = parse(&execution.raw, &self.parse_options)
            .map(|rows| sample_large(rows, &self.parse_options));

        match route(question, sampled.as_ref().map(|s| &s.rows)) {
            Presentation::Table => {
                let (table, sample_note) = match sampled {
                    Some(sampled) => (Some(sampled.rows), sampled.note),
                    None => (None, String::new()),
                };
                info!(
                    "Answering with a table of {} rows",
                    table.as_ref().map_or(0, RowSet::len)
                );
                Ok(ResponsePayload {
                    text: format!("{TABLE_TEXT}{sample_note}"),
                    table,
                    sql: Some(execution.sql),
                    outcome: Outcome::Table,
                    sample_note,
                })
            }
            Presentation::Narrative => {
                let sample_note = sampled.map(|s| s.note).unwrap_or_default();
                let text = summarize(
                    self.completion.as_ref(),
                    &self.policy,
                    &self.template,
                    &SummaryRequest {
                        question,
                        history,
                        schema: &schema,
                        sql: &execution.sql,
                        raw_result: &execution.raw,
                        sample_note: &sample_note,
                    },
                )
                .await?;
                Ok(ResponsePayload {
                    text,
                    table: None,
                    sql: Some(execution.sql),
                    outcome: Outcome::Narrative,
                    sample_note,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{CompletionError, DatabaseError},
        testing::{ScriptedCompletion, ScriptedDatabase},
    };

    const SCHEMA: &str = "CREATE TABLE departments (department_id int, department_name varchar(100))";

    fn pipeline(completion: &Arc<ScriptedCompletion>, models: &[&str]) -> Pipeline {
        Pipeline::builder(
            completion.clone(),
            ModelPolicy::from_models(models.iter().map(|m| m.to_string()).collect()),
        )
        .build()
    }

    #[tokio::test]
    async fn test_alias_is_corrected_before_execution() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(
            "SELECT d.department_name FROM departments d;".into(),
        )]));
        let db = ScriptedDatabase::new(SCHEMA, vec![Ok("('Cardiology')\n('Neurology')".into())]);

        let payload = pipeline(&completion, &["m"])
            .ask("List all departments", &db, &ConversationHistory::with_greeting())
            .await;

        assert_eq!(
            db.statements(),
            ["SELECT de.department_name FROM departments de;"]
        );
        assert_eq!(
            payload.sql.as_deref(),
            Some("SELECT de.department_name FROM departments de;")
        );
        assert_eq!(payload.outcome, Outcome::Table);
    }

    #[tokio::test]
    async fn test_failed_retry_yields_execution_error() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(
            "SELECT de.department_name FROM doctors d JOIN departments de USING (department_id)"
                .into(),
        )]));
        let db = ScriptedDatabase::new(
            SCHEMA,
            vec![
                Err(DatabaseError::Query(
                    "Unknown column 'd.department_name' in 'field list'".into(),
                )),
                Err(DatabaseError::Query("still broken".into())),
            ],
        );

        let payload = pipeline(&completion, &["m"])
            .ask("Departments per doctor", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.outcome, Outcome::Error);
        assert_eq!(
            payload.text,
            "Error executing query: Unknown column 'd.department_name' in 'field list'"
        );
        assert_eq!(payload.table, None);
        assert_eq!(payload.sql, None);
        assert_eq!(db.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_two_column_result_is_a_table() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(
            "SELECT department_id, department_name FROM departments".into(),
        )]));
        let db = ScriptedDatabase::new(
            SCHEMA,
            vec![Ok("(1, 'Cardiology')\n(2, 'Neurology')".into())],
        );

        let payload = pipeline(&completion, &["m"])
            .ask("List all departments", &db, &ConversationHistory::new())
            .await;

        let table = payload.table.unwrap();
        assert_eq!(table.columns(), ["Column_1", "Column_2"]);
        assert_eq!(
            table.rows(),
            [vec!["1", "Cardiology"], vec!["2", "Neurology"]]
        );
        assert_eq!(payload.text, TABLE_TEXT);
        assert_eq!(completion.prompts().len(), 1, "summarizer must be skipped");
    }

    #[tokio::test]
    async fn test_empty_result_is_summarized() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok("SELECT * FROM doctors WHERE 1 = 0".into()),
            Ok("No doctors match that description.".into()),
        ]));
        let db = ScriptedDatabase::new(SCHEMA, vec![Ok(String::new())]);

        let payload = pipeline(&completion, &["m"])
            .ask("Which doctors are on Mars?", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.outcome, Outcome::Narrative);
        assert_eq!(payload.text, "No doctors match that description.");
        assert_eq!(payload.table, None);
        assert_eq!(payload.sql.as_deref(), Some("SELECT * FROM doctors WHERE 1 = 0"));

        let prompts = completion.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("SQL Query: <SQL>SELECT * FROM doctors WHERE 1 = 0</SQL>"));
    }

    #[tokio::test]
    async fn test_large_result_is_sampled_deterministically() {
        let raw: String = (0..6000)
            .map(|i| format!("({i}, 'patient {i}')"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut tables = Vec::new();
        for _ in 0..2 {
            let completion =
                Arc::new(ScriptedCompletion::new(vec![Ok("SELECT * FROM patients".into())]));
            let db = ScriptedDatabase::new(SCHEMA, vec![Ok(raw.clone())]);
            let payload = pipeline(&completion, &["m"])
                .ask("List all patients", &db, &ConversationHistory::new())
                .await;

            assert_eq!(
                payload.sample_note,
                "\n\n*Note: Showing sample of 2000 rows from 6000 total rows for performance.*"
            );
            assert_eq!(payload.text, format!("{TABLE_TEXT}{}", payload.sample_note));
            tables.push(payload.table.unwrap());
        }

        assert_eq!(tables[0].len(), 2000);
        assert_eq!(tables[0], tables[1]);
    }

    #[tokio::test]
    async fn test_table_keyword_with_single_row_skips_summarizer() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(
            "SELECT COUNT(*) FROM doctors".into(),
        )]));
        let db = ScriptedDatabase::new(SCHEMA, vec![Ok("(12)".into())]);

        let payload = pipeline(&completion, &["m"])
            .ask("Show the doctor count as a table", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.outcome, Outcome::Table);
        assert_eq!(payload.table.unwrap().rows(), [vec!["12"]]);
        assert_eq!(completion.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_authentication_failure_stops_at_first_model() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Err(CompletionError::Api("Invalid API Key (code: invalid_api_key)".into())),
            Ok("SELECT 1".into()),
        ]));
        let db = ScriptedDatabase::new(SCHEMA, vec![]);

        let payload = pipeline(&completion, &["a", "b"])
            .ask("How many wards?", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.outcome, Outcome::Error);
        assert!(payload.text.starts_with("Error generating query:"));
        assert!(payload.text.contains("invalid_api_key"));
        assert_eq!(completion.models(), ["a"]);
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_all_models_failing_reports_last_error() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Err(CompletionError::Api("model_decommissioned".into())),
            Err(CompletionError::Timeout(60)),
        ]));
        let db = ScriptedDatabase::new(SCHEMA, vec![]);

        let payload = pipeline(&completion, &["old", "new"])
            .ask("How many wards?", &db, &ConversationHistory::new())
            .await;

        assert_eq!(
            payload.text,
            "Error generating query: No working models available. Last error: completion request timed out after 60 seconds"
        );
    }

    #[tokio::test]
    async fn test_summarizer_failure_is_fatal() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok("SELECT name FROM wards WHERE 1 = 0".into()),
            Err(CompletionError::Api("upstream overloaded".into())),
        ]));
        let db = ScriptedDatabase::new(SCHEMA, vec![Ok(String::new())]);

        let payload = pipeline(&completion, &["m"])
            .ask("Which wards are closed?", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.outcome, Outcome::Error);
        assert!(payload.text.starts_with("Error summarizing result:"));
        assert_eq!(payload.sql, None);
    }

    #[tokio::test]
    async fn test_schema_failure() {
        let completion = Arc::new(ScriptedCompletion::new(vec![]));
        let db = ScriptedDatabase::without_schema(DatabaseError::NotConnected);

        let payload = pipeline(&completion, &["m"])
            .ask("How many wards?", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.text, "Error reading schema: not connected to a database");
        assert!(completion.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_blank_question() {
        let completion = Arc::new(ScriptedCompletion::new(vec![]));
        let db = ScriptedDatabase::new(SCHEMA, vec![]);

        let payload = pipeline(&completion, &["m"])
            .ask("  ", &db, &ConversationHistory::new())
            .await;

        assert_eq!(payload.text, "Error: question must not be empty");
        assert_eq!(payload.outcome, Outcome::Error);
    }

    #[tokio::test]
    async fn test_statement_guard() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("DROP TABLE wards".into())]));
        let db = ScriptedDatabase::new(SCHEMA, vec![Ok(String::new())]);
        let pipeline = Pipeline::builder(completion, ModelPolicy::from_models(vec!["m".into()]))
            .allowed_statements(Some(vec!["SELECT".into(), "SHOW".into()]))
            .build();

        let payload = pipeline
            .ask("Delete the wards", &db, &ConversationHistory::new())
            .await;

        assert!(payload.text.starts_with("Error executing query: DROP statements are not allowed"));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_from_config() {
        let mut config = DrQueryConfig::new("mysql://localhost/hospital");
        config.sample_threshold = 1;
        config.sample_size = 1;
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("SELECT 1".into())]));
        let pipeline =
            Pipeline::from_config(&config, completion, PromptTemplate::default()).unwrap();
        let db = ScriptedDatabase::new(SCHEMA, vec![Ok("(1)\n(2)\n(3)".into())]);

        let payload = pipeline.ask("numbers", &db, &ConversationHistory::new()).await;
        assert_eq!(payload.table.unwrap().len(), 1);
        assert!(payload.sample_note.contains("from 3 total rows"));
    }
}
