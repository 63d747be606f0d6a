//! # SQL generator
//!
//! Builds the SQL prompt and turns the model's answer into a single statement.
//!
//! The prompt is laid out as: role framing, `<SCHEMA>` block, domain rules,
//! conversation history, the "SQL only" instruction, worked examples, and finally the
//! question with an open `SQL Query:` cue. The model is told not to wrap its answer,
//! but fences are stripped anyway.

use crate::{
    api::{Completion, ModelPolicy},
    error::PipelineError,
    history::ConversationHistory,
    template::PromptTemplate,
};
use tracing::{debug, info};

const SQL_ONLY_INSTRUCTION: &str = "Write only the SQL query and nothing else. Do not wrap the SQL query in any other text, not even backticks.";

/// Assemble the SQL generation prompt.
pub fn build_sql_prompt(
    template: &PromptTemplate,
    schema: &str,
    history: &ConversationHistory,
    question: &str,
) -> String {
    format!(
        "{system}\n\
         Based on the table schema below, write a SQL query that would answer the user's question. \
         Take the conversation history into account.\n\n\
         <SCHEMA>{schema}</SCHEMA>\n\n\
         {rules}\n\n\
         Conversation History: {history}\n\n\
         {instruction}\n\n\
         For example:\n\
         {examples}\n\n\
         Your turn:\n\n\
         Question: {question}\n\
         SQL Query:",
        system = template.system_prompt,
        rules = template.sql_rules,
        history = history.render(),
        instruction = SQL_ONLY_INSTRUCTION,
        examples = template.sql_examples,
        question = template.decorate_question(question),
    )
}

/// Trim the answer and drop a surrounding Markdown code fence if the model added one.
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```sql") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```SQL") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        trimmed
    };
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}

/// Ask the model for a SQL statement answering `question`.
///
/// # Errors
/// - [`PipelineError::EmptyQuestion`] if `question` is blank.
/// - [`PipelineError::ModelUnavailable`] if no candidate model answers.
pub async fn generate(
    completion: &dyn Completion,
    policy: &ModelPolicy,
    template: &PromptTemplate,
    question: &str,
    history: &ConversationHistory,
    schema: &str,
) -> Result<String, PipelineError> {
    if question.trim().is_empty() {
        return Err(PipelineError::EmptyQuestion);
    }

    let prompt = build_sql_prompt(template, schema, history, question);
    debug!("SQL prompt is {} bytes", prompt.len());

    let raw = policy.complete(completion, &prompt).await?;
    let sql = strip_fences(&raw);
    info!("Generated SQL: {}", sql);
    Ok(sql)
}
