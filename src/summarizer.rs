//! # Narrative summarizer
//!
//! Second completion of the pipeline: turns the executed SQL and its raw result into
//! a prose answer. Only used when the router picks the narrative path.

use crate::{
    api::{Completion, ModelPolicy},
    error::PipelineError,
    history::ConversationHistory,
    template::PromptTemplate,
};
use tracing::{debug, error};

/// Inputs of one summary request.
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub question: &'a str,
    pub history: &'a ConversationHistory,
    pub schema: &'a str,
    pub sql: &'a str,
    pub raw_result: &'a str,
    /// Appended after the instructions; empty unless the result was sampled.
    pub sample_note: &'a str,
}

/// Assemble the narrative prompt.
pub fn build_narrative_prompt(template: &PromptTemplate, request: &SummaryRequest<'_>) -> String {
    format!(
        "{system}\n\
         Based on the table schema below, question, sql query, and sql response, write a natural language response.\n\
         <SCHEMA>{schema}</SCHEMA>\n\n\
         Conversation History: {history}\n\
         SQL Query: <SQL>{sql}</SQL>\n\
         User question: {question}\n\
         SQL Response: {response}\n\n\
         {instructions}{note}",
        system = template.system_prompt,
        schema = request.schema,
        history = request.history.render(),
        sql = request.sql,
        question = template.decorate_question(request.question),
        response = request.raw_result,
        instructions = template.narrative_instructions,
        note = request.sample_note,
    )
}

/// Ask the model for a prose answer.
///
/// # Errors
/// [`PipelineError::SummarizationFailure`] wrapping the completion failure. There is
/// no fallback text.
pub async fn summarize(
    completion: &dyn Completion,
    policy: &ModelPolicy,
    template: &PromptTemplate,
    request: &SummaryRequest<'_>,
) -> Result<String, PipelineError> {
    let prompt = build_narrative_prompt(template, request);
    debug!("Narrative prompt is {} bytes", prompt.len());

    match policy.complete(completion, &prompt).await {
        Ok(text) => Ok(text.trim().to_string()),
        Err(err) => {
            error!("Summarization failed: {}", err);
            Err(PipelineError::SummarizationFailure(Box::new(err)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::CompletionError, testing::ScriptedCompletion};

    fn request<'a>(history: &'a ConversationHistory) -> SummaryRequest<'a> {
        SummaryRequest {
            question: "How many doctors work in Cardiology?",
            history,
            schema: "CREATE TABLE doctors (...)",
            sql: "SELECT COUNT(*) FROM doctors",
            raw_result: "",
            sample_note: "",
        }
    }

    #[test]
    fn test_prompt_carries_every_input() {
        let history = ConversationHistory::with_greeting();
        let prompt = build_narrative_prompt(&PromptTemplate::default(), &request(&history));

        assert!(prompt.contains("<SCHEMA>CREATE TABLE doctors (...)</SCHEMA>"));
        assert!(prompt.contains("Conversation History: Assistant: Hello!"));
        assert!(prompt.contains("SQL Query: <SQL>SELECT COUNT(*) FROM doctors</SQL>"));
        assert!(prompt.contains("User question: How many doctors work in Cardiology?"));
        assert!(prompt.contains("SQL Response: \n"));
        assert!(prompt.contains("Do not format data as ASCII tables"));
    }

    #[test]
    fn test_sample_note_closes_the_prompt() {
        let history = ConversationHistory::new();
        let mut req = request(&history);
        req.sample_note = "\n\n*Note: sampled*";
        let prompt = build_narrative_prompt(&PromptTemplate::default(), &req);
        assert!(prompt.ends_with("describe the results naturally.\n\n*Note: sampled*"));
    }

    #[tokio::test]
    async fn test_summarize_trims_answer() {
        let completion = ScriptedCompletion::new(vec![Ok("  There are 4 doctors.\n".into())]);
        let policy = ModelPolicy::from_models(vec!["m".into()]);
        let history = ConversationHistory::new();

        let text = summarize(&completion, &policy, &PromptTemplate::default(), &request(&history))
            .await
            .unwrap();
        assert_eq!(text, "There are 4 doctors.");
    }

    #[tokio::test]
    async fn test_failure_is_wrapped() {
        let completion = ScriptedCompletion::new(vec![Err(CompletionError::Timeout(60))]);
        let policy = ModelPolicy::from_models(vec!["m".into()]);
        let history = ConversationHistory::new();

        let err = summarize(&completion, &policy, &PromptTemplate::default(), &request(&history))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SummarizationFailure(inner)
                if *inner == PipelineError::ModelUnavailable(CompletionError::Timeout(60))
        ));
    }
}
