//! # API Module
//!
//! The text-completion collaborator and the model fallback policy.
//!
//! The pipeline only ever sees the [`Completion`] trait: one prompt in, one string
//! out, at temperature 0. [`OpenAiCompletion`] implements it against any
//! OpenAI-compatible endpoint (Groq by default) using `async-openai`, and bounds each
//! request with a timeout.
//!
//! [`ModelPolicy`] decides what to do when a call fails: it walks an ordered list of
//! candidate models and asks a classifier function whether a failure is worth trying
//! the next one.
//!
//! # Example
//!
//! ```no_run
//! use drquery::api::{ModelPolicy, OpenAiCompletion};
//! use drquery::config::DrQueryConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DrQueryConfig::new("mysql://root@localhost/hospital");
//! let completion = OpenAiCompletion::new(&config)?;
//! let policy = ModelPolicy::from_models(config.models.clone());
//! let sql = policy.complete(&completion, "Write SQL that counts wards").await;
//! # Ok(()) }
//! ```
use crate::{
    config::DrQueryConfig,
    error::{CompletionError, FailureClass, PipelineError},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::{error::Error, time::Duration};

use tracing::{debug, error, info, warn};

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Complete `prompt` with `model` at temperature 0.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, CompletionError>;
}

/// Classifies a failed completion for the fallback policy.
pub type FailureClassifier = fn(&CompletionError) -> FailureClass;

/// Default classifier: matches on the lowercased error text.
///
/// - `model_decommissioned` → [`FailureClass::Decommissioned`]
/// - `authentication` or `api_key` → [`FailureClass::Authentication`]
/// - anything else → [`FailureClass::Other`]
pub fn classify_failure(err: &CompletionError) -> FailureClass {
    let message = err.to_string().to_lowercase();
    if message.contains("model_decommissioned") {
        FailureClass::Decommissioned
    } else if message.contains("authentication") || message.contains("api_key") {
        FailureClass::Authentication
    } else {
        FailureClass::Other
    }
}

/// Ordered candidate models plus the classifier that decides when to move on.
#[derive(Debug, Clone)]
pub struct ModelPolicy {
    pub candidates: Vec<String>,
    pub classifier: FailureClassifier,
}

impl ModelPolicy {
    pub fn new(candidates: Vec<String>, classifier: FailureClassifier) -> Self {
        Self {
            candidates,
            classifier,
        }
    }

    /// A policy over `models` using [`classify_failure`].
    pub fn from_models(models: Vec<String>) -> Self {
        Self::new(models, classify_failure)
    }

    /// Try each candidate in order until one answers.
    ///
    /// # Errors
    /// [`PipelineError::ModelUnavailable`] carrying the last failure when every
    /// candidate fails, or immediately on an authentication failure.
    pub async fn complete(
        &self,
        completion: &dyn Completion,
        prompt: &str,
    ) -> Result<String, PipelineError> {
        let mut last_error = CompletionError::Api("no candidate models configured".to_string());

        for model in &self.candidates {
            match completion.complete(model, prompt).await {
                Ok(text) => {
                    debug!("Model {} answered with {} bytes", model, text.len());
                    return Ok(text);
                }
                Err(err) => match (self.classifier)(&err) {
                    FailureClass::Decommissioned => {
                        warn!("Model {} decommissioned", model);
                        last_error = err;
                    }
                    FailureClass::Authentication => {
                        error!("Authentication error for {}: {}", model, err);
                        return Err(PipelineError::ModelUnavailable(err));
                    }
                    FailureClass::Other => {
                        warn!("Error with {}: {}", model, err);
                        last_error = err;
                    }
                },
            }
        }

        error!("All models failed. Last error: {}", last_error);
        Err(PipelineError::ModelUnavailable(last_error))
    }
}

/// Creates a new OpenAI API client from configuration.
///
/// # Parameters
/// - `config: &DrQueryConfig`: Configuration containing API base and key.
///
/// # Returns
/// - `Result<Client<OpenAIConfig>, Box<dyn Error>>`: Created client or an error if initialization fails.
pub fn create_client(config: &DrQueryConfig) -> Result<Client<OpenAIConfig>, Box<dyn Error>> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.resolved_api_key())
        .with_api_base(config.api_base.clone());
    debug!("Client created for {}", config.api_base);
    Ok(Client::with_config(openai_config))
}

/// [`Completion`] over an OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompletion {
    client: Client<OpenAIConfig>,
    timeout_secs: u64,
}

impl OpenAiCompletion {
    pub fn new(config: &DrQueryConfig) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            client: create_client(config)?,
            timeout_secs: config.request_timeout_secs,
        })
    }
}

fn api_error(err: OpenAIError) -> CompletionError {
    CompletionError::Api(err.to_string())
}

#[async_trait]
impl Completion for OpenAiCompletion {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, CompletionError> {
        let user_message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        });

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .temperature(0.0)
            .messages(vec![user_message])
            .build()
            .map_err(api_error)?;

        debug!("Sending request to {} ({} prompt bytes)", model, prompt.len());

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.client.chat().create(request),
        )
        .await
        .map_err(|_| CompletionError::Timeout(self.timeout_secs))?
        .map_err(api_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::Empty)?;

        info!("Received completion from {}", model);
        Ok(content)
    }
}
