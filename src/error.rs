//! # Error types
//!
//! Typed errors for every stage of the query pipeline. Library code returns these;
//! the binary and the YAML loaders stay on `Box<dyn Error>`.
//!
//! The pipeline never lets one of these escape [`crate::pipeline::Pipeline::ask`]:
//! each [`PipelineError`] is rendered into a prefixed, human-readable response text
//! (see [`PipelineError::response_text`]).

use thiserror::Error;

/// A single failed call to the completion collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    /// The provider answered with an error (HTTP status, API error body, transport).
    #[error("{0}")]
    Api(String),

    #[error("completion request timed out after {0} seconds")]
    Timeout(u64),

    /// The provider answered but returned no text.
    #[error("completion returned no content")]
    Empty,
}

/// How the model fallback policy treats a [`CompletionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The model is retired; try the next candidate.
    Decommissioned,
    /// Credentials are bad; every candidate will fail the same way.
    Authentication,
    /// Anything else; try the next candidate.
    Other,
}

/// Failures raised by a [`crate::database::Database`] implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatabaseError {
    #[error("not connected to a database")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connect(String),

    /// The statement reached the server and was rejected, or the driver failed mid-query.
    #[error("{0}")]
    Query(String),

    #[error("query timed out after {0} seconds")]
    Timeout(u64),

    /// A column value could not be turned into text.
    #[error("could not decode column {column}: {message}")]
    Decode { column: String, message: String },
}

/// Terminal failure of the executor, carrying the database message verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct QueryExecutionError {
    pub message: String,
}

impl QueryExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<DatabaseError> for QueryExecutionError {
    fn from(err: DatabaseError) -> Self {
        Self::new(err.to_string())
    }
}

/// Everything that can end a pipeline invocation early.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("schema unavailable: {0}")]
    Schema(DatabaseError),

    /// Every candidate model failed, or authentication was rejected.
    #[error("No working models available. Last error: {0}")]
    ModelUnavailable(CompletionError),

    #[error(transparent)]
    QueryExecution(#[from] QueryExecutionError),

    #[error("narrative generation failed: {0}")]
    SummarizationFailure(Box<PipelineError>),
}

impl PipelineError {
    /// Render the error as the display string returned to the caller.
    ///
    /// Each class of failure gets its own prefix so a front-end can tell them apart
    /// without inspecting the payload outcome.
    pub fn response_text(&self) -> String {
        match self {
            PipelineError::EmptyQuestion => format!("Error: {self}"),
            PipelineError::Schema(err) => format!("Error reading schema: {err}"),
            PipelineError::ModelUnavailable(_) => format!("Error generating query: {self}"),
            PipelineError::QueryExecution(err) => format!("Error executing query: {err}"),
            PipelineError::SummarizationFailure(inner) => {
                format!("Error summarizing result: {inner}")
            }
        }
    }
}

/// Failures of the SQLite-backed session store.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("could not open session database {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: diesel::ConnectionError,
    },

    #[error("unknown role in stored message: {0}")]
    UnknownRole(String),
}
