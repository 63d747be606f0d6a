//! # Conversation history and sessions
//!
//! [`ConversationHistory`] is the only state that outlives a single question: an
//! append-only list of user and assistant turns, replayed verbatim into every prompt.
//!
//! [`Session`] owns a history (and, optionally, a [`SessionStore`] that mirrors it to
//! SQLite) and is the explicit context object a front-end passes around instead of
//! global state. Each [`Session::submit`] runs the pipeline against the history as it
//! stood *before* the question, then appends the question and the answer.

use crate::{
    database::Database,
    error::SessionError,
    pipeline::{Pipeline, ResponsePayload},
    session_store::SessionStore,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, error};

/// Opening assistant turn of every new conversation.
pub const GREETING: &str = "Hello! I'm a SQL assistant. Ask me anything about your database.";

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(SessionError::UnknownRole(other.to_string())),
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered, append-only list of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// A history holding only the assistant greeting.
    pub fn with_greeting() -> Self {
        Self {
            turns: vec![ConversationTurn::assistant(GREETING)],
        }
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Prompt rendering: one `User: …` / `Assistant: …` line per turn.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| match turn.role {
                Role::User => format!("User: {}", turn.text),
                Role::Assistant => format!("Assistant: {}", turn.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A conversation in progress.
pub struct Session {
    history: ConversationHistory,
    store: Option<SessionStore>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An in-memory session seeded with the greeting.
    pub fn new() -> Self {
        Self {
            history: ConversationHistory::with_greeting(),
            store: None,
        }
    }

    /// Resume (or start) the conversation kept in `store`.
    ///
    /// A conversation with no stored turns is seeded with the greeting, which is
    /// persisted too.
    ///
    /// # Errors
    /// Returns a [`SessionError`] if the stored turns cannot be read or the greeting
    /// cannot be written.
    pub fn with_store(mut store: SessionStore) -> Result<Self, SessionError> {
        let turns = store.load_history()?;
        let history = if turns.is_empty() {
            let greeting = ConversationTurn::assistant(GREETING);
            store.append(&greeting, None)?;
            ConversationHistory::from_turns(vec![greeting])
        } else {
            debug!(
                "Resumed session '{}' with {} turns",
                store.session_name(),
                turns.len()
            );
            ConversationHistory::from_turns(turns)
        };

        Ok(Self {
            history,
            store: Some(store),
        })
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Ask one question and record the exchange.
    ///
    /// Persistence failures are logged and do not affect the returned payload.
    pub async fn submit(
        &mut self,
        pipeline: &Pipeline,
        db: &dyn Database,
        question: &str,
    ) -> ResponsePayload {
        let payload = pipeline.ask(question, db, &self.history).await;

        self.record(ConversationTurn::user(question), None);
        self.record(
            ConversationTurn::assistant(payload.text.clone()),
            payload.sql.as_deref(),
        );

        payload
    }

    fn record(&mut self, turn: ConversationTurn, sql: Option<&str>) {
        if let Some(store) = self.store.as_mut() {
            if let Err(err) = store.append(&turn, sql) {
                error!("Failed to persist {} turn: {}", turn.role, err);
            }
        }
        self.history.push(turn);
    }

    /// Drop everything but the greeting.
    ///
    /// # Errors
    /// Returns a [`SessionError`] if the stored conversation cannot be rewritten.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        let greeting = ConversationTurn::assistant(GREETING);
        if let Some(store) = self.store.as_mut() {
            store.clear()?;
            store.append(&greeting, None)?;
        }
        self.history = ConversationHistory::from_turns(vec![greeting]);
        Ok(())
    }
}
