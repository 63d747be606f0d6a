//! Scripted collaborators for unit tests.

use crate::{
    api::Completion,
    database::Database,
    error::{CompletionError, DatabaseError},
};
use async_trait::async_trait;
use std::{collections::VecDeque, sync::Mutex};

/// Replays canned completions in order and records every call.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Models asked, in call order.
    pub fn models(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Prompts sent, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, CompletionError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CompletionError::Api("script exhausted".into())))
    }
}

/// Fixed schema plus canned statement results, recording every statement run.
pub struct ScriptedDatabase {
    schema: Result<String, DatabaseError>,
    results: Mutex<VecDeque<Result<String, DatabaseError>>>,
    statements: Mutex<Vec<String>>,
}

impl ScriptedDatabase {
    pub fn new(schema: &str, results: Vec<Result<String, DatabaseError>>) -> Self {
        Self {
            schema: Ok(schema.to_string()),
            results: Mutex::new(results.into()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn without_schema(err: DatabaseError) -> Self {
        Self {
            schema: Err(err),
            results: Mutex::new(VecDeque::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    async fn schema(&self) -> Result<String, DatabaseError> {
        self.schema.clone()
    }

    async fn run(&self, sql: &str) -> Result<String, DatabaseError> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DatabaseError::Query("script exhausted".into())))
    }
}
