#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use portweave::user_input::{UserInputAnswers, UserInputError, UserInputRequest, UserInputSource};

/// Answers by node id and records every batch it was asked for.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    answers: FxHashMap<String, Vec<String>>,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answers(mut self, node: &str, answers: &[&str]) -> Self {
        self.answers.insert(
            node.to_string(),
            answers.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// The node ids of every batch received, in request order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl UserInputSource for ScriptedSource {
    async fn request(
        &self,
        batch: &[UserInputRequest],
    ) -> Result<Vec<UserInputAnswers>, UserInputError> {
        self.batches.lock().push(
            batch
                .iter()
                .map(|request| request.node_id.to_string())
                .collect(),
        );
        Ok(batch
            .iter()
            .map(|request| {
                UserInputAnswers::new(
                    self.answers
                        .get(request.node_id.as_str())
                        .cloned()
                        .unwrap_or_default(),
                )
            })
            .collect())
    }
}

/// Always returns one answer set too few.
pub struct MiscountingSource;

#[async_trait]
impl UserInputSource for MiscountingSource {
    async fn request(
        &self,
        batch: &[UserInputRequest],
    ) -> Result<Vec<UserInputAnswers>, UserInputError> {
        Ok(batch
            .iter()
            .skip(1)
            .map(|_| UserInputAnswers::default())
            .collect())
    }
}

/// Never answers, for cancellation tests.
pub struct PendingSource;

#[async_trait]
impl UserInputSource for PendingSource {
    async fn request(
        &self,
        _batch: &[UserInputRequest],
    ) -> Result<Vec<UserInputAnswers>, UserInputError> {
        std::future::pending().await
    }
}

/// Fails the round trip outright.
pub struct BrokenSource;

#[async_trait]
impl UserInputSource for BrokenSource {
    async fn request(
        &self,
        _batch: &[UserInputRequest],
    ) -> Result<Vec<UserInputAnswers>, UserInputError> {
        Err(UserInputError::failed("terminal went away"))
    }
}
