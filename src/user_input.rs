//! Batched human-input coordination.
//!
//! A run suspends for human input at most once per round: every ready
//! [`crate::types::NodeType::UserInput`] node that survives pruning joins a
//! single [`UserInputSource::request`] call. The source answers all of them
//! together, matched back to their nodes strictly by submission index, and
//! each node's capability converts its answer strings into output values via
//! [`crate::capability::NodeCapability::outputs_from_answers`].
//!
//! The source is whatever the embedding application wires in: a CLI prompt,
//! a web socket round trip, a test script. The engine only cares that the
//! answer count matches the request count.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::scheduler::{RunError, RunState, Scheduler};
use crate::event_bus::Event;
use crate::graph::Node;
use crate::pruner::ControlFlowPruner;
use crate::types::NodeId;
use crate::value::{outcomes_from_values, values_from_outcomes, PortValues};

/// One node's entry in the per-round batched request.
#[derive(Clone, Debug)]
pub struct UserInputRequest {
    pub node_id: NodeId,
    pub title: String,
    /// The node's gathered input values, for the source to render however
    /// it likes.
    pub inputs: PortValues,
    /// Text inputs flattened to question strings, in input-port order.
    pub questions: Vec<String>,
}

/// Answer strings for one request, in question order.
#[derive(Clone, Debug, Default)]
pub struct UserInputAnswers {
    pub answers: Vec<String>,
}

impl UserInputAnswers {
    pub fn new(answers: Vec<String>) -> Self {
        Self { answers }
    }
}

/// External provider of human input.
///
/// Called at most once per round, with every surviving interactive node in
/// one batch. Implementations must return exactly one [`UserInputAnswers`]
/// per request, in request order.
#[async_trait]
pub trait UserInputSource: Send + Sync {
    async fn request(
        &self,
        batch: &[UserInputRequest],
    ) -> Result<Vec<UserInputAnswers>, UserInputError>;
}

/// Failures of the human-input round trip.
#[derive(Debug, Error, Diagnostic)]
pub enum UserInputError {
    #[error("graph contains interactive nodes but no user-input source is configured")]
    #[diagnostic(
        code(portweave::user_input::source_missing),
        help("attach a source with Scheduler::with_user_input_source")
    )]
    SourceMissing,

    #[error("user-input source answered {received} request(s), expected {expected}")]
    #[diagnostic(
        code(portweave::user_input::answer_count_mismatch),
        help("answers are matched to requests by index; the counts must be equal")
    )]
    AnswerCountMismatch { expected: usize, received: usize },

    #[error("user-input source failed: {message}")]
    #[diagnostic(code(portweave::user_input::source_failed))]
    Failed { message: String },
}

impl UserInputError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl Scheduler {
    /// Run one round's user-input batch.
    ///
    /// Prunes each candidate first; excluded nodes settle as excluded and
    /// never reach the source. An empty post-prune batch is not an error and
    /// does not suspend the round.
    pub(crate) async fn run_user_input_batch<'g>(
        &self,
        state: &mut RunState<'g>,
        candidates: Vec<&'g Node>,
    ) -> Result<(), RunError> {
        let mut surviving: Vec<(&Node, PortValues)> = Vec::new();
        for node in candidates {
            let gathered = state.gather(&node.id);
            let pruner = ControlFlowPruner::new(state.graph, &state.ports);
            if pruner.is_excluded(&node.id, &gathered, &state.store) {
                let outcomes = pruner.exclusion_outcomes(&node.id);
                state.emit(Event::node_excluded(node.id.clone(), state.round));
                state.settle_excluded(&node.id, outcomes)?;
                continue;
            }
            surviving.push((node, values_from_outcomes(&gathered)));
        }

        if surviving.is_empty() {
            return Ok(());
        }

        // Resolve the source before any node reports started.
        let source = self
            .user_input
            .as_ref()
            .ok_or(UserInputError::SourceMissing)?;

        let mut requests: Vec<UserInputRequest> = Vec::with_capacity(surviving.len());
        for (node, values) in &surviving {
            let questions = state.questions_for(&node.id, values);
            state.emit(Event::node_start(node.id.clone(), state.round));
            state.emit(Event::user_input_requested(
                node.id.clone(),
                state.round,
                questions.clone(),
            ));
            requests.push(UserInputRequest {
                node_id: node.id.clone(),
                title: node.title.clone(),
                inputs: values.clone(),
                questions,
            });
        }

        tracing::debug!(round = state.round, batch = requests.len(), "requesting user input");
        let answers = tokio::select! {
            _ = state.cancel.cancelled() => return Err(RunError::Cancelled),
            answered = source.request(&requests) => answered?,
        };

        if answers.len() != requests.len() {
            return Err(UserInputError::AnswerCountMismatch {
                expected: requests.len(),
                received: answers.len(),
            }
            .into());
        }

        for ((node, values), answer) in surviving.into_iter().zip(answers) {
            let capability = self.capability_for(node)?;
            let outputs = capability
                .outputs_from_answers(node, &values, &answer.answers)
                .map_err(|source| RunError::NodeProcess {
                    node: node.id.clone(),
                    source,
                })?;
            state.emit(Event::node_finish(node.id.clone(), state.round));
            state.settle(&node.id, outcomes_from_values(outputs))?;
        }

        Ok(())
    }
}
