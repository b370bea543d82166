#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use portweave::capability::{CapabilityError, CapabilityRegistry, NodeCapability, PortDefinition};
use portweave::context::NodeContext;
use portweave::graph::{ConnectionIndex, Node};
use portweave::types::NodeType;
use portweave::value::{
    DataType, DataValue, PortOutcome, PortOutcomes, PortValues, ScalarKind, ScalarValue,
};

fn input_any(id: &str) -> PortDefinition {
    PortDefinition::required(id, id, DataType::Scalar(ScalarKind::Any))
}

fn output_any(id: &str) -> PortDefinition {
    PortDefinition::required(id, id, DataType::Scalar(ScalarKind::Any))
}

fn get_input<'a>(inputs: &'a PortValues, id: &str) -> Result<&'a DataValue, CapabilityError> {
    inputs
        .get(&id.into())
        .ok_or_else(|| CapabilityError::missing_input(id))
}

/// Emits the text configured in `data["text"]`.
pub struct TextSource;

#[async_trait]
impl NodeCapability for TextSource {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::required(
            "output",
            "Output",
            DataType::Scalar(ScalarKind::Text),
        )]
    }

    async fn process(
        &self,
        node: &Node,
        _inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let text = node
            .data
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::invalid_payload("missing `text`"))?;
        let mut out = PortOutcomes::default();
        out.insert(
            "output".into(),
            PortOutcome::Produced(DataValue::text(text)),
        );
        Ok(out)
    }
}

/// Emits the text array configured in `data["items"]`.
pub struct ListSource;

#[async_trait]
impl NodeCapability for ListSource {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::required(
            "output",
            "Output",
            DataType::Array(ScalarKind::Text),
        )]
    }

    async fn process(
        &self,
        node: &Node,
        _inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let items: Vec<String> = node
            .data
            .get("items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CapabilityError::invalid_payload("missing `items`"))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();
        let mut out = PortOutcomes::default();
        out.insert(
            "output".into(),
            PortOutcome::Produced(DataValue::text_array(items)),
        );
        Ok(out)
    }
}

/// Copies `input` to `output` unchanged.
pub struct Passthrough;

#[async_trait]
impl NodeCapability for Passthrough {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("input")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let value = get_input(inputs, "input")?;
        let mut out = PortOutcomes::default();
        out.insert("output".into(), PortOutcome::Produced(value.clone()));
        Ok(out)
    }
}

/// Passthrough that counts how often `process` was invoked.
pub struct CountingPassthrough {
    pub calls: Arc<AtomicUsize>,
}

impl CountingPassthrough {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl NodeCapability for CountingPassthrough {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("input")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = get_input(inputs, "input")?;
        let mut out = PortOutcomes::default();
        out.insert("output".into(), PortOutcome::Produced(value.clone()));
        Ok(out)
    }
}

/// Graph output: declares no output ports and records its input as `value`.
pub struct Terminal;

#[async_trait]
impl NodeCapability for Terminal {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("input")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![]
    }

    async fn process(
        &self,
        _node: &Node,
        inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let value = get_input(inputs, "input")?;
        let mut out = PortOutcomes::default();
        out.insert("value".into(), PortOutcome::Produced(value.clone()));
        Ok(out)
    }
}

/// Always fails with the given message.
pub struct Failing {
    pub message: &'static str,
}

impl Default for Failing {
    fn default() -> Self {
        Self { message: "boom" }
    }
}

#[async_trait]
impl NodeCapability for Failing {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::optional(
            "input",
            "input",
            DataType::Scalar(ScalarKind::Any),
        )]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        _inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        Err(CapabilityError::failed(self.message))
    }
}

/// Branch: passes `value` through when `data["open"]` is true, otherwise
/// leaves `output` excluded.
pub struct Gate;

#[async_trait]
impl NodeCapability for Gate {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("value")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        node: &Node,
        inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let open = node
            .data
            .get("open")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let mut out = PortOutcomes::default();
        let outcome = if open {
            PortOutcome::Produced(get_input(inputs, "value")?.clone())
        } else {
            PortOutcome::Excluded
        };
        out.insert("output".into(), outcome);
        Ok(out)
    }
}

/// Passthrough that sleeps first, for cancellation tests.
pub struct Slow {
    pub delay_ms: u64,
}

#[async_trait]
impl NodeCapability for Slow {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::optional(
            "input",
            "input",
            DataType::Scalar(ScalarKind::Any),
        )]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        _inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        sleep(Duration::from_millis(self.delay_ms)).await;
        let mut out = PortOutcomes::default();
        out.insert("output".into(), PortOutcome::Produced(DataValue::text("slow")));
        Ok(out)
    }
}

/// Joins the texts on `input` and `extra` as "input+extra".
pub struct Joiner;

#[async_trait]
impl NodeCapability for Joiner {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("input"), input_any("extra")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let left = get_input(inputs, "input")?
            .as_scalar()
            .and_then(ScalarValue::as_text)
            .ok_or_else(|| CapabilityError::invalid_payload("expected text on `input`"))?;
        let right = get_input(inputs, "extra")?
            .as_scalar()
            .and_then(ScalarValue::as_text)
            .ok_or_else(|| CapabilityError::invalid_payload("expected text on `extra`"))?;
        let mut out = PortOutcomes::default();
        out.insert(
            "output".into(),
            PortOutcome::Produced(DataValue::text(format!("{left}+{right}"))),
        );
        Ok(out)
    }
}

/// Passthrough that excludes its output whenever the input text is "skip".
pub struct SkipMarked;

#[async_trait]
impl NodeCapability for SkipMarked {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("input")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let value = get_input(inputs, "input")?;
        let skip = value
            .as_scalar()
            .and_then(ScalarValue::as_text)
            .is_some_and(|text| text == "skip");
        let mut out = PortOutcomes::default();
        let outcome = if skip {
            PortOutcome::Excluded
        } else {
            PortOutcome::Produced(value.clone())
        };
        out.insert("output".into(), outcome);
        Ok(out)
    }
}

/// Passthrough that streams its input as a partial output before settling.
pub struct Streaming;

#[async_trait]
impl NodeCapability for Streaming {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![input_any("input")]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![output_any("output")]
    }

    async fn process(
        &self,
        _node: &Node,
        inputs: &PortValues,
        ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        let value = get_input(inputs, "input")?;
        let mut partial = PortValues::default();
        partial.insert("output".into(), value.clone());
        ctx.emit_partial(partial)?;
        let mut out = PortOutcomes::default();
        out.insert("output".into(), PortOutcome::Produced(value.clone()));
        Ok(out)
    }
}

/// Port declarations for fan-out nodes. The scheduler expands these; the
/// process path only exists to satisfy the trait.
pub struct FanOut;

#[async_trait]
impl NodeCapability for FanOut {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::required(
            "input",
            "Input",
            DataType::Array(ScalarKind::Any),
        )]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::required(
            "output",
            "Output",
            DataType::Array(ScalarKind::Any),
        )]
    }

    async fn process(
        &self,
        _node: &Node,
        _inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        Err(CapabilityError::failed("fan-out nodes are expanded, not processed"))
    }
}

/// Interactive node: questions come from its `question` input, answers
/// become a text array on `output`.
pub struct Ask;

#[async_trait]
impl NodeCapability for Ask {
    fn input_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::optional(
            "question",
            "Question",
            DataType::Scalar(ScalarKind::Text),
        )]
    }

    fn output_ports(&self, _node: &Node, _index: &ConnectionIndex) -> Vec<PortDefinition> {
        vec![PortDefinition::required(
            "output",
            "Output",
            DataType::Array(ScalarKind::Text),
        )]
    }

    async fn process(
        &self,
        _node: &Node,
        _inputs: &PortValues,
        _ctx: &NodeContext,
    ) -> Result<PortOutcomes, CapabilityError> {
        Err(CapabilityError::failed("interactive nodes need external answers"))
    }

    fn outputs_from_answers(
        &self,
        _node: &Node,
        _inputs: &PortValues,
        answers: &[String],
    ) -> Result<PortValues, CapabilityError> {
        let mut out = PortValues::default();
        out.insert("output".into(), DataValue::text_array(answers.to_vec()));
        Ok(out)
    }
}

/// Registry covering every node type the integration tests use by default.
pub fn base_registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .register(NodeType::Text, TextSource)
        .register(NodeType::Prompt, ListSource)
        .register(NodeType::Code, Passthrough)
        .register(NodeType::Match, Terminal)
        .register(NodeType::If, Gate)
        .register(NodeType::UserInput, Ask)
        .register(NodeType::SplitRun, FanOut)
}
