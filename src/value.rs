//! Value model for data flowing between node ports.
//!
//! Every value carried along a connection is a [`DataValue`]: either one
//! [`ScalarValue`] or a homogeneous [`ArrayValue`] of scalars. Arrays do not
//! nest; aggregation that would produce an array-of-arrays carries the inner
//! arrays as [`ScalarKind::Any`] elements.
//!
//! Execution results are recorded per port as a [`PortOutcome`], which keeps
//! the "branch not taken" marker *outside* the value union: a port either
//! [`Produced`](PortOutcome::Produced) a value or was
//! [`Excluded`](PortOutcome::Excluded) by control flow. Code that consumes
//! values never has to pattern-match a sentinel out of `DataValue` itself.
//!
//! # Examples
//!
//! ```rust
//! use portweave::value::{ArrayValue, DataValue, PortOutcome, ScalarKind, ScalarValue};
//!
//! let greeting = DataValue::text("hello");
//! assert_eq!(greeting.data_type().to_string(), "text");
//!
//! let mut names = ArrayValue::new(ScalarKind::Text);
//! names.push(ScalarValue::text("ada")).unwrap();
//! names.push(ScalarValue::text("grace")).unwrap();
//! assert_eq!(names.len(), 2);
//!
//! let outcome = PortOutcome::Produced(DataValue::Array(names));
//! assert!(!outcome.is_excluded());
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::PortId;

/// Values a node produced on its output ports, keyed by port id.
pub type PortValues = FxHashMap<PortId, DataValue>;

/// Recorded per-port outcomes for a settled node, keyed by port id.
pub type PortOutcomes = FxHashMap<PortId, PortOutcome>;

/// The scalar kinds the value model distinguishes.
///
/// `Any` is the escape hatch: it accepts arbitrary JSON and is what
/// heterogeneous aggregation falls back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarKind {
    Text,
    Number,
    Bool,
    Date,
    Time,
    DateTime,
    Message,
    Any,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Message => "message",
            Self::Any => "any",
        };
        write!(f, "{label}")
    }
}

/// A chat message scalar, as consumed and produced by conversational nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One scalar value, tagged with its kind.
///
/// Calendar kinds are carried as ISO-8601 strings rather than parsed
/// representations; the engine routes them, it does not do date arithmetic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ScalarValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(String),
    Time(String),
    DateTime(String),
    Message(ChatMessage),
    Any(serde_json::Value),
}

impl ScalarValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Text(_) => ScalarKind::Text,
            Self::Number(_) => ScalarKind::Number,
            Self::Bool(_) => ScalarKind::Bool,
            Self::Date(_) => ScalarKind::Date,
            Self::Time(_) => ScalarKind::Time,
            Self::DateTime(_) => ScalarKind::DateTime,
            Self::Message(_) => ScalarKind::Message,
            Self::Any(_) => ScalarKind::Any,
        }
    }

    /// Borrow the inner text, if this is a text scalar.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A homogeneous array of scalars.
///
/// Every element must match the array's declared kind; an array declared
/// [`ScalarKind::Any`] accepts any element. The invariant is enforced at
/// every mutation, so a constructed `ArrayValue` is always well-kinded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    kind: ScalarKind,
    items: Vec<ScalarValue>,
}

impl ArrayValue {
    /// Create an empty array of the given element kind.
    #[must_use]
    pub fn new(kind: ScalarKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }

    /// Build an array from scalars, inferring the element kind.
    ///
    /// All elements of one kind produce an array of that kind; a mixed batch
    /// falls back to [`ScalarKind::Any`]. An empty batch is `Any` as well.
    #[must_use]
    pub fn from_scalars(items: Vec<ScalarValue>) -> Self {
        let kind = match items.first() {
            Some(first) => {
                let first_kind = first.kind();
                if items.iter().all(|item| item.kind() == first_kind) {
                    first_kind
                } else {
                    ScalarKind::Any
                }
            }
            None => ScalarKind::Any,
        };
        Self { kind, items }
    }

    /// Append an element, enforcing the array's kind.
    pub fn push(&mut self, item: ScalarValue) -> Result<(), ValueError> {
        if self.kind != ScalarKind::Any && item.kind() != self.kind {
            return Err(ValueError::KindMismatch {
                expected: self.kind,
                found: item.kind(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    #[must_use]
    pub fn items(&self) -> &[ScalarValue] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop elements past `max`, keeping the first `max` in order.
    pub fn truncate(&mut self, max: usize) {
        self.items.truncate(max);
    }

    pub fn into_items(self) -> Vec<ScalarValue> {
        self.items
    }
}

/// A value carried along a connection: one scalar or one array of scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Scalar(ScalarValue),
    Array(ArrayValue),
}

impl DataValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Scalar(ScalarValue::Text(s.into()))
    }

    #[must_use]
    pub fn number(n: f64) -> Self {
        Self::Scalar(ScalarValue::Number(n))
    }

    #[must_use]
    pub fn bool(b: bool) -> Self {
        Self::Scalar(ScalarValue::Bool(b))
    }

    /// Build a text array from anything yielding strings.
    pub fn text_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut array = ArrayValue::new(ScalarKind::Text);
        for item in items {
            // Text elements into a text array cannot mismatch.
            let _ = array.push(ScalarValue::Text(item.into()));
        }
        Self::Array(array)
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Scalar(s) => DataType::Scalar(s.kind()),
            Self::Array(a) => DataType::Array(a.kind()),
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(a) => Some(a),
            Self::Scalar(_) => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Array(_) => None,
        }
    }

    /// Flatten to a scalar for array aggregation.
    ///
    /// Scalars pass through; an array collapses to a single
    /// [`ScalarKind::Any`] element so that aggregated results never nest.
    #[must_use]
    pub fn into_element(self) -> ScalarValue {
        match self {
            Self::Scalar(s) => s,
            Self::Array(a) => {
                ScalarValue::Any(serde_json::to_value(&a).unwrap_or(serde_json::Value::Null))
            }
        }
    }
}

/// Declared type of a port: one scalar kind, or an array of one scalar kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Scalar(ScalarKind),
    Array(ScalarKind),
}

impl DataType {
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Array(kind) => write!(f, "{kind}[]"),
        }
    }
}

/// Result recorded for one output port of a settled node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortOutcome {
    /// The node ran and produced this value.
    Produced(DataValue),
    /// Control flow excluded the node; no value exists for this port.
    Excluded,
}

impl PortOutcome {
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        matches!(self, Self::Excluded)
    }

    /// Borrow the produced value, if any.
    #[must_use]
    pub fn produced(&self) -> Option<&DataValue> {
        match self {
            Self::Produced(value) => Some(value),
            Self::Excluded => None,
        }
    }
}

/// Wrap plain produced values into per-port outcomes.
///
/// Convenience for capabilities that never exclude a port.
#[must_use]
pub fn outcomes_from_values(values: PortValues) -> PortOutcomes {
    values
        .into_iter()
        .map(|(port, value)| (port, PortOutcome::Produced(value)))
        .collect()
}

/// Extract the produced values from gathered outcomes, dropping exclusions.
#[must_use]
pub fn values_from_outcomes(outcomes: &PortOutcomes) -> PortValues {
    outcomes
        .iter()
        .filter_map(|(port, outcome)| {
            outcome
                .produced()
                .map(|value| (port.clone(), value.clone()))
        })
        .collect()
}

/// Errors from the value model.
#[derive(Debug, Error, Diagnostic)]
pub enum ValueError {
    #[error("array of {expected} cannot hold a {found} element")]
    #[diagnostic(
        code(portweave::value::kind_mismatch),
        help("declare the array as `any` to mix element kinds")
    )]
    KindMismatch {
        expected: ScalarKind,
        found: ScalarKind,
    },
}
