//! Error types for the view engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of rule a field value violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ViolationKind {
    /// A required value was missing or blank.
    Required,
    /// A repeatable list had fewer entries than allowed.
    TooFewEntries {
        /// Minimum number of entries.
        min: usize,
        /// Actual number of entries.
        actual: usize,
    },
    /// Value did not match the expected format.
    InvalidFormat {
        /// Expected format description.
        expected: String,
    },
    /// Text exceeded the maximum length.
    TooLong {
        /// Maximum allowed length in characters.
        max: usize,
        /// Actual length in characters.
        actual: usize,
    },
    /// Numeric value outside the allowed range.
    OutOfRange {
        /// Inclusive lower bound, if any.
        min: Option<f64>,
        /// Inclusive upper bound, if any.
        max: Option<f64>,
    },
    /// Violation reported by the server for this field.
    Rejected,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "value is required"),
            Self::TooFewEntries { min, actual } => {
                write!(f, "at least {min} entries required, got {actual}")
            }
            Self::InvalidFormat { expected } => write!(f, "expected {expected}"),
            Self::TooLong { max, actual } => {
                write!(f, "too long: {actual} chars exceeds max of {max}")
            }
            Self::OutOfRange { min, max } => match (min, max) {
                (Some(min), Some(max)) => write!(f, "value out of range [{min}, {max}]"),
                (Some(min), None) => write!(f, "value below minimum {min}"),
                (None, Some(max)) => write!(f, "value above maximum {max}"),
                (None, None) => write!(f, "value out of range"),
            },
            Self::Rejected => write!(f, "rejected by server"),
        }
    }
}

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Path of the offending field (`labels.0.key`).
    pub field: String,
    /// What was violated.
    #[serde(flatten)]
    pub kind: ViolationKind,
    /// Message to show next to the field.
    pub message: String,
}

impl FieldViolation {
    /// Create a violation, using the declared message when there is one.
    #[must_use]
    pub fn new(field: impl Into<String>, kind: ViolationKind, message: Option<&str>) -> Self {
        let message = message.map_or_else(|| kind.to_string(), str::to_string);
        Self {
            field: field.into(),
            kind,
            message,
        }
    }
}

/// One or more field-level violations. Never leaves the form boundary
/// towards the network.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed for {} field(s): {}", .violations.len(), field_list(.violations))]
pub struct ValidationError {
    /// Violations in schema order.
    pub violations: Vec<FieldViolation>,
}

fn field_list(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    /// Create from a list of violations.
    #[must_use]
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// Find the violation recorded for a field.
    #[must_use]
    pub fn for_field(&self, field: &str) -> Option<&FieldViolation> {
        self.violations.iter().find(|v| v.field == field)
    }
}

/// A collaborator operation failed (network, server-side rejection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{operation} failed: {message}")]
pub struct TransportError {
    /// Name of the operation (`list`, `create`, ...).
    pub operation: String,
    /// Failure description.
    pub message: String,
}

impl TransportError {
    /// Create a transport error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading a [`ViewConfig`](crate::ViewConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The document is not a JSON object.
    #[error("configuration must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// A key holds a value of the wrong shape.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// A response that arrived after its request was superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale response: request #{seq} superseded by #{latest}")]
pub(crate) struct StaleResponse {
    pub(crate) seq: u64,
    pub(crate) latest: u64,
}

/// Errors raised while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two descriptors in the same scope share a name.
    #[error("duplicate field name: {0}")]
    DuplicateName(String),

    /// One field's path runs through another field's value.
    #[error("field '{name}' is nested under field '{parent}'")]
    NameCollision {
        /// The nested name.
        name: String,
        /// The name that is a path prefix of it.
        parent: String,
    },

    /// A field name is empty or has an empty path segment.
    #[error("invalid field name: '{0}'")]
    InvalidName(String),

    /// An async-select descriptor has no fetch function bound.
    #[error("async-select field '{field}' has no fetcher for source '{source_name}'")]
    MissingFetcher {
        /// Field name.
        field: String,
        /// Declared source name.
        source_name: String,
    },

    /// A button input names an action that is not registered.
    #[error("button input '{field}' has no action bound for '{command}'")]
    MissingAction {
        /// Field name.
        field: String,
        /// Declared action name.
        command: String,
    },

    /// A composite row declared a value-level property.
    #[error("composite row '{field}' cannot carry {property}")]
    CompositeWithValue {
        /// Field name.
        field: String,
        /// The offending property.
        property: &'static str,
    },

    /// A composite row or repeatable list has no children.
    #[error("field '{0}' declares no children")]
    EmptyComposite(String),

    /// An on-change effect targets a field that does not exist.
    #[error("effect on '{field}' targets unknown field '{target}'")]
    UnknownEffectTarget {
        /// Field declaring the effect.
        field: String,
        /// Missing target.
        target: String,
    },

    /// On-change effects form a cycle.
    #[error("on-change effects form a cycle: {}", .0.join(" -> "))]
    EffectCycle(Vec<String>),

    /// A pattern rule failed to compile.
    #[error("invalid pattern on '{field}': {reason}")]
    InvalidPattern {
        /// Field name.
        field: String,
        /// Compiler message.
        reason: String,
    },

    /// The field kind is not allowed in a search bar.
    #[error("field '{field}' of kind {kind} is not supported in a search bar")]
    UnsupportedInSearch {
        /// Field name.
        field: String,
        /// Kind name.
        kind: &'static str,
    },

    /// A schema document could not be parsed.
    #[error("invalid schema document: {0}")]
    Document(String),
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Document(err.to_string())
    }
}

/// Errors raised by form editing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// No descriptor addresses this path.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The path does not address a repeatable list.
    #[error("field is not a repeatable list: {0}")]
    NotAList(String),

    /// List entry index out of range.
    #[error("entry {index} out of range for '{field}' ({len} entries)")]
    EntryOutOfRange {
        /// List field name.
        field: String,
        /// Requested index.
        index: usize,
        /// Current number of entries.
        len: usize,
    },

    /// Composite rows hold no value of their own.
    #[error("composite row '{0}' has no value of its own")]
    NoValue(String),

    /// The path does not address a button input with a bound action.
    #[error("field has no action: {0}")]
    NoAction(String),

    /// The button action failed; values were left untouched.
    #[error(transparent)]
    Action(#[from] TransportError),
}

/// Failure of a submission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// Local or server-side field violations.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The create/update operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure reported by a create/update collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    /// Server rejected individual fields.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The call itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<OperationError> for SubmitError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::Validation(e) => Self::Validation(e),
            OperationError::Transport(e) => Self::Transport(e),
        }
    }
}
