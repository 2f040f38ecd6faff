//! CLI error types.

use std::path::PathBuf;

use moon_view::{ConfigError, FormError, SchemaError, TransportError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// A document could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A document is not the expected JSON.
    #[error("invalid document {path}: {reason}")]
    Document {
        /// File that failed.
        path: PathBuf,
        /// Parse failure.
        reason: String,
    },

    /// The view configuration file is not a valid configuration object.
    #[error("invalid config {path}: {source}")]
    Config {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: ConfigError,
    },

    /// The schema document violates a descriptor invariant.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A path does not address the expected field.
    #[error("{0}")]
    Form(#[from] FormError),

    /// A collaborator call failed.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The record has violations; details were already written.
    #[error("record has {0} violation(s)")]
    Invalid(usize),

    /// The list controller shut down before a page arrived.
    #[error("list stopped before a page was loaded")]
    Stopped,

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
