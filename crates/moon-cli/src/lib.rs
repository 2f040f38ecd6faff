//! # moon-cli
//!
//! Command-line tooling for Moon console view schemas.
//!
//! Provides commands for:
//! - Checking schema documents against descriptor invariants
//! - Validating records the way an edit form would
//! - Resolving select options from an option catalog
//! - Paging through record files with list filters

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, ListArgs, SchemaArgs};
pub use error::CliError;
pub use output::OutputFormat;
