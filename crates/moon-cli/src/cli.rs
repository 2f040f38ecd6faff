//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Moon console schema tooling.
#[derive(Parser, Debug, Clone)]
#[command(name = "moon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// View configuration file (JSON).
    #[arg(short, long, env = "MOON_VIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check a schema document and list its fields.
    Check(SchemaArgs),

    /// Validate a record against a schema.
    Validate {
        /// Schema and option catalog.
        #[command(flatten)]
        schema: SchemaArgs,

        /// Record document (JSON object).
        record: PathBuf,
    },

    /// Resolve the options of a select field.
    Options {
        /// Schema and option catalog.
        #[command(flatten)]
        schema: SchemaArgs,

        /// Field path, e.g. `groupId` or `labels.0.key`.
        field: String,

        /// Keyword to filter by.
        #[arg(default_value = "")]
        keyword: String,
    },

    /// Page through a record file with filters.
    List(ListArgs),
}

/// A schema document and the option catalog its async selects use.
#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Schema document (JSON array of fields and rows).
    pub schema: PathBuf,

    /// Option catalog: JSON object mapping source names to option lists.
    #[arg(short, long)]
    pub options: Option<PathBuf>,
}

/// Arguments for the list command.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Records document (JSON array of objects).
    pub records: PathBuf,

    /// Page number.
    #[arg(short, long, default_value_t = 1)]
    pub page: u32,

    /// Page size; defaults to the configured page size.
    #[arg(short, long)]
    pub size: Option<u32>,

    /// Filters (KEY=VALUE). Values parse as JSON, falling back to text.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
}
