//! Schema check command implementation.

use std::io::Write;

use moon_view::{FieldDescriptor, FieldKind};
use tracing::info;

use super::load_schema;
use crate::cli::SchemaArgs;
use crate::error::CliError;
use crate::output::{FieldSummary, OutputFormat, SchemaReport};

/// Check command executor.
#[derive(Debug, Default)]
pub struct CheckCommand;

impl CheckCommand {
    /// Create a new check command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Load the schema, reporting the first invariant it breaks, and list
    /// its fields.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &SchemaArgs,
    ) -> Result<(), CliError> {
        let report = self.report(args)?;
        info!(fields = report.fields.len(), "schema checked");
        format.write(writer, &report)
    }

    /// Build the field listing of a schema document.
    pub fn report(&self, args: &SchemaArgs) -> Result<SchemaReport, CliError> {
        let schema = load_schema(args)?;
        let mut fields = Vec::new();
        summarize(schema.fields(), "", &mut fields);
        Ok(SchemaReport {
            rows: schema.rows().len(),
            fields,
        })
    }
}

fn summarize<'a>(
    fields: impl IntoIterator<Item = &'a FieldDescriptor>,
    prefix: &str,
    out: &mut Vec<FieldSummary>,
) {
    for field in fields {
        match &field.kind {
            FieldKind::CompositeRow { children } => summarize(children, prefix, out),
            kind => {
                let path = if prefix.is_empty() {
                    field.name.clone()
                } else {
                    format!("{prefix}.{}", field.name)
                };
                out.push(FieldSummary {
                    path: path.clone(),
                    label: field.label.clone(),
                    kind: kind.name().to_string(),
                    required: field.constraints.required,
                });
                if let FieldKind::Repeatable { entry, .. } = kind {
                    summarize(entry, &format!("{path}.*"), out);
                }
            }
        }
    }
}
