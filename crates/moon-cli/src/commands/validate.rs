//! Record validation command implementation.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use moon_view::{Form, Record};
use tracing::{debug, info};

use super::{load_schema, read_json};
use crate::cli::SchemaArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, ValidationReport};

/// Validate command executor.
#[derive(Debug, Default)]
pub struct ValidateCommand;

impl ValidateCommand {
    /// Create a new validate command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Render the record into a form and validate it. The report is
    /// written either way; violations then fail the command.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &SchemaArgs,
        record: &Path,
    ) -> Result<(), CliError> {
        let report = self.report(args, record)?;
        format.write(writer, &report)?;
        if report.valid {
            info!("record valid");
            Ok(())
        } else {
            Err(CliError::Invalid(report.violations.len()))
        }
    }

    /// Validate without writing anything.
    pub fn report(&self, args: &SchemaArgs, record: &Path) -> Result<ValidationReport, CliError> {
        let schema = Arc::new(load_schema(args)?);
        let initial: Record = read_json(record)?;
        let mut form = Form::render(schema, &initial);
        Ok(match form.validate() {
            Ok(values) => ValidationReport {
                valid: true,
                violations: Vec::new(),
                values: Some(values),
            },
            Err(err) => {
                debug!(violations = err.violations.len(), "record invalid");
                ValidationReport {
                    valid: false,
                    violations: err.violations,
                    values: None,
                }
            }
        })
    }
}
