//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use moon_view::{FieldViolation, Record, SelectOption};
use serde::Serialize;
use serde_json::Value;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// One field of a checked schema.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    /// Record path; list entries use `*` for the index.
    pub path: String,
    /// Display text.
    pub label: String,
    /// Kind name.
    pub kind: String,
    /// Whether the field is required.
    pub required: bool,
}

/// Result of `moon check`.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    /// Number of layout rows.
    pub rows: usize,
    /// Fields in schema order.
    pub fields: Vec<FieldSummary>,
}

impl TableDisplay for SchemaReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{:<28}  {:<20}  {:<14}  {:<8}", "PATH", "LABEL", "KIND", "REQUIRED")?;
        writeln!(writer, "{}", "─".repeat(76))?;
        for field in &self.fields {
            writeln!(
                writer,
                "{:<28}  {:<20}  {:<14}  {:<8}",
                truncate(&field.path, 28),
                truncate(&field.label, 20),
                field.kind,
                if field.required { "yes" } else { "" }
            )?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "Schema OK: {} field(s) in {} row(s)",
            self.fields.len(),
            self.rows
        )?;
        Ok(())
    }
}

/// Result of `moon validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Whether the record passed.
    pub valid: bool,
    /// Violations in schema order.
    pub violations: Vec<FieldViolation>,
    /// Visible values submitted on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Record>,
}

impl TableDisplay for ValidationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.valid {
            writeln!(writer, "Record is valid")?;
            return Ok(());
        }
        writeln!(writer, "{:<28}  {}", "FIELD", "MESSAGE")?;
        writeln!(writer, "{}", "─".repeat(60))?;
        for violation in &self.violations {
            writeln!(writer, "{:<28}  {}", truncate(&violation.field, 28), violation.message)?;
        }
        Ok(())
    }
}

/// Result of `moon options`.
#[derive(Debug, Clone, Serialize)]
pub struct OptionList {
    /// Field the options belong to.
    pub field: String,
    /// Keyword used.
    pub keyword: String,
    /// Resolved options.
    pub options: Vec<SelectOption>,
}

impl TableDisplay for OptionList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.options.is_empty() {
            writeln!(writer, "No options for {} matching '{}'", self.field, self.keyword)?;
            return Ok(());
        }
        writeln!(writer, "{:<20}  {}", "VALUE", "LABEL")?;
        writeln!(writer, "{}", "─".repeat(48))?;
        for option in &self.options {
            let label = if option.disabled {
                format!("{} (disabled)", option.label)
            } else {
                option.label.clone()
            };
            writeln!(writer, "{:<20}  {}", truncate(&compact(&option.value), 20), label)?;
        }
        Ok(())
    }
}

/// Result of `moon list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    /// Page shown.
    pub page_num: u32,
    /// Page size.
    pub page_size: u32,
    /// Matching records.
    pub total: u64,
    /// Records on the page.
    pub items: Vec<Record>,
}

impl TableDisplay for PageReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.items.is_empty() {
            writeln!(writer, "No records")?;
            return Ok(());
        }
        for item in &self.items {
            let id = item.get("id").map(compact).unwrap_or_default();
            let rest: Vec<String> = item
                .iter()
                .filter(|(key, _)| key.as_str() != "id")
                .map(|(key, value)| format!("{key}={}", compact(value)))
                .collect();
            writeln!(writer, "{:>6}  {}", id, truncate(&rest.join(" "), 100))?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "Page {} of {} ({} record(s))",
            self.page_num,
            moon_view::last_page(self.total, self.page_size),
            self.total
        )?;
        Ok(())
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate a string to a maximum number of characters.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
