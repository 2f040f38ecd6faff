//! Option resolution command implementation.

use std::io::Write;
use std::sync::Arc;

use moon_view::{Form, Notifier, Record, ViewConfig};
use tracing::debug;

use super::{drain_notices, load_schema};
use crate::cli::SchemaArgs;
use crate::error::CliError;
use crate::output::{OptionList, OutputFormat};

/// Options command executor.
#[derive(Debug)]
pub struct OptionsCommand {
    config: ViewConfig,
}

impl OptionsCommand {
    /// Create a new options command.
    #[must_use]
    pub fn new(config: ViewConfig) -> Self {
        Self { config }
    }

    /// Resolve the options `field` shows for `keyword`.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &SchemaArgs,
        field: &str,
        keyword: &str,
    ) -> Result<(), CliError> {
        let list = self.resolve(args, field, keyword).await?;
        format.write(writer, &list)
    }

    /// Resolve without writing anything.
    pub async fn resolve(
        &self,
        args: &SchemaArgs,
        field: &str,
        keyword: &str,
    ) -> Result<OptionList, CliError> {
        let schema = Arc::new(load_schema(args)?);
        if schema.find(field).is_none() {
            return Err(moon_view::FormError::UnknownField(field.to_string()).into());
        }
        let notifier = Notifier::from_config(&self.config);
        let mut notices = notifier.subscribe();
        let form = Form::render_with(schema, &Record::new(), &self.config, Some(notifier));
        let provider = form
            .options(field)
            .ok_or_else(|| CliError::InvalidArgument(format!("'{field}' is not a select field")))?;

        let options = provider.resolve(keyword).await.into_options().unwrap_or_default();
        drain_notices(&mut notices);
        debug!(field, keyword, options = options.len(), "options resolved");
        Ok(OptionList {
            field: field.to_string(),
            keyword: keyword.to_string(),
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::*;
    use std::time::Duration;

    fn command() -> OptionsCommand {
        OptionsCommand::new(ViewConfig::default().with_debounce(Duration::ZERO))
    }

    #[tokio::test]
    async fn options_filter_catalog_by_keyword() {
        let schema = file(SCHEMA);
        let options = file(OPTIONS);

        let list = command()
            .resolve(&schema_args(&schema, Some(&options)), "groupId", "PAY")
            .await
            .unwrap();

        assert_eq!(list.options.len(), 1);
        assert_eq!(list.options[0].label, "payments");
    }

    #[tokio::test]
    async fn options_for_fixed_select() {
        let schema = file(SCHEMA);
        let options = file(OPTIONS);

        let list = command()
            .resolve(&schema_args(&schema, Some(&options)), "level", "")
            .await
            .unwrap();

        assert_eq!(list.options.len(), 2);
    }

    #[tokio::test]
    async fn options_reject_text_field() {
        let schema = file(SCHEMA);
        let options = file(OPTIONS);

        let err = command()
            .resolve(&schema_args(&schema, Some(&options)), "alert", "")
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn options_unknown_field() {
        let schema = file(SCHEMA);
        let options = file(OPTIONS);

        let err = command()
            .resolve(&schema_args(&schema, Some(&options)), "missing", "")
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Form(_)));
    }
}
