//! Record listing command implementation.

use std::io::Write;
use std::sync::Arc;

use moon_view::{ListController, ListSource, MemoryStore, Notifier, Record, ViewConfig};
use serde_json::Value;
use tracing::debug;

use super::{drain_notices, read_json};
use crate::cli::ListArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, PageReport};

/// List command executor.
#[derive(Debug)]
pub struct ListCommand {
    config: ViewConfig,
}

impl ListCommand {
    /// Create a new list command.
    #[must_use]
    pub fn new(config: ViewConfig) -> Self {
        Self { config }
    }

    /// Load the records into a memory store and show one page.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ListArgs,
    ) -> Result<(), CliError> {
        let page = self.page(args).await?;
        format.write(writer, &page)
    }

    /// Fetch the requested page without writing anything.
    pub async fn page(&self, args: &ListArgs) -> Result<PageReport, CliError> {
        let filters = parse_filters(&args.filters)?;
        let records: Vec<Record> = read_json(&args.records)?;
        let store = MemoryStore::new();
        for record in records {
            store.insert(record);
        }
        debug!(records = store.len(), "records loaded");

        let size = args.size.unwrap_or(self.config.default_page_size).max(1);
        let config = self.config.clone().with_default_page_size(size);
        let source: Arc<dyn ListSource> = Arc::new(store);
        let notifier = Notifier::from_config(&config);
        let mut notices = notifier.subscribe();
        let list = ListController::builder(source)
            .config(&config)
            .filters(filters)
            .notifier(notifier)
            .build();

        list.turn_page(args.page, size);
        list.mount();
        let mut snapshots = list.subscribe();
        let snapshot = snapshots
            .wait_for(|s| !s.loading)
            .await
            .map_err(|_| CliError::Stopped)?
            .clone();
        list.teardown();
        drain_notices(&mut notices);

        if let Some(err) = snapshot.last_error {
            return Err(err.into());
        }
        Ok(PageReport {
            page_num: snapshot.page_num,
            page_size: snapshot.page_size,
            total: snapshot.total,
            items: snapshot.items,
        })
    }
}

/// Parse `KEY=VALUE` filters. Values are JSON when they parse as JSON and
/// text otherwise.
pub fn parse_filters(raw: &[String]) -> Result<Record, CliError> {
    let mut filters = Record::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| CliError::InvalidArgument(format!("filter '{item}' is not KEY=VALUE")))?;
        if key.is_empty() {
            return Err(CliError::InvalidArgument(format!("filter '{item}' has no key")));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        filters.insert(key.to_string(), value);
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::file;
    use serde_json::json;
    use std::time::Duration;

    const RECORDS: &str = r#"[
        {"alert": "cpu high", "status": 1},
        {"alert": "disk full", "status": 2},
        {"alert": "cpu steal", "status": 2},
        {"alert": "memory", "status": 1},
        {"alert": "latency", "status": 1}
    ]"#;

    fn args(records: &tempfile::NamedTempFile, page: u32, size: u32, filters: &[&str]) -> ListArgs {
        ListArgs {
            records: records.path().to_path_buf(),
            page,
            size: Some(size),
            filters: filters.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    fn command() -> ListCommand {
        ListCommand::new(ViewConfig::default().with_debounce(Duration::from_millis(10)))
    }

    fn alerts(page: &PageReport) -> Vec<&str> {
        page.items
            .iter()
            .filter_map(|r| r.get("alert").and_then(Value::as_str))
            .collect()
    }

    #[test]
    fn parse_filters_json_and_text() {
        let filters = parse_filters(&["status=2".into(), "keyword=cpu".into()]).unwrap();
        assert_eq!(Value::Object(filters), json!({"status": 2, "keyword": "cpu"}));
        assert!(parse_filters(&["status".into()]).is_err());
        assert!(parse_filters(&["=2".into()]).is_err());
    }

    #[tokio::test]
    async fn list_second_page() {
        let records = file(RECORDS);

        let page = command().page(&args(&records, 2, 2, &[])).await.unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.page_num, 2);
        assert_eq!(alerts(&page), vec!["cpu steal", "disk full"]);
    }

    #[tokio::test]
    async fn list_with_filters() {
        let records = file(RECORDS);

        let page = command()
            .page(&args(&records, 1, 10, &["keyword=CPU", "status=2"]))
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(alerts(&page), vec!["cpu steal"]);
    }

    #[tokio::test]
    async fn list_page_beyond_last_is_clamped() {
        let records = file(RECORDS);

        let page = command().page(&args(&records, 9, 2, &[])).await.unwrap();

        assert_eq!(page.page_num, 3);
        assert_eq!(alerts(&page), vec!["cpu high"]);
    }
}
