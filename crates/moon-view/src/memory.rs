//! In-process record store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{FieldViolation, OperationError, TransportError, ValidationError, ViolationKind};
use crate::list::{ListQuery, ListSource, Page};
use crate::record::{self, Record};
use crate::submit::{RecordId, RecordStore};

/// Filter key matched as a substring against every string value.
pub const KEYWORD_FILTER: &str = "keyword";

/// Records kept in memory, newest first in listings.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, Record>>,
    next_id: AtomicU64,
    latency: Duration,
    unique: Option<String>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject creates and updates that duplicate `field`.
    #[must_use]
    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique = Some(field.into());
        self
    }

    /// Make every operation fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a record directly, returning its id.
    pub fn insert(&self, mut record: Record) -> RecordId {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        record.insert("id".into(), Value::from(id.0));
        self.records.write().insert(id, record);
        id
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Records matching `filters`, newest first.
    #[must_use]
    pub fn matching(&self, filters: &Record) -> Vec<Record> {
        self.records
            .read()
            .values()
            .rev()
            .filter(|r| matches_filters(r, filters))
            .cloned()
            .collect()
    }

    async fn delay(&self, operation: &str) -> Result<(), TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::new(operation, "store unavailable"));
        }
        Ok(())
    }

    fn check_unique(&self, payload: &Record, except: Option<RecordId>) -> Result<(), ValidationError> {
        let Some(field) = &self.unique else {
            return Ok(());
        };
        let Some(value) = record::get_path(payload, field) else {
            return Ok(());
        };
        let taken = self
            .records
            .read()
            .iter()
            .any(|(id, r)| Some(*id) != except && record::get_path(r, field) == Some(value));
        if taken {
            return Err(ValidationError::new(vec![FieldViolation::new(
                field.clone(),
                ViolationKind::Rejected,
                Some(&format!("{field} already exists")),
            )]));
        }
        Ok(())
    }
}

impl ListSource for MemoryStore {
    fn list(&self, query: ListQuery) -> BoxFuture<'_, Result<Page, TransportError>> {
        Box::pin(async move {
            self.delay("list").await?;
            let matching = self.matching(&query.filters);
            let total = matching.len() as u64;
            let size = query.pagination.page_size.max(1) as usize;
            let start = (query.pagination.page_num.max(1) as usize - 1) * size;
            let items = matching.into_iter().skip(start).take(size).collect();
            debug!(total, page_num = query.pagination.page_num, "memory list");
            Ok(Page { items, total })
        })
    }
}

impl RecordStore for MemoryStore {
    fn create(&self, payload: Record) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            self.delay("create").await?;
            self.check_unique(&payload, None)?;
            let id = self.insert(payload);
            debug!(%id, "memory create");
            Ok(())
        })
    }

    fn update(&self, id: RecordId, mut payload: Record) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            self.delay("update").await?;
            self.check_unique(&payload, Some(id))?;
            let mut records = self.records.write();
            let Some(existing) = records.get_mut(&id) else {
                return Err(TransportError::new("update", format!("record {id} not found")).into());
            };
            payload.insert("id".into(), Value::from(id.0));
            *existing = payload;
            Ok(())
        })
    }

    fn get(&self, id: RecordId) -> BoxFuture<'_, Result<Record, TransportError>> {
        Box::pin(async move {
            self.delay("get").await?;
            self.records
                .read()
                .get(&id)
                .cloned()
                .ok_or_else(|| TransportError::new("get", format!("record {id} not found")))
        })
    }
}

fn matches_filters(record: &Record, filters: &Record) -> bool {
    filters.iter().all(|(key, wanted)| {
        if record::is_blank(wanted) {
            return true;
        }
        if key == KEYWORD_FILTER {
            let Some(needle) = wanted.as_str() else {
                return true;
            };
            let needle = needle.to_lowercase();
            return record
                .iter()
                .any(|(k, v)| k != KEYWORD_FILTER && contains_text(v, &needle));
        }
        match record::get_path(record, key) {
            Some(Value::Array(items)) => match wanted {
                Value::Array(any_of) => any_of.iter().any(|w| items.contains(w)),
                single => items.contains(single),
            },
            Some(value) => match wanted {
                Value::Array(any_of) => any_of.contains(value),
                single => value == single,
            },
            None => false,
        }
    })
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(record(json!({"alert": "CPU high", "status": 1, "groupIds": [1, 2]})));
        store.insert(record(json!({"alert": "Disk full", "status": 2, "groupIds": [2]})));
        store.insert(record(json!({
            "alert": "Memory",
            "status": 1,
            "annotations": {"summary": "cpu pressure"}
        })));
        store
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .filter_map(|r| r.get("alert").and_then(Value::as_str))
            .collect()
    }

    #[test]
    fn test_keyword_matches_nested_strings_case_insensitively() {
        let store = seeded();

        let found = store.matching(&record(json!({"keyword": "cpu"})));

        assert_eq!(names(&found), vec!["Memory", "CPU high"]);
    }

    #[test]
    fn test_equality_and_array_filters() {
        let store = seeded();

        assert_eq!(
            names(&store.matching(&record(json!({"status": 2})))),
            vec!["Disk full"]
        );
        assert_eq!(
            names(&store.matching(&record(json!({"groupIds": 1})))),
            vec!["CPU high"]
        );
        assert_eq!(
            names(&store.matching(&record(json!({"groupIds": [1, 2]})))),
            vec!["Disk full", "CPU high"]
        );
        assert!(store.matching(&record(json!({"status": "1"}))).is_empty());
    }

    #[test]
    fn test_blank_filters_ignored() {
        let store = seeded();
        assert_eq!(store.matching(&record(json!({"keyword": "", "status": null}))).len(), 3);
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let store = seeded();
        let query: ListQuery = serde_json::from_value(json!({
            "pagination": {"pageNum": 2, "pageSize": 2}
        }))
        .unwrap();

        let page = store.list(query).await.unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(names(&page.items), vec!["CPU high"]);
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let store = MemoryStore::new();
        let payload = record(json!({
            "alert": "latency",
            "labels": [{"key": "env", "value": "prod"}, {"key": "team", "value": "db"}]
        }));

        store.create(payload.clone()).await.unwrap();
        let mut fetched = store.get(RecordId(1)).await.unwrap();

        assert_eq!(fetched.remove("id"), Some(json!(1)));
        assert_eq!(fetched, payload);
    }

    #[tokio::test]
    async fn test_update_replaces_and_keeps_id() {
        let store = seeded();

        store
            .update(RecordId(2), record(json!({"alert": "Disk almost full"})))
            .await
            .unwrap();

        let fetched = store.get(RecordId(2)).await.unwrap();
        assert_eq!(fetched.get("alert"), Some(&json!("Disk almost full")));
        assert_eq!(fetched.get("id"), Some(&json!(2)));
        assert!(fetched.get("status").is_none());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = MemoryStore::new();

        let err = store.update(RecordId(9), Record::new()).await.unwrap_err();

        assert!(matches!(err, OperationError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unique_field_rejected() {
        let store = MemoryStore::new().with_unique("alert");
        store.insert(record(json!({"alert": "cpu"})));

        let err = store
            .create(record(json!({"alert": "cpu"})))
            .await
            .unwrap_err();

        let OperationError::Validation(violations) = err else {
            panic!("expected field violations");
        };
        assert_eq!(violations.violations[0].field, "alert");
        assert!(store.update(RecordId(1), record(json!({"alert": "cpu"}))).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = seeded();
        store.set_unavailable(true);

        let err = store.get(RecordId(1)).await.unwrap_err();

        assert_eq!(err, TransportError::new("get", "store unavailable"));
    }
}
