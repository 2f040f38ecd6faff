//! Form interpreter.
//!
//! A [`Form`] holds the editable values of one schema, applies on-change
//! effects, validates, and produces a [`FormView`] any front end can draw.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ViewConfig;
use crate::error::{FieldViolation, FormError, ValidationError};
use crate::notice::Notifier;
use crate::options::{OptionProvider, SelectOption};
use crate::record::{self, Record};
use crate::schema::{self, FieldDescriptor, FieldEffect, FieldKind, Schema};

/// Editable state of one schema.
#[derive(Debug)]
pub struct Form {
    schema: Arc<Schema>,
    initial: Record,
    values: Record,
    errors: BTreeMap<String, FieldViolation>,
    providers: HashMap<String, OptionProvider>,
    notifier: Option<Notifier>,
}

impl Form {
    /// Render `schema` with `initial` values overlaid on the schema defaults.
    pub fn render(schema: Arc<Schema>, initial: &Record) -> Self {
        Self::render_with(schema, initial, &ViewConfig::default(), None)
    }

    /// Render with explicit configuration and a notifier for option
    /// fetch and button action failures.
    pub fn render_with(
        schema: Arc<Schema>,
        initial: &Record,
        config: &ViewConfig,
        notifier: Option<Notifier>,
    ) -> Self {
        let mut values = schema.defaults();
        record::merge(&mut values, initial);

        let mut providers = HashMap::new();
        register_providers(schema.fields(), "", config, notifier.as_ref(), &mut providers);

        Self {
            schema,
            initial: values.clone(),
            values,
            errors: BTreeMap::new(),
            providers,
            notifier,
        }
    }

    /// The schema this form renders.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Current value at `path`, visible or not.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<&Value> {
        record::get_path(&self.values, path)
    }

    /// The visible values as a structured record.
    #[must_use]
    pub fn values(&self) -> Record {
        self.schema.visible_values(&self.values)
    }

    /// Validate; on success returns the visible values.
    pub fn validate(&mut self) -> Result<Record, ValidationError> {
        self.errors.clear();
        match self.schema.validate_record(&self.values) {
            Ok(()) => Ok(self.values()),
            Err(err) => {
                debug!(violations = err.violations.len(), "form validation failed");
                self.apply_violations(&err);
                Err(err)
            }
        }
    }

    /// Restore the values the form was rendered with.
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.errors.clear();
    }

    /// Replace the value [`Form::reset`] restores at `path`.
    pub(crate) fn set_initial(&mut self, path: &str, value: Value) -> Result<(), FormError> {
        if self.schema.find(path).is_none() || !record::set_path(&mut self.initial, path, value) {
            return Err(FormError::UnknownField(path.to_string()));
        }
        Ok(())
    }

    /// Restore the schema defaults.
    pub fn clear(&mut self) {
        self.values = self.schema.defaults();
        self.errors.clear();
    }

    /// Show violations (local or server-reported) next to their fields.
    pub fn apply_violations(&mut self, err: &ValidationError) {
        for violation in &err.violations {
            self.errors
                .insert(violation.field.clone(), violation.clone());
        }
    }

    /// Violation currently shown for `path`.
    #[must_use]
    pub fn error(&self, path: &str) -> Option<&FieldViolation> {
        self.errors.get(path)
    }

    /// All violations currently shown, ordered by path.
    pub fn errors(&self) -> impl Iterator<Item = &FieldViolation> {
        self.errors.values()
    }

    /// Option provider of the select at `path`. Entry paths share the
    /// provider of their list column.
    #[must_use]
    pub fn options(&self, path: &str) -> Option<&OptionProvider> {
        self.providers.get(&provider_key(path))
    }

    /// Set a field value and apply on-change effects transitively.
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), FormError> {
        let schema = Arc::clone(&self.schema);
        if schema
            .fields()
            .any(|f| f.name == path && !f.kind.has_value())
        {
            return Err(FormError::NoValue(path.to_string()));
        }
        let field = schema
            .find(path)
            .ok_or_else(|| FormError::UnknownField(path.to_string()))?;
        if !record::set_path(&mut self.values, path, value) {
            return Err(FormError::UnknownField(path.to_string()));
        }
        self.errors.remove(path);

        self.propagate(&schema, VecDeque::from([(path.to_string(), field)]));
        Ok(())
    }

    /// Run the action bound to the button input at `path` and apply the
    /// patch it returns to the button's scope, with on-change effects.
    /// A failed action leaves the values untouched and raises an error
    /// notice.
    pub async fn press(&mut self, path: &str) -> Result<(), FormError> {
        let schema = Arc::clone(&self.schema);
        let field = schema
            .find(path)
            .ok_or_else(|| FormError::UnknownField(path.to_string()))?;
        let FieldKind::ButtonInput {
            handler: Some(handler),
            ..
        } = &field.kind
        else {
            return Err(FormError::NoAction(path.to_string()));
        };

        let value = record::get_path(&self.values, path)
            .cloned()
            .unwrap_or(Value::Null);
        let prefix = scope_prefix(path, &field.name);
        debug!(field = %path, "running button action");
        let patch = match handler.run(value, self.scope_values(prefix)).await {
            Ok(patch) => patch,
            Err(err) => {
                warn!(field = %path, error = %err, "button action failed");
                if let Some(notifier) = &self.notifier {
                    notifier.error(err.to_string());
                }
                return Err(err.into());
            }
        };

        let patch = patch
            .iter()
            .map(|(target, value)| (target.to_string(), value.clone()))
            .collect();
        let mut queue = VecDeque::new();
        self.write_patch(&schema, path, prefix, patch, &mut queue);
        self.propagate(&schema, queue);
        Ok(())
    }

    /// Append an entry with default values to the list at `path`.
    /// Returns the index of the new entry.
    pub fn add_entry(&mut self, path: &str) -> Result<usize, FormError> {
        let entry = self.list_entry(path)?;
        let defaults = schema::scope_defaults(entry);

        let len = self.entries_len(path);
        if len == 0 {
            record::set_path(&mut self.values, path, Value::Array(Vec::new()));
        }
        record::set_path(&mut self.values, &format!("{path}.{len}"), Value::Object(defaults));
        self.errors.remove(path);
        Ok(len)
    }

    /// Remove entry `index` of the list at `path`. Errors of the removed
    /// entry are dropped and those of later entries move down.
    pub fn remove_entry(&mut self, path: &str, index: usize) -> Result<Value, FormError> {
        self.list_entry(path)?;
        let len = self.entries_len(path);
        if index >= len {
            return Err(FormError::EntryOutOfRange {
                field: path.to_string(),
                index,
                len,
            });
        }
        let removed = record::remove_path(&mut self.values, &format!("{path}.{index}"))
            .unwrap_or(Value::Null);

        let prefix = format!("{path}.");
        let errors = std::mem::take(&mut self.errors);
        for (key, mut violation) in errors {
            let Some(rest) = key.strip_prefix(&prefix) else {
                self.errors.insert(key, violation);
                continue;
            };
            let (n, tail) = rest.split_once('.').unwrap_or((rest, ""));
            match n.parse::<usize>() {
                Ok(n) if n == index => {}
                Ok(n) if n > index => {
                    let moved = if tail.is_empty() {
                        format!("{path}.{}", n - 1)
                    } else {
                        format!("{path}.{}.{tail}", n - 1)
                    };
                    violation.field.clone_from(&moved);
                    self.errors.insert(moved, violation);
                }
                _ => {
                    self.errors.insert(key, violation);
                }
            }
        }
        Ok(removed)
    }

    /// Build the view model.
    #[must_use]
    pub fn view(&self) -> FormView {
        let mut rows = Vec::new();
        for row in self.schema.rows() {
            let (label, fields): (Option<String>, Vec<&FieldDescriptor>) = match row.fields.as_slice() {
                [single] if row.full_width => match &single.kind {
                    FieldKind::CompositeRow { children } if single.is_visible(&self.values) => {
                        (Some(single.label.clone()), children.iter().collect())
                    }
                    _ => (None, vec![single]),
                },
                fields => (None, fields.iter().collect()),
            };
            let mut widgets = Vec::new();
            self.widgets(&fields, &self.values, "", &mut widgets);
            if !widgets.is_empty() {
                rows.push(RowView {
                    label,
                    full_width: row.full_width,
                    widgets,
                });
            }
        }
        FormView { rows }
    }

    fn widgets(
        &self,
        fields: &[&FieldDescriptor],
        scope: &Record,
        prefix: &str,
        out: &mut Vec<WidgetView>,
    ) {
        for field in fields {
            if !field.is_visible(scope) {
                continue;
            }
            let path = record::join(prefix, &field.name);
            let widget = match &field.kind {
                FieldKind::CompositeRow { children } => {
                    let children: Vec<&FieldDescriptor> = children.iter().collect();
                    self.widgets(&children, scope, prefix, out);
                    continue;
                }
                FieldKind::Text => Widget::Text,
                FieldKind::Number { min, max } => Widget::Number {
                    min: *min,
                    max: *max,
                },
                FieldKind::Textarea { max_length } => Widget::Textarea {
                    max_length: *max_length,
                },
                FieldKind::SingleSelect { options } | FieldKind::RadioGroup { options } => {
                    let radio = matches!(field.kind, FieldKind::RadioGroup { .. });
                    Widget::Select {
                        options: options.clone(),
                        multiple: false,
                        radio,
                        loading: false,
                    }
                }
                FieldKind::MultiSelect { options } => Widget::Select {
                    options: options.clone(),
                    multiple: true,
                    radio: false,
                    loading: false,
                },
                FieldKind::AsyncSelect { multiple, .. } => {
                    let provider = self.options(&path);
                    Widget::Select {
                        options: provider.map(OptionProvider::current).unwrap_or_default(),
                        multiple: *multiple,
                        radio: false,
                        loading: provider.is_some_and(OptionProvider::is_loading),
                    }
                }
                FieldKind::ButtonInput {
                    action, handler, ..
                } => Widget::ButtonInput {
                    action: action.clone(),
                    pressable: handler.is_some(),
                },
                FieldKind::Repeatable { entry, .. } => {
                    let entry: Vec<&FieldDescriptor> = entry.iter().collect();
                    let items = record::get_path(scope, &field.name)
                        .and_then(Value::as_array)
                        .map_or(&[][..], Vec::as_slice);
                    let empty = Record::new();
                    let entries = items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            let mut cells = Vec::new();
                            let item_scope = item.as_object().unwrap_or(&empty);
                            self.widgets(&entry, item_scope, &format!("{path}.{index}"), &mut cells);
                            cells
                        })
                        .collect();
                    Widget::List { entries }
                }
            };
            out.push(WidgetView {
                value: record::get_path(scope, &field.name)
                    .cloned()
                    .unwrap_or(Value::Null),
                error: self.errors.get(&path).map(|v| v.message.clone()),
                label: field.label.clone(),
                required: field.constraints.required,
                placeholder: field.hints.placeholder.clone(),
                path,
                widget,
            });
        }
    }

    /// Apply the on-change effects of the queued fields breadth-first.
    fn propagate<'s>(
        &mut self,
        schema: &'s Schema,
        mut queue: VecDeque<(String, &'s FieldDescriptor)>,
    ) {
        while let Some((changed_path, field)) = queue.pop_front() {
            let Some(effect) = &field.on_change else {
                continue;
            };
            let prefix = scope_prefix(&changed_path, &field.name);
            let patch = self.effect_patch(schema, effect, &changed_path, prefix);
            self.write_patch(schema, &changed_path, prefix, patch, &mut queue);
        }
    }

    /// Write `patch` into the scope at `prefix` and queue every written
    /// field. Targets outside the schema are skipped.
    fn write_patch<'s>(
        &mut self,
        schema: &'s Schema,
        from: &str,
        prefix: &str,
        patch: Vec<(String, Value)>,
        queue: &mut VecDeque<(String, &'s FieldDescriptor)>,
    ) {
        for (target, value) in patch {
            let full = record::join(prefix, &target);
            let Some(target_field) = schema.find(&full) else {
                warn!(from = %from, field = %full, "patch targets an unknown field");
                continue;
            };
            debug!(from = %from, to = %full, "applying on-change effect");
            record::set_path(&mut self.values, &full, value);
            self.errors.remove(&full);
            queue.push_back((full, target_field));
        }
    }

    /// Values of the scope at `prefix`; the whole record at the top level.
    fn scope_values(&self, prefix: &str) -> Record {
        if prefix.is_empty() {
            self.values.clone()
        } else {
            record::get_path(&self.values, prefix)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn effect_patch(
        &self,
        schema: &Schema,
        effect: &FieldEffect,
        changed_path: &str,
        prefix: &str,
    ) -> Vec<(String, Value)> {
        let default_of = |target: &str| {
            schema
                .find(&record::join(prefix, target))
                .map_or(Value::Null, FieldDescriptor::default_value_or_empty)
        };
        match effect {
            FieldEffect::Reset { targets } => targets
                .iter()
                .map(|t| (t.clone(), default_of(t)))
                .collect(),
            FieldEffect::Assign { target, value } => vec![(target.clone(), value.clone())],
            FieldEffect::Custom { targets, reducer } => {
                let changed = record::get_path(&self.values, changed_path)
                    .cloned()
                    .unwrap_or(Value::Null);
                reducer
                    .apply(&changed, &self.scope_values(prefix))
                    .iter()
                    .filter_map(|(target, value)| {
                        if targets.iter().any(|t| t == target) {
                            Some((target.to_string(), value.clone()))
                        } else {
                            warn!(from = %changed_path, field = %target, "reducer patched an undeclared field");
                            None
                        }
                    })
                    .collect()
            }
        }
    }

    fn list_entry(&self, path: &str) -> Result<&[FieldDescriptor], FormError> {
        let field = self
            .schema
            .find(path)
            .ok_or_else(|| FormError::UnknownField(path.to_string()))?;
        match &field.kind {
            FieldKind::Repeatable { entry, .. } => Ok(entry),
            _ => Err(FormError::NotAList(path.to_string())),
        }
    }

    fn entries_len(&self, path: &str) -> usize {
        record::get_path(&self.values, path)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Path of the scope containing `path`, whose descriptor is named `name`.
fn scope_prefix<'a>(path: &'a str, name: &str) -> &'a str {
    path.strip_suffix(name)
        .map_or("", |p| p.strip_suffix('.').unwrap_or(p))
}

/// Provider key of a path: list indexes are dropped.
fn provider_key(path: &str) -> String {
    record::segments(path)
        .filter(|s| s.parse::<usize>().is_err())
        .collect::<Vec<_>>()
        .join(".")
}

fn register_providers<'a>(
    fields: impl IntoIterator<Item = &'a FieldDescriptor>,
    prefix: &str,
    config: &ViewConfig,
    notifier: Option<&Notifier>,
    out: &mut HashMap<String, OptionProvider>,
) {
    for field in fields {
        let key = record::join(prefix, &field.name);
        let provider = match &field.kind {
            FieldKind::CompositeRow { children } => {
                register_providers(children, prefix, config, notifier, out);
                continue;
            }
            FieldKind::Repeatable { entry, .. } => {
                register_providers(entry, &key, config, notifier, out);
                continue;
            }
            FieldKind::SingleSelect { options }
            | FieldKind::MultiSelect { options }
            | FieldKind::RadioGroup { options } => OptionProvider::fixed(key.clone(), options.clone()),
            FieldKind::AsyncSelect {
                fetcher: Some(fetcher),
                filters,
                ..
            } => {
                let provider = OptionProvider::remote(key.clone(), Arc::clone(fetcher), config)
                    .with_filters(filters.clone());
                match notifier {
                    Some(n) => provider.with_notifier(n.clone()),
                    None => provider,
                }
            }
            _ => continue,
        };
        out.insert(key, provider);
    }
}

/// Rows of widgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    /// Rows in schema order; rows without visible widgets are omitted.
    pub rows: Vec<RowView>,
}

impl FormView {
    /// Find a widget by path, searching list entries too.
    #[must_use]
    pub fn widget(&self, path: &str) -> Option<&WidgetView> {
        fn find<'a>(widgets: &'a [WidgetView], path: &str) -> Option<&'a WidgetView> {
            widgets.iter().find_map(|w| {
                if w.path == path {
                    return Some(w);
                }
                match &w.widget {
                    Widget::List { entries } => entries.iter().find_map(|e| find(e, path)),
                    _ => None,
                }
            })
        }
        self.rows.iter().find_map(|r| find(&r.widgets, path))
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    /// Composite label, when the row renders a composite.
    pub label: Option<String>,
    /// Declared as a bare descriptor.
    pub full_width: bool,
    /// Widgets left to right.
    pub widgets: Vec<WidgetView>,
}

/// One rendered input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    /// Full value path.
    pub path: String,
    /// Display text.
    pub label: String,
    /// Input to draw.
    pub widget: Widget,
    /// Current value.
    pub value: Value,
    /// Violation message to show.
    pub error: Option<String>,
    /// Marked as required.
    pub required: bool,
    /// Placeholder text.
    pub placeholder: Option<String>,
}

/// Input to draw for a widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Widget {
    /// Single-line text.
    Text,
    /// Number input.
    Number {
        /// Minimum.
        min: Option<f64>,
        /// Maximum.
        max: Option<f64>,
    },
    /// Multi-line text.
    Textarea {
        /// Length limit.
        max_length: Option<usize>,
    },
    /// Select, multi-select or radio group.
    Select {
        /// Options to show.
        options: Vec<SelectOption>,
        /// Several values allowed.
        multiple: bool,
        /// Draw as radio buttons.
        radio: bool,
        /// Options are being fetched.
        loading: bool,
    },
    /// Text input with a button.
    ButtonInput {
        /// Button caption.
        action: String,
        /// An action is bound to the button.
        pressable: bool,
    },
    /// Dynamic list; one widget row per entry.
    List {
        /// Entry rows.
        entries: Vec<Vec<WidgetView>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;
    use crate::options::{Resolution, StaticFetcher};
    use crate::error::TransportError;
    use crate::notice::NoticeLevel;
    use crate::schema::{action_fn, Patch, Reducer, Visibility};
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn strategy_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                crate::schema::SchemaItem::from(vec![
                    FieldDescriptor::text("alert", "Name").required("enter a name"),
                    FieldDescriptor::select(
                        "level",
                        "Level",
                        vec![SelectOption::new(1, "critical"), SelectOption::new(2, "warning")],
                    )
                    .default_value(json!(2)),
                ]),
                FieldDescriptor::async_select(
                    "groupId",
                    "Group",
                    Arc::new(StaticFetcher::new(vec![
                        SelectOption::new(7, "payments"),
                        SelectOption::new(8, "search"),
                    ])),
                )
                .into(),
                FieldDescriptor::textarea("expr", "Expression")
                    .required("enter an expression")
                    .into(),
                FieldDescriptor::repeatable(
                    "labels",
                    "Labels",
                    vec![
                        FieldDescriptor::text("key", "Key").required("key required"),
                        FieldDescriptor::text("value", "Value").required("value required"),
                    ],
                )
                .into(),
                FieldDescriptor::composite(
                    "annotations",
                    "Annotations",
                    vec![
                        FieldDescriptor::text("annotations.summary", "Summary"),
                        FieldDescriptor::text("annotations.description", "Description"),
                    ],
                )
                .into(),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_render_overlays_initial_on_defaults() {
        let form = Form::render(strategy_schema(), &record(json!({"alert": "cpu"})));

        assert_eq!(form.value("alert"), Some(&json!("cpu")));
        assert_eq!(form.value("level"), Some(&json!(2)));
        assert_eq!(form.value("labels"), Some(&json!([])));
    }

    #[test]
    fn test_values_are_nested_record() {
        let mut form = Form::render(strategy_schema(), &Record::new());
        form.set_value("annotations.summary", json!("cpu high")).unwrap();

        let values = form.values();

        assert_eq!(
            values.get("annotations"),
            Some(&json!({"summary": "cpu high", "description": null}))
        );
    }

    #[test]
    fn test_view_groups_rows() {
        let form = Form::render(strategy_schema(), &Record::new());
        let view = form.view();

        assert_eq!(view.rows.len(), 5);
        assert!(!view.rows[0].full_width);
        assert_eq!(view.rows[0].widgets.len(), 2);
        assert_eq!(view.rows[4].label.as_deref(), Some("Annotations"));
        assert_eq!(view.rows[4].widgets.len(), 2);
        assert_eq!(view.rows[4].widgets[0].path, "annotations.summary");
    }

    #[test]
    fn test_view_shows_select_options() {
        let form = Form::render(strategy_schema(), &Record::new());
        let view = form.view();
        let level = view.widget("level").unwrap();

        match &level.widget {
            Widget::Select { options, multiple, .. } => {
                assert_eq!(options.len(), 2);
                assert!(!multiple);
            }
            other => panic!("unexpected widget {other:?}"),
        }
        assert_eq!(level.value, json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_select_options_in_view() {
        let form = Form::render(strategy_schema(), &Record::new());

        let provider = form.options("groupId").unwrap();
        let resolved = provider.resolve("pay").await;

        assert_eq!(resolved, Resolution::Options(vec![SelectOption::new(7, "payments")]));
        match &form.view().widget("groupId").unwrap().widget {
            Widget::Select { options, loading, .. } => {
                assert_eq!(options.len(), 1);
                assert!(!loading);
            }
            other => panic!("unexpected widget {other:?}"),
        }
    }

    #[test]
    fn test_validate_collects_and_shows_errors() {
        let mut form = Form::render(strategy_schema(), &Record::new());

        let err = form.validate().unwrap_err();

        assert_eq!(err.violations.len(), 2);
        assert_eq!(form.error("alert").map(|v| v.message.as_str()), Some("enter a name"));
        let view = form.view();
        assert_eq!(view.widget("expr").unwrap().error.as_deref(), Some("enter an expression"));
    }

    #[test]
    fn test_set_value_clears_error() {
        let mut form = Form::render(strategy_schema(), &Record::new());
        let _ = form.validate();

        form.set_value("alert", json!("disk")).unwrap();

        assert!(form.error("alert").is_none());
        assert!(form.error("expr").is_some());
    }

    #[test]
    fn test_validate_success_returns_values() {
        let mut form = Form::render(
            strategy_schema(),
            &record(json!({"alert": "cpu", "expr": "up == 0"})),
        );

        let values = form.validate().unwrap();

        assert_eq!(values.get("alert"), Some(&json!("cpu")));
        assert_eq!(values.get("level"), Some(&json!(2)));
    }

    #[test]
    fn test_entries_add_remove_and_reindex_errors() {
        let mut form = Form::render(
            strategy_schema(),
            &record(json!({"alert": "cpu", "expr": "x"})),
        );
        assert_eq!(form.add_entry("labels").unwrap(), 0);
        assert_eq!(form.add_entry("labels").unwrap(), 1);
        assert_eq!(form.add_entry("labels").unwrap(), 2);
        form.set_value("labels.0.key", json!("env")).unwrap();
        form.set_value("labels.0.value", json!("prod")).unwrap();
        form.set_value("labels.2.key", json!("team")).unwrap();

        let err = form.validate().unwrap_err();
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["labels.1.key", "labels.1.value", "labels.2.value"]);

        form.remove_entry("labels", 1).unwrap();

        assert!(form.error("labels.1.key").is_none());
        assert_eq!(
            form.error("labels.1.value").map(|v| v.field.as_str()),
            Some("labels.1.value")
        );
        assert!(form.error("labels.2.value").is_none());
        assert_eq!(form.value("labels.1.key"), Some(&json!("team")));
    }

    #[test]
    fn test_entry_errors() {
        let mut form = Form::render(strategy_schema(), &Record::new());

        assert_eq!(
            form.remove_entry("labels", 0),
            Err(FormError::EntryOutOfRange {
                field: "labels".into(),
                index: 0,
                len: 0
            })
        );
        assert_eq!(form.add_entry("alert"), Err(FormError::NotAList("alert".into())));
        assert_eq!(form.add_entry("nope"), Err(FormError::UnknownField("nope".into())));
        assert_eq!(
            form.set_value("annotations", json!({})),
            Err(FormError::NoValue("annotations".into()))
        );
        assert_eq!(
            form.set_value("missing", json!(1)),
            Err(FormError::UnknownField("missing".into()))
        );
    }

    fn escalation_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![FieldDescriptor::repeatable(
                "levels",
                "Escalation levels",
                vec![
                    FieldDescriptor::number("delay", "Delay (min)").default_value(json!(5)),
                    FieldDescriptor::repeatable(
                        "headers",
                        "Webhook headers",
                        vec![
                            FieldDescriptor::text("key", "Header").required("header required"),
                            FieldDescriptor::text("value", "Value"),
                        ],
                    ),
                ],
            )])
            .unwrap(),
        )
    }

    #[test]
    fn test_nested_lists_edit_validate_and_reindex() {
        let mut form = Form::render(escalation_schema(), &Record::new());
        assert_eq!(form.add_entry("levels").unwrap(), 0);
        assert_eq!(form.value("levels.0"), Some(&json!({"delay": 5, "headers": []})));

        for _ in 0..3 {
            form.add_entry("levels.0.headers").unwrap();
        }
        form.set_value("levels.0.headers.0.key", json!("X-Team")).unwrap();
        form.set_value("levels.0.headers.2.key", json!("X-Env")).unwrap();

        let err = form.validate().unwrap_err();
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["levels.0.headers.1.key"]);

        form.set_value("levels.0.headers.2.value", json!("prod")).unwrap();
        form.remove_entry("levels.0.headers", 0).unwrap();

        assert_eq!(
            form.error("levels.0.headers.0.key").map(|v| v.field.as_str()),
            Some("levels.0.headers.0.key")
        );
        assert!(form.error("levels.0.headers.1.key").is_none());
        assert_eq!(
            form.values().get("levels"),
            Some(&json!([{
                "delay": 5,
                "headers": [{"key": null, "value": null}, {"key": "X-Env", "value": "prod"}]
            }]))
        );

        let view = form.view();
        assert!(view.widget("levels.0.headers.1.value").is_some());
        assert_eq!(
            form.add_entry("levels.0.delay"),
            Err(FormError::NotAList("levels.0.delay".into()))
        );
    }

    fn connection_schema() -> Arc<Schema> {
        let check = action_fn(|endpoint: Value, scope: Record| async move {
            match endpoint.as_str() {
                Some(url) if url.starts_with("http") => Ok(Patch::new()
                    .set("verified", json!(true))
                    .set("checkedFor", scope.get("storageType").cloned().unwrap_or_default())),
                _ => Err(TransportError::new("test connection", "connection refused")),
            }
        });
        Arc::new(
            Schema::new(vec![
                FieldDescriptor::radio_group(
                    "storageType",
                    "Storage",
                    vec![SelectOption::new(1, "prometheus"), SelectOption::new(2, "victoria")],
                )
                .default_value(json!(1)),
                FieldDescriptor::button_input("endpoint", "Endpoint", "Test connection")
                    .on_press(check)
                    .on_change(FieldEffect::Assign {
                        target: "verified".into(),
                        value: json!(false),
                    }),
                FieldDescriptor::select(
                    "verified",
                    "Verified",
                    vec![SelectOption::new(true, "yes"), SelectOption::new(false, "no")],
                )
                .on_change(FieldEffect::Assign {
                    target: "note".into(),
                    value: json!("connection checked"),
                }),
                FieldDescriptor::number("checkedFor", "Checked for"),
                FieldDescriptor::button_input("note", "Note", "Copy"),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_press_applies_action_patch() {
        let mut form = Form::render(connection_schema(), &Record::new());
        form.set_value("endpoint", json!("http://prom:9090")).unwrap();
        form.set_value("note", json!(null)).unwrap();
        assert_eq!(form.value("verified"), Some(&json!(false)));

        form.press("endpoint").await.unwrap();

        assert_eq!(form.value("verified"), Some(&json!(true)));
        assert_eq!(form.value("checkedFor"), Some(&json!(1)));
        assert_eq!(form.value("note"), Some(&json!("connection checked")));
        assert_eq!(form.value("endpoint"), Some(&json!("http://prom:9090")));

        form.set_value("endpoint", json!("http://vm:8428")).unwrap();
        assert_eq!(form.value("verified"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_press_failure_keeps_values_and_notifies() {
        let notifier = Notifier::new(4);
        let mut notices = notifier.subscribe();
        let mut form = Form::render_with(
            connection_schema(),
            &record(json!({"endpoint": "prom:9090", "verified": false})),
            &ViewConfig::default(),
            Some(notifier),
        );

        let err = form.press("endpoint").await.unwrap_err();

        assert_eq!(
            err,
            FormError::Action(TransportError::new("test connection", "connection refused"))
        );
        assert_eq!(form.value("verified"), Some(&json!(false)));
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "test connection failed: connection refused");
    }

    #[tokio::test]
    async fn test_press_requires_bound_action() {
        let mut form = Form::render(connection_schema(), &Record::new());

        assert_eq!(form.press("note").await, Err(FormError::NoAction("note".into())));
        assert_eq!(form.press("verified").await, Err(FormError::NoAction("verified".into())));
        assert_eq!(form.press("nope").await, Err(FormError::UnknownField("nope".into())));

        let view = form.view();
        assert!(matches!(
            view.widget("endpoint").map(|w| &w.widget),
            Some(Widget::ButtonInput { pressable: true, .. })
        ));
        assert!(matches!(
            view.widget("note").map(|w| &w.widget),
            Some(Widget::ButtonInput { pressable: false, .. })
        ));
    }

    #[test]
    fn test_list_view_renders_entry_rows() {
        let mut form = Form::render(strategy_schema(), &Record::new());
        form.add_entry("labels").unwrap();
        form.set_value("labels.0.key", json!("env")).unwrap();

        let view = form.view();
        let Widget::List { entries } = &view.widget("labels").unwrap().widget else {
            panic!("labels is not a list");
        };

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0][0].path, "labels.0.key");
        assert_eq!(entries[0][0].value, json!("env"));
        assert!(view.widget("labels.0.value").is_some());
    }

    #[test]
    fn test_reset_restores_initial_and_clear_restores_defaults() {
        let mut form = Form::render(strategy_schema(), &record(json!({"alert": "cpu"})));
        form.set_value("alert", json!("mem")).unwrap();
        form.set_value("level", json!(1)).unwrap();

        form.reset();
        assert_eq!(form.value("alert"), Some(&json!("cpu")));
        assert_eq!(form.value("level"), Some(&json!(2)));

        form.clear();
        assert_eq!(form.value("alert"), Some(&Value::Null));
    }

    fn datasource_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                FieldDescriptor::radio_group(
                    "storageType",
                    "Storage",
                    vec![SelectOption::new(1, "prometheus"), SelectOption::new(2, "victoria")],
                )
                .default_value(json!(1))
                .on_change(FieldEffect::Reset {
                    targets: vec!["endpoint".into()],
                }),
                FieldDescriptor::button_input("endpoint", "Endpoint", "Test")
                    .default_value(json!("http://localhost:9090"))
                    .on_change(FieldEffect::Assign {
                        target: "verified".into(),
                        value: json!(false),
                    }),
                FieldDescriptor::select(
                    "verified",
                    "Verified",
                    vec![SelectOption::new(true, "yes"), SelectOption::new(false, "no")],
                ),
                FieldDescriptor::text("topic", "Topic").visible_when(Visibility::Equals {
                    field: "storageType".into(),
                    value: json!(2),
                }),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_effects_apply_transitively() {
        let mut form = Form::render(datasource_schema(), &Record::new());
        form.set_value("endpoint", json!("http://prom:9090")).unwrap();
        form.set_value("verified", json!(true)).unwrap();

        form.set_value("storageType", json!(2)).unwrap();

        assert_eq!(form.value("endpoint"), Some(&json!("http://localhost:9090")));
        assert_eq!(form.value("verified"), Some(&json!(false)));
    }

    #[test]
    fn test_hidden_fields_excluded_from_values_and_view() {
        let mut form = Form::render(datasource_schema(), &record(json!({"topic": "t"})));

        assert!(!form.values().contains_key("topic"));
        assert!(form.view().widget("topic").is_none());

        form.set_value("storageType", json!(2)).unwrap();

        assert_eq!(form.values().get("topic"), Some(&json!("t")));
        assert!(form.view().widget("topic").is_some());
    }

    #[test]
    fn test_values_match_exactly() {
        let mut form = Form::render(datasource_schema(), &Record::new());
        form.set_value("storageType", json!("2")).unwrap();

        assert!(!form.values().contains_key("topic"));
    }

    #[test]
    fn test_custom_reducer_limited_to_targets() {
        let schema = Schema::new(vec![
            FieldDescriptor::number("threshold", "Threshold").on_change(FieldEffect::Custom {
                targets: vec!["summary".into()],
                reducer: Reducer::new(|changed, _values| {
                    Patch::new()
                        .set("summary", json!(format!("above {changed}")))
                        .set("threshold", json!(0))
                }),
            }),
            FieldDescriptor::text("summary", "Summary"),
        ])
        .unwrap();
        let mut form = Form::render(Arc::new(schema), &Record::new());

        form.set_value("threshold", json!(80)).unwrap();

        assert_eq!(form.value("summary"), Some(&json!("above 80")));
        assert_eq!(form.value("threshold"), Some(&json!(80)));
    }

    #[test]
    fn test_entry_effects_stay_in_entry_scope() {
        let schema = Schema::new(vec![FieldDescriptor::repeatable(
            "levels",
            "Levels",
            vec![
                FieldDescriptor::text("level", "Level").on_change(FieldEffect::Reset {
                    targets: vec!["threshold".into()],
                }),
                FieldDescriptor::number("threshold", "Threshold").default_value(json!(0)),
            ],
        )])
        .unwrap();
        let mut form = Form::render(Arc::new(schema), &Record::new());
        form.add_entry("levels").unwrap();
        form.add_entry("levels").unwrap();
        form.set_value("levels.0.threshold", json!(5)).unwrap();
        form.set_value("levels.1.threshold", json!(9)).unwrap();

        form.set_value("levels.1.level", json!("high")).unwrap();

        assert_eq!(form.value("levels.0.threshold"), Some(&json!(5)));
        assert_eq!(form.value("levels.1.threshold"), Some(&json!(0)));
    }

    #[test]
    fn test_apply_server_violations() {
        let mut form = Form::render(strategy_schema(), &Record::new());
        let err = ValidationError::new(vec![FieldViolation::new(
            "alert",
            ViolationKind::Rejected,
            Some("name already taken"),
        )]);

        form.apply_violations(&err);

        assert_eq!(
            form.view().widget("alert").unwrap().error.as_deref(),
            Some("name already taken")
        );
        assert_eq!(form.errors().count(), 1);
    }

    #[test]
    fn test_scope_prefix_and_provider_key() {
        assert_eq!(scope_prefix("levels.1.level", "level"), "levels.1");
        assert_eq!(scope_prefix("alert", "alert"), "");
        assert_eq!(scope_prefix("a.b", "a.b"), "");
        assert_eq!(provider_key("labels.3.key"), "labels.key");
        assert_eq!(provider_key("groupId"), "groupId");
    }

    proptest! {
        #[test]
        fn prop_one_violation_per_empty_required_field(
            fields in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..12),
        ) {
            let descriptors: Vec<FieldDescriptor> = fields
                .iter()
                .enumerate()
                .map(|(i, (required, _))| {
                    let field = FieldDescriptor::text(format!("f{i}"), format!("F{i}"));
                    if *required { field.required("required") } else { field }
                })
                .collect();
            let schema = Arc::new(Schema::new(descriptors).unwrap());
            let mut initial = Record::new();
            for (i, (_, filled)) in fields.iter().enumerate() {
                if *filled {
                    initial.insert(format!("f{i}"), json!("x"));
                }
            }
            let expected = fields.iter().filter(|(required, filled)| *required && !*filled).count();

            let mut form = Form::render(schema, &initial);
            let found = form.validate().err().map_or(0, |e| e.violations.len());

            prop_assert_eq!(found, expected);
        }
    }
}
