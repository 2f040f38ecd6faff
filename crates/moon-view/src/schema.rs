//! Field descriptors and schemas.
//!
//! A schema is an ordered list of [`SchemaItem`]s. A bare descriptor renders
//! as a full-width row, an array of descriptors renders as one row of
//! side-by-side fields. Schemas are built in code or parsed from a JSON
//! document whose async-select sources and button actions are bound
//! through an [`OptionRegistry`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FieldViolation, SchemaError, TransportError, ValidationError, ViolationKind};
use crate::options::{OptionFetcher, SelectOption};
use crate::record::{self, Record};

/// Format rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum Rule {
    /// Absolute `http`/`https` URL.
    Url,
    /// Whole-value regular expression match.
    Pattern {
        /// The expression.
        regex: String,
    },
    /// Maximum length in characters.
    MaxLength {
        /// Limit.
        max: usize,
    },
    /// Inclusive numeric range.
    Range {
        /// Lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
}

/// Declared constraints of a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// The field must be filled in.
    pub required: bool,
    /// Message shown on violation.
    pub message: Option<String>,
    /// Format rules, checked in order after `required`.
    pub rules: Vec<Rule>,
}

impl Constraints {
    fn is_empty(&self) -> bool {
        !self.required && self.message.is_none() && self.rules.is_empty()
    }
}

/// In-code visibility predicate over current values.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&Record) -> bool + Send + Sync>);

impl Predicate {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// When a field is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "kebab-case")]
pub enum Visibility {
    /// Shown when `field` equals `value`.
    Equals {
        /// Observed field.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Shown unless `field` equals `value`.
    NotEquals {
        /// Observed field.
        field: String,
        /// Excluded value.
        value: Value,
    },
    /// Shown when `field` is filled in.
    Present {
        /// Observed field.
        field: String,
    },
    /// In-code predicate.
    #[serde(skip)]
    Predicate(Predicate),
}

impl Visibility {
    /// Evaluate against the values of the enclosing scope.
    #[must_use]
    pub fn is_visible(&self, values: &Record) -> bool {
        match self {
            Self::Equals { field, value } => record::get_path(values, field) == Some(value),
            Self::NotEquals { field, value } => record::get_path(values, field) != Some(value),
            Self::Present { field } => {
                record::get_path(values, field).is_some_and(|v| !record::is_blank(v))
            }
            Self::Predicate(p) => (p.0)(values),
        }
    }
}

/// Values to apply to other fields after a change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    entries: Vec<(String, Value)>,
}

impl Patch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assignment.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.entries.push((path.into(), value));
        self
    }

    /// Whether the patch assigns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over assignments in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v))
    }
}

/// Pure reducer `(changed value, current values) -> patch`.
#[derive(Clone)]
pub struct Reducer(Arc<dyn Fn(&Value, &Record) -> Patch + Send + Sync>);

impl Reducer {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Value, &Record) -> Patch + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Run the reducer.
    #[must_use]
    pub fn apply(&self, changed: &Value, values: &Record) -> Patch {
        (self.0)(changed, values)
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reducer(..)")
    }
}

/// Collaborator run when the button of a button input is pressed.
///
/// Receives the input's value and the values of its scope. The returned
/// patch is written relative to that scope and triggers on-change effects
/// like any other edit.
pub trait FieldAction: Send + Sync + fmt::Debug {
    /// Run the action.
    fn run(&self, value: Value, scope: Record) -> BoxFuture<'_, Result<Patch, TransportError>>;
}

struct FnAction<F> {
    f: F,
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAction(..)")
    }
}

impl<F, Fut> FieldAction for FnAction<F>
where
    F: Fn(Value, Record) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Patch, TransportError>> + Send + 'static,
{
    fn run(&self, value: Value, scope: Record) -> BoxFuture<'_, Result<Patch, TransportError>> {
        Box::pin((self.f)(value, scope))
    }
}

/// Wrap an async closure as a button action.
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn FieldAction>
where
    F: Fn(Value, Record) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Patch, TransportError>> + Send + 'static,
{
    Arc::new(FnAction { f })
}

/// Side effect of a field change on sibling fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "kebab-case")]
pub enum FieldEffect {
    /// Restore the targets to their defaults.
    Reset {
        /// Fields to reset.
        targets: Vec<String>,
    },
    /// Assign a fixed value to the target.
    Assign {
        /// Field to assign.
        target: String,
        /// Value to assign.
        value: Value,
    },
    /// In-code reducer; its patch may only touch the declared targets.
    #[serde(skip)]
    Custom {
        /// Fields the reducer may write.
        targets: Vec<String>,
        /// The reducer.
        reducer: Reducer,
    },
}

impl FieldEffect {
    /// Fields this effect may write.
    #[must_use]
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Reset { targets } | Self::Custom { targets, .. } => {
                targets.iter().map(String::as_str).collect()
            }
            Self::Assign { target, .. } => vec![target.as_str()],
        }
    }
}

/// Rendering hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderHints {
    /// Placeholder text.
    pub placeholder: Option<String>,
    /// Default value.
    pub default: Option<Value>,
    /// Conditional visibility.
    pub visible_when: Option<Visibility>,
}

/// The kind of input a descriptor renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldKind {
    /// Single-line text.
    Text,
    /// Number input.
    Number {
        /// Inclusive minimum.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive maximum.
        #[serde(default)]
        max: Option<f64>,
    },
    /// Multi-line text.
    Textarea {
        /// Maximum length in characters.
        #[serde(default)]
        max_length: Option<usize>,
    },
    /// Select with a fixed option list.
    SingleSelect {
        /// Options.
        options: Vec<SelectOption>,
    },
    /// Multi-select with a fixed option list.
    MultiSelect {
        /// Options.
        options: Vec<SelectOption>,
    },
    /// Select whose options are fetched by keyword.
    AsyncSelect {
        /// Name of the option source, bound through an [`OptionRegistry`].
        #[serde(default)]
        source: String,
        /// Allow several values.
        #[serde(default)]
        multiple: bool,
        /// Extra filters sent with every fetch.
        #[serde(default)]
        filters: Record,
        /// The bound fetch function.
        #[serde(skip)]
        fetcher: Option<Arc<dyn OptionFetcher>>,
    },
    /// Radio buttons.
    RadioGroup {
        /// Options.
        options: Vec<SelectOption>,
    },
    /// Text input with an action button (e.g. "test connection").
    ButtonInput {
        /// Button caption.
        action: String,
        /// Name of the action, bound through an [`OptionRegistry`].
        /// Empty for a caption-only button.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        command: String,
        /// The bound action.
        #[serde(skip)]
        handler: Option<Arc<dyn FieldAction>>,
    },
    /// A row of child fields; carries no value of its own.
    CompositeRow {
        /// Child descriptors, named by full path.
        children: Vec<FieldDescriptor>,
    },
    /// A dynamic list of identical sub-records.
    Repeatable {
        /// Descriptors of one entry, named relative to the entry.
        entry: Vec<FieldDescriptor>,
        /// Minimum entries; `required` alone means at least one.
        #[serde(default)]
        min_entries: Option<usize>,
    },
}

impl FieldKind {
    /// Kind name as written in schema documents.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number { .. } => "number",
            Self::Textarea { .. } => "textarea",
            Self::SingleSelect { .. } => "single-select",
            Self::MultiSelect { .. } => "multi-select",
            Self::AsyncSelect { .. } => "async-select",
            Self::RadioGroup { .. } => "radio-group",
            Self::ButtonInput { .. } => "button-input",
            Self::CompositeRow { .. } => "composite-row",
            Self::Repeatable { .. } => "repeatable",
        }
    }

    /// Whether the field stores a value under its own name.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        !matches!(self, Self::CompositeRow { .. })
    }
}

/// Declarative description of one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Dotted path into the output record.
    pub name: String,
    /// Display text.
    pub label: String,
    /// Input kind.
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Validation constraints.
    #[serde(default)]
    pub constraints: Constraints,
    /// Rendering hints.
    #[serde(default)]
    pub hints: RenderHints,
    /// Side effect applied when this field changes.
    #[serde(default)]
    pub on_change: Option<FieldEffect>,
}

impl FieldDescriptor {
    /// Create a descriptor of any kind.
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            constraints: Constraints::default(),
            hints: RenderHints::default(),
            on_change: None,
        }
    }

    /// Single-line text field.
    pub fn text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    /// Number field.
    pub fn number(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Number { min: None, max: None })
    }

    /// Multi-line text field.
    pub fn textarea(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Textarea { max_length: None })
    }

    /// Select over fixed options.
    pub fn select(
        name: impl Into<String>,
        label: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self::new(name, label, FieldKind::SingleSelect { options })
    }

    /// Multi-select over fixed options.
    pub fn multi_select(
        name: impl Into<String>,
        label: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self::new(name, label, FieldKind::MultiSelect { options })
    }

    /// Select backed by an option fetcher.
    pub fn async_select(
        name: impl Into<String>,
        label: impl Into<String>,
        fetcher: Arc<dyn OptionFetcher>,
    ) -> Self {
        Self::new(
            name,
            label,
            FieldKind::AsyncSelect {
                source: String::new(),
                multiple: false,
                filters: Record::new(),
                fetcher: Some(fetcher),
            },
        )
    }

    /// Radio group over fixed options.
    pub fn radio_group(
        name: impl Into<String>,
        label: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self::new(name, label, FieldKind::RadioGroup { options })
    }

    /// Text input with an action button.
    pub fn button_input(
        name: impl Into<String>,
        label: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            label,
            FieldKind::ButtonInput {
                action: action.into(),
                command: String::new(),
                handler: None,
            },
        )
    }

    /// Row of child fields.
    pub fn composite(
        name: impl Into<String>,
        label: impl Into<String>,
        children: Vec<FieldDescriptor>,
    ) -> Self {
        Self::new(name, label, FieldKind::CompositeRow { children })
    }

    /// Dynamic list of sub-records.
    pub fn repeatable(
        name: impl Into<String>,
        label: impl Into<String>,
        entry: Vec<FieldDescriptor>,
    ) -> Self {
        Self::new(
            name,
            label,
            FieldKind::Repeatable {
                entry,
                min_entries: None,
            },
        )
    }

    /// Mark required with a violation message.
    #[must_use]
    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.constraints.required = true;
        self.constraints.message = Some(message.into());
        self
    }

    /// Add a format rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.constraints.rules.push(rule);
        self
    }

    /// Set the placeholder.
    #[must_use]
    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.hints.placeholder = Some(text.into());
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.hints.default = Some(value);
        self
    }

    /// Show only when the predicate holds.
    #[must_use]
    pub fn visible_when(mut self, visibility: Visibility) -> Self {
        self.hints.visible_when = Some(visibility);
        self
    }

    /// Attach an on-change effect.
    #[must_use]
    pub fn on_change(mut self, effect: FieldEffect) -> Self {
        self.on_change = Some(effect);
        self
    }

    /// Allow several values on an async select.
    #[must_use]
    pub fn multiple(mut self) -> Self {
        if let FieldKind::AsyncSelect { multiple, .. } = &mut self.kind {
            *multiple = true;
        }
        self
    }

    /// Run `handler` when the button of a button input is pressed.
    #[must_use]
    pub fn on_press(mut self, action: Arc<dyn FieldAction>) -> Self {
        if let FieldKind::ButtonInput { handler, .. } = &mut self.kind {
            *handler = Some(action);
        }
        self
    }

    /// Minimum entries of a repeatable list.
    #[must_use]
    pub fn min_entries(mut self, min: usize) -> Self {
        if let FieldKind::Repeatable { min_entries, .. } = &mut self.kind {
            *min_entries = Some(min);
        }
        self
    }

    /// Whether the field is shown given the values of its scope.
    #[must_use]
    pub fn is_visible(&self, values: &Record) -> bool {
        self.hints
            .visible_when
            .as_ref()
            .is_none_or(|v| v.is_visible(values))
    }

    /// Value restored on reset. Repeatable lists default to no entries.
    #[must_use]
    pub fn default_value_or_empty(&self) -> Value {
        match (&self.hints.default, &self.kind) {
            (Some(value), _) => value.clone(),
            (None, FieldKind::Repeatable { .. }) => Value::Array(Vec::new()),
            (None, _) => Value::Null,
        }
    }
}

/// One schema entry: a full-width field or a row of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaItem {
    /// Side-by-side fields.
    Row(Vec<FieldDescriptor>),
    /// Full-width field.
    Field(FieldDescriptor),
}

impl From<FieldDescriptor> for SchemaItem {
    fn from(field: FieldDescriptor) -> Self {
        Self::Field(field)
    }
}

impl From<Vec<FieldDescriptor>> for SchemaItem {
    fn from(fields: Vec<FieldDescriptor>) -> Self {
        Self::Row(fields)
    }
}

/// A laid-out row.
#[derive(Debug, Clone)]
pub struct Row {
    /// Fields in the row.
    pub fields: Vec<FieldDescriptor>,
    /// Declared as a bare descriptor.
    pub full_width: bool,
}

/// Named option fetchers and button actions used to bind the collaborators
/// of schema documents.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    fetchers: HashMap<String, Arc<dyn OptionFetcher>>,
    actions: HashMap<String, Arc<dyn FieldAction>>,
}

impl OptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher under a source name.
    #[must_use]
    pub fn with(mut self, source: impl Into<String>, fetcher: Arc<dyn OptionFetcher>) -> Self {
        self.register(source, fetcher);
        self
    }

    /// Register a fetcher under a source name.
    pub fn register(&mut self, source: impl Into<String>, fetcher: Arc<dyn OptionFetcher>) {
        self.fetchers.insert(source.into(), fetcher);
    }

    /// Look up a fetcher.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<&Arc<dyn OptionFetcher>> {
        self.fetchers.get(source)
    }

    /// Register a button action under a command name.
    #[must_use]
    pub fn with_action(mut self, command: impl Into<String>, action: Arc<dyn FieldAction>) -> Self {
        self.register_action(command, action);
        self
    }

    /// Register a button action under a command name.
    pub fn register_action(&mut self, command: impl Into<String>, action: Arc<dyn FieldAction>) {
        self.actions.insert(command.into(), action);
    }

    fn bind(&self, fields: &mut [FieldDescriptor]) {
        for field in fields {
            match &mut field.kind {
                FieldKind::AsyncSelect {
                    source, fetcher, ..
                } if fetcher.is_none() => {
                    *fetcher = self.fetchers.get(source.as_str()).cloned();
                }
                FieldKind::ButtonInput {
                    command, handler, ..
                } if handler.is_none() && !command.is_empty() => {
                    *handler = self.actions.get(command.as_str()).cloned();
                }
                FieldKind::CompositeRow { children } => self.bind(children),
                FieldKind::Repeatable { entry, .. } => self.bind(entry),
                _ => {}
            }
        }
    }
}

/// A checked, laid-out schema.
#[derive(Debug, Clone)]
pub struct Schema {
    rows: Vec<Row>,
    patterns: HashMap<String, Regex>,
}

impl Schema {
    /// Build a schema, checking all descriptor invariants.
    pub fn new<I, T>(items: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = T>,
        T: Into<SchemaItem>,
    {
        let rows: Vec<Row> = items
            .into_iter()
            .map(|item| match item.into() {
                SchemaItem::Row(fields) => Row {
                    fields,
                    full_width: false,
                },
                SchemaItem::Field(field) => Row {
                    fields: vec![field],
                    full_width: true,
                },
            })
            .collect();

        let top: Vec<&FieldDescriptor> = rows.iter().flat_map(|r| r.fields.iter()).collect();
        let mut patterns = HashMap::new();
        check_scope(&top, &mut patterns)?;

        Ok(Self { rows, patterns })
    }

    /// Parse a JSON schema document and bind its async-select sources.
    pub fn from_json(json: &str, registry: &OptionRegistry) -> Result<Self, SchemaError> {
        let mut items: Vec<SchemaItem> = serde_json::from_str(json)?;
        for item in &mut items {
            match item {
                SchemaItem::Row(fields) => registry.bind(fields),
                SchemaItem::Field(field) => registry.bind(std::slice::from_mut(field)),
            }
        }
        Self::new(items)
    }

    /// Rows in declaration order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Top-level descriptors in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.rows.iter().flat_map(|r| r.fields.iter())
    }

    /// Value-carrying descriptors of the top-level scope, composites flattened.
    pub fn value_fields(&self) -> Vec<&FieldDescriptor> {
        let mut out = Vec::new();
        collect_value_fields(self.fields(), &mut out);
        out
    }

    /// Find the descriptor addressing `path`. Entry paths such as
    /// `labels.0.key` resolve to the entry descriptor `key` of `labels`.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&FieldDescriptor> {
        find_in(&self.value_fields(), path)
    }

    /// Values of all value fields at their defaults.
    #[must_use]
    pub fn defaults(&self) -> Record {
        scope_defaults(self.fields())
    }

    /// The visible part of `values`: hidden fields are dropped, missing
    /// visible fields appear as `null`, list entries are projected through
    /// their entry descriptors.
    #[must_use]
    pub fn visible_values(&self, values: &Record) -> Record {
        let mut out = Record::new();
        project(self.fields(), values, &mut out);
        out
    }

    /// Validate a record depth-first in schema order.
    pub fn validate_record(&self, values: &Record) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        let fields: Vec<&FieldDescriptor> = self.fields().collect();
        self.validate_scope(&fields, values, "", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations))
        }
    }

    /// Reject kinds a search bar cannot render.
    pub fn check_search_compatible(&self) -> Result<(), SchemaError> {
        for field in self.value_fields() {
            if matches!(
                field.kind,
                FieldKind::Repeatable { .. } | FieldKind::ButtonInput { .. }
            ) {
                return Err(SchemaError::UnsupportedInSearch {
                    field: field.name.clone(),
                    kind: field.kind.name(),
                });
            }
        }
        Ok(())
    }

    fn validate_scope(
        &self,
        fields: &[&FieldDescriptor],
        scope: &Record,
        prefix: &str,
        out: &mut Vec<FieldViolation>,
    ) {
        for field in fields {
            if !field.is_visible(scope) {
                continue;
            }
            match &field.kind {
                FieldKind::CompositeRow { children } => {
                    let children: Vec<&FieldDescriptor> = children.iter().collect();
                    self.validate_scope(&children, scope, prefix, out);
                }
                FieldKind::Repeatable { entry, min_entries } => {
                    let path = record::join(prefix, &field.name);
                    let entries = record::get_path(scope, &field.name)
                        .and_then(Value::as_array)
                        .map_or(&[][..], Vec::as_slice);
                    let min = min_entries.unwrap_or(usize::from(field.constraints.required));
                    if entries.len() < min {
                        let kind = if entries.is_empty() && field.constraints.required {
                            ViolationKind::Required
                        } else {
                            ViolationKind::TooFewEntries {
                                min,
                                actual: entries.len(),
                            }
                        };
                        out.push(FieldViolation::new(
                            path.clone(),
                            kind,
                            field.constraints.message.as_deref(),
                        ));
                    }
                    let entry_fields: Vec<&FieldDescriptor> = entry.iter().collect();
                    for (index, item) in entries.iter().enumerate() {
                        let empty = Record::new();
                        let item_scope = item.as_object().unwrap_or(&empty);
                        let entry_prefix = format!("{path}.{index}");
                        self.validate_scope(&entry_fields, item_scope, &entry_prefix, out);
                    }
                }
                _ => {
                    let value = record::get_path(scope, &field.name).unwrap_or(&Value::Null);
                    if let Some(kind) = self.check_value(field, value) {
                        out.push(FieldViolation::new(
                            record::join(prefix, &field.name),
                            kind,
                            field.constraints.message.as_deref(),
                        ));
                    }
                }
            }
        }
    }

    fn check_value(&self, field: &FieldDescriptor, value: &Value) -> Option<ViolationKind> {
        if record::is_blank(value) {
            return field.constraints.required.then_some(ViolationKind::Required);
        }

        match &field.kind {
            FieldKind::Number { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Some(ViolationKind::InvalidFormat {
                        expected: "number".into(),
                    });
                };
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Some(ViolationKind::OutOfRange {
                        min: *min,
                        max: *max,
                    });
                }
            }
            FieldKind::Textarea {
                max_length: Some(max),
            } => {
                if let Some(kind) = check_length(value, *max) {
                    return Some(kind);
                }
            }
            _ => {}
        }

        field
            .constraints
            .rules
            .iter()
            .find_map(|rule| self.check_rule(rule, value))
    }

    fn check_rule(&self, rule: &Rule, value: &Value) -> Option<ViolationKind> {
        match rule {
            Rule::Url => {
                let ok = value.as_str().is_some_and(|s| {
                    url::Url::parse(s).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
                });
                (!ok).then(|| ViolationKind::InvalidFormat {
                    expected: "url".into(),
                })
            }
            Rule::Pattern { regex } => {
                let ok = match (value.as_str(), self.patterns.get(regex)) {
                    (Some(s), Some(re)) => re.is_match(s),
                    _ => false,
                };
                (!ok).then(|| ViolationKind::InvalidFormat {
                    expected: format!("match for /{regex}/"),
                })
            }
            Rule::MaxLength { max } => check_length(value, *max),
            Rule::Range { min, max } => match value.as_f64() {
                Some(n) if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) => {
                    Some(ViolationKind::OutOfRange {
                        min: *min,
                        max: *max,
                    })
                }
                Some(_) => None,
                None => Some(ViolationKind::InvalidFormat {
                    expected: "number".into(),
                }),
            },
        }
    }
}

/// Defaults of the value fields declared in one scope.
pub(crate) fn scope_defaults<'a>(fields: impl IntoIterator<Item = &'a FieldDescriptor>) -> Record {
    let mut values = Vec::new();
    collect_value_fields(fields, &mut values);
    let mut out = Record::new();
    for field in values {
        record::set_path(&mut out, &field.name, field.default_value_or_empty());
    }
    out
}

fn project<'a>(
    fields: impl IntoIterator<Item = &'a FieldDescriptor>,
    scope: &Record,
    out: &mut Record,
) {
    for field in fields {
        if !field.is_visible(scope) {
            continue;
        }
        match &field.kind {
            FieldKind::CompositeRow { children } => project(children, scope, out),
            FieldKind::Repeatable { entry, .. } => {
                let entries = record::get_path(scope, &field.name)
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| {
                                let mut projected = Record::new();
                                if let Value::Object(item_scope) = item {
                                    project(entry, item_scope, &mut projected);
                                } else {
                                    project(entry, &Record::new(), &mut projected);
                                }
                                Value::Object(projected)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                record::set_path(out, &field.name, Value::Array(entries));
            }
            _ => {
                let value = record::get_path(scope, &field.name)
                    .cloned()
                    .unwrap_or(Value::Null);
                record::set_path(out, &field.name, value);
            }
        }
    }
}

fn check_length(value: &Value, max: usize) -> Option<ViolationKind> {
    let actual = value.as_str()?.chars().count();
    (actual > max).then_some(ViolationKind::TooLong { max, actual })
}

fn collect_value_fields<'a>(
    fields: impl IntoIterator<Item = &'a FieldDescriptor>,
    out: &mut Vec<&'a FieldDescriptor>,
) {
    for field in fields {
        match &field.kind {
            FieldKind::CompositeRow { children } => collect_value_fields(children, out),
            _ => out.push(field),
        }
    }
}

fn composites<'a>(fields: &[&'a FieldDescriptor]) -> Vec<&'a FieldDescriptor> {
    let mut out = Vec::new();
    let mut pending: Vec<&FieldDescriptor> = fields.to_vec();
    while let Some(field) = pending.pop() {
        if let FieldKind::CompositeRow { children } = &field.kind {
            out.push(field);
            pending.extend(children.iter());
        }
    }
    out
}

fn find_in<'a>(fields: &[&'a FieldDescriptor], path: &str) -> Option<&'a FieldDescriptor> {
    for field in fields {
        if field.name == path {
            return Some(field);
        }
        if let FieldKind::Repeatable { entry, .. } = &field.kind {
            let Some(rest) = path
                .strip_prefix(field.name.as_str())
                .and_then(|r| r.strip_prefix('.'))
            else {
                continue;
            };
            let Some((index, inner)) = rest.split_once('.') else {
                continue;
            };
            if index.parse::<usize>().is_err() {
                continue;
            }
            let mut entry_fields = Vec::new();
            collect_value_fields(entry, &mut entry_fields);
            return find_in(&entry_fields, inner);
        }
    }
    None
}

/// Check one naming scope: names, composites, fetchers, patterns, effects.
fn check_scope(
    fields: &[&FieldDescriptor],
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), SchemaError> {
    let mut values = Vec::new();
    collect_value_fields(fields.iter().copied(), &mut values);

    let mut seen = HashSet::new();
    for field in composites(fields) {
        check_descriptor(field, patterns)?;
        if !seen.insert(&field.name) {
            return Err(SchemaError::DuplicateName(field.name.clone()));
        }
    }
    for field in &values {
        if field.name.is_empty() || field.name.split('.').any(str::is_empty) {
            return Err(SchemaError::InvalidName(field.name.clone()));
        }
        if !seen.insert(&field.name) {
            return Err(SchemaError::DuplicateName(field.name.clone()));
        }
        if let Some(parent) = values.iter().find(|other| is_path_prefix(&other.name, &field.name)) {
            return Err(SchemaError::NameCollision {
                name: field.name.clone(),
                parent: parent.name.clone(),
            });
        }
        check_descriptor(field, patterns)?;
        if let FieldKind::Repeatable { entry, .. } = &field.kind {
            if entry.is_empty() {
                return Err(SchemaError::EmptyComposite(field.name.clone()));
            }
            let entry: Vec<&FieldDescriptor> = entry.iter().collect();
            check_scope(&entry, patterns)?;
        }
    }

    check_effects(&values)
}

/// `prefix` names a value that `path` would be written inside.
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn check_descriptor(
    field: &FieldDescriptor,
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), SchemaError> {
    match &field.kind {
        FieldKind::CompositeRow { children } => {
            if children.is_empty() {
                return Err(SchemaError::EmptyComposite(field.name.clone()));
            }
            let property = if field.hints.default.is_some() {
                Some("a default value")
            } else if !field.constraints.is_empty() {
                Some("constraints")
            } else if field.on_change.is_some() {
                Some("an on-change effect")
            } else {
                None
            };
            if let Some(property) = property {
                return Err(SchemaError::CompositeWithValue {
                    field: field.name.clone(),
                    property,
                });
            }
        }
        FieldKind::AsyncSelect {
            source,
            fetcher: None,
            ..
        } => {
            return Err(SchemaError::MissingFetcher {
                field: field.name.clone(),
                source_name: source.clone(),
            });
        }
        FieldKind::ButtonInput {
            command,
            handler: None,
            ..
        } if !command.is_empty() => {
            return Err(SchemaError::MissingAction {
                field: field.name.clone(),
                command: command.clone(),
            });
        }
        _ => {}
    }

    for rule in &field.constraints.rules {
        if let Rule::Pattern { regex } = rule {
            if !patterns.contains_key(regex) {
                let compiled = Regex::new(&format!("^(?:{regex})$")).map_err(|e| {
                    SchemaError::InvalidPattern {
                        field: field.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                patterns.insert(regex.clone(), compiled);
            }
        }
    }
    Ok(())
}

/// Every effect target exists in scope and the effect graph has no cycle.
fn check_effects(fields: &[&FieldDescriptor]) -> Result<(), SchemaError> {
    let names: HashSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for field in fields {
        let Some(effect) = &field.on_change else {
            continue;
        };
        for target in effect.targets() {
            if !names.contains(target) {
                return Err(SchemaError::UnknownEffectTarget {
                    field: field.name.clone(),
                    target: target.to_string(),
                });
            }
            graph.entry(field.name.as_str()).or_default().push(target);
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        graph: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), SchemaError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(node.to_string());
                return Err(SchemaError::EffectCycle(cycle));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for next in graph.get(node).into_iter().flatten() {
            visit(*next, graph, marks, stack)?;
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for node in graph.keys() {
        visit(*node, &graph, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}
