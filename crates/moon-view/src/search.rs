//! Search bar: a form whose values become list filters.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::ViewConfig;
use crate::error::{FormError, SchemaError};
use crate::form::{Form, FormView};
use crate::list::ListController;
use crate::notice::Notifier;
use crate::options::OptionProvider;
use crate::record::{self, Record};
use crate::schema::Schema;

/// Filter inputs above a paginated list.
#[derive(Debug)]
pub struct SearchBar {
    form: Form,
}

impl SearchBar {
    /// Render a search bar for `schema`.
    pub fn new(schema: Arc<Schema>) -> Result<Self, SchemaError> {
        Self::with_config(schema, &ViewConfig::default(), None)
    }

    /// Render with explicit configuration and a notifier for option
    /// fetch failures.
    pub fn with_config(
        schema: Arc<Schema>,
        config: &ViewConfig,
        notifier: Option<Notifier>,
    ) -> Result<Self, SchemaError> {
        schema.check_search_compatible()?;
        Ok(Self {
            form: Form::render_with(schema, &Record::new(), config, notifier),
        })
    }

    /// Set a filter input.
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), FormError> {
        self.form.set_value(path, value)
    }

    /// Current value of a filter input.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<&Value> {
        self.form.value(path)
    }

    /// Change the value [`SearchBar::reset`] restores at `path`.
    pub fn set_default(&mut self, path: &str, value: Value) -> Result<(), FormError> {
        self.form.set_initial(path, value)
    }

    /// Non-blank visible inputs as filters.
    #[must_use]
    pub fn search(&self) -> Record {
        let filters = without_blanks(self.form.values());
        debug!(filters = filters.len(), "search");
        filters
    }

    /// Restore the defaults and return them as filters.
    pub fn reset(&mut self) -> Record {
        self.form.reset();
        without_blanks(self.form.values())
    }

    /// Apply [`SearchBar::search`] to `list`, going to page 1.
    pub fn search_into(&self, list: &ListController) {
        list.search(self.search());
    }

    /// Apply [`SearchBar::reset`] to `list`, going to page 1.
    pub fn reset_into(&mut self, list: &ListController) {
        list.reset(self.reset());
    }

    /// Option provider of a select input.
    #[must_use]
    pub fn options(&self, path: &str) -> Option<&OptionProvider> {
        self.form.options(path)
    }

    /// Renderable view of the inputs.
    #[must_use]
    pub fn view(&self) -> FormView {
        self.form.view()
    }
}

fn without_blanks(values: Record) -> Record {
    values
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Object(nested) => Value::Object(without_blanks(nested)),
                other => other,
            };
            (!record::is_blank(&value)).then_some((key, value))
        })
        .collect()
}
