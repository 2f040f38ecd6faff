//! # moon-view
//!
//! Declarative CRUD view engine for the Moon alarm console.
//!
//! Pages are described as data: a [`Schema`] of [`FieldDescriptor`]s drives
//! edit forms and search bars, a [`ListController`] pages through a
//! [`ListSource`], and a [`SubmitCoordinator`] routes validated payloads to
//! create or update on a [`RecordStore`].
//!
//! ## Features
//!
//! - **Forms**: defaults, conditional visibility, on-change effects, nested
//!   lists with their own validation scope
//! - **Option caching**: debounced remote lookups cached per keyword
//! - **Lists**: debounced triggers, stale-response dropping, page clamping
//!   and polling
//! - **Submits**: one in-flight submission, server violations shown inline
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use moon_view::{FieldDescriptor, Form, Schema, SelectOption};
//! use serde_json::json;
//!
//! let schema = Arc::new(Schema::new(vec![
//!     FieldDescriptor::text("alert", "Name").required("enter a name"),
//!     FieldDescriptor::select("level", "Level", vec![SelectOption::new(1, "critical")])
//!         .default_value(json!(1)),
//! ])?);
//!
//! let mut form = Form::render(schema, &Default::default());
//! assert!(form.validate().is_err());
//!
//! form.set_value("alert", json!("cpu high"))?;
//! let values = form.validate()?;
//! assert_eq!(values["level"], json!(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod form;
pub mod list;
pub mod memory;
pub mod notice;
pub mod options;
pub mod record;
pub mod schema;
pub mod search;
pub mod submit;

pub use config::ViewConfig;
pub use error::{
    ConfigError, FieldViolation, FormError, OperationError, SchemaError, SubmitError, TransportError,
    ValidationError, ViolationKind,
};
pub use form::{Form, FormView, RowView, Widget, WidgetView};
pub use list::{last_page, ListController, ListQuery, ListSnapshot, ListSource, Page, Pagination};
pub use memory::MemoryStore;
pub use notice::{Notice, NoticeLevel, Notifier};
pub use options::{
    fetcher_fn, OptionFetcher, OptionProvider, OptionQuery, Resolution, SelectOption,
    StaticFetcher,
};
pub use record::Record;
pub use schema::{
    action_fn, Constraints, FieldAction, FieldDescriptor, FieldEffect, FieldKind, OptionRegistry, Patch, Predicate,
    Reducer, RenderHints, Row, Rule, Schema, SchemaItem, Visibility,
};
pub use search::SearchBar;
pub use submit::{RecordId, RecordStore, SubmitCoordinator, SubmitOutcome, SubmitPhase};
