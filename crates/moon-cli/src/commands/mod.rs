//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`check`] - Schema document checks
//! - [`validate`] - Record validation
//! - [`options`] - Select option resolution
//! - [`list`] - Paging through a record file

pub mod check;
pub mod list;
pub mod options;
pub mod validate;

pub use check::CheckCommand;
pub use list::ListCommand;
pub use options::OptionsCommand;
pub use validate::ValidateCommand;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use moon_view::{
    Notice, NoticeLevel, OptionRegistry, Schema, SelectOption, StaticFetcher, ViewConfig,
};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cli::SchemaArgs;
use crate::error::CliError;

/// Read and parse a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| CliError::Document {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load the view configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ViewConfig, CliError> {
    let Some(path) = path else {
        return Ok(ViewConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ViewConfig::from_json(&text).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Log the notices raised so far and return them. Notices dropped
/// because the channel overflowed are counted in a warning.
pub fn drain_notices(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notice) => {
                match notice.level {
                    NoticeLevel::Warning | NoticeLevel::Error => warn!(message = %notice.message, "notice"),
                    NoticeLevel::Info | NoticeLevel::Success => info!(message = %notice.message, "notice"),
                }
                notices.push(notice);
            }
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                warn!(missed, "notices dropped, raise notice_capacity");
            }
            Err(_) => return notices,
        }
    }
}

/// Load a schema document, binding async-select sources to the option
/// catalog.
pub fn load_schema(args: &SchemaArgs) -> Result<Schema, CliError> {
    let mut registry = OptionRegistry::new();
    if let Some(path) = &args.options {
        let catalog: HashMap<String, Vec<SelectOption>> = read_json(path)?;
        debug!(sources = catalog.len(), "loaded option catalog");
        for (source, options) in catalog {
            registry.register(source, Arc::new(StaticFetcher::new(options)));
        }
    }
    let text = std::fs::read_to_string(&args.schema).map_err(|source| CliError::Read {
        path: args.schema.clone(),
        source,
    })?;
    Ok(Schema::from_json(&text, &registry)?)
}
