//! Option sources for select fields.
//!
//! An [`OptionProvider`] resolves the options of one select field. Remote
//! sources are debounced, cached per keyword and deduplicated while in
//! flight; only the result for the latest requested keyword is applied.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ViewConfig;
use crate::error::TransportError;
use crate::notice::Notifier;
use crate::record::Record;

/// One selectable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Value stored in the record when selected.
    pub value: Value,
    /// Display text.
    pub label: String,
    /// Shown but not selectable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl SelectOption {
    /// Create an enabled option.
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            disabled: false,
        }
    }

    /// Mark the option disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Arguments of an option fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionQuery {
    /// Typed keyword; empty means no filter.
    pub keyword: String,
    /// Extra filters declared on the field.
    #[serde(flatten)]
    pub filters: Record,
}

/// Collaborator fetching options by keyword.
pub trait OptionFetcher: Send + Sync + fmt::Debug {
    /// Fetch the options matching `query`.
    fn fetch(&self, query: OptionQuery) -> BoxFuture<'_, Result<Vec<SelectOption>, TransportError>>;
}

/// Fetcher over a fixed list, filtering labels by keyword.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    options: Vec<SelectOption>,
}

impl StaticFetcher {
    /// Create a fetcher over `options`.
    #[must_use]
    pub fn new(options: Vec<SelectOption>) -> Self {
        Self { options }
    }
}

impl OptionFetcher for StaticFetcher {
    fn fetch(&self, query: OptionQuery) -> BoxFuture<'_, Result<Vec<SelectOption>, TransportError>> {
        let options = filter_by_label(&self.options, &query.keyword);
        Box::pin(async move { Ok(options) })
    }
}

struct FnFetcher<F> {
    f: F,
}

impl<F> fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFetcher(..)")
    }
}

impl<F, Fut> OptionFetcher for FnFetcher<F>
where
    F: Fn(OptionQuery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<SelectOption>, TransportError>> + Send + 'static,
{
    fn fetch(&self, query: OptionQuery) -> BoxFuture<'_, Result<Vec<SelectOption>, TransportError>> {
        Box::pin((self.f)(query))
    }
}

/// Wrap an async closure as a fetcher.
pub fn fetcher_fn<F, Fut>(f: F) -> Arc<dyn OptionFetcher>
where
    F: Fn(OptionQuery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<SelectOption>, TransportError>> + Send + 'static,
{
    Arc::new(FnFetcher { f })
}

/// Case-insensitive label filter; an empty keyword keeps everything.
#[must_use]
pub fn filter_by_label(options: &[SelectOption], keyword: &str) -> Vec<SelectOption> {
    let needle = keyword.trim().to_lowercase();
    options
        .iter()
        .filter(|o| needle.is_empty() || o.label.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Outcome of [`OptionProvider::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Options for the latest requested keyword.
    Options(Vec<SelectOption>),
    /// A newer request (or disposal) made this one irrelevant.
    Superseded,
}

impl Resolution {
    /// The options, unless superseded.
    #[must_use]
    pub fn into_options(self) -> Option<Vec<SelectOption>> {
        match self {
            Self::Options(options) => Some(options),
            Self::Superseded => None,
        }
    }

    /// Whether the request was superseded.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<SelectOption>, TransportError>>>;

enum Source {
    Fixed(Vec<SelectOption>),
    Remote {
        fetcher: Arc<dyn OptionFetcher>,
        filters: Record,
    },
}

struct CachedOptions {
    options: Vec<SelectOption>,
    fetched_at: Instant,
}

#[derive(Default)]
struct ProviderState {
    seq: u64,
    keyword: String,
    cache: HashMap<String, CachedOptions>,
    in_flight: HashMap<String, SharedFetch>,
    current: Vec<SelectOption>,
    loading: bool,
}

/// Resolves and caches the options of one select field.
pub struct OptionProvider {
    field: String,
    source: Source,
    debounce: Duration,
    ttl: Duration,
    notifier: Option<Notifier>,
    state: Mutex<ProviderState>,
    disposed: CancellationToken,
}

impl fmt::Debug for OptionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OptionProvider")
            .field("field", &self.field)
            .field("keyword", &state.keyword)
            .field("cached", &state.cache.len())
            .field("loading", &state.loading)
            .finish_non_exhaustive()
    }
}

struct LoadingGuard<'a> {
    state: &'a Mutex<ProviderState>,
    seq: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.seq == self.seq {
            state.loading = false;
        }
    }
}

impl OptionProvider {
    /// Provider over a remote fetcher.
    pub fn remote(
        field: impl Into<String>,
        fetcher: Arc<dyn OptionFetcher>,
        config: &ViewConfig,
    ) -> Self {
        Self {
            field: field.into(),
            source: Source::Remote {
                fetcher,
                filters: Record::new(),
            },
            debounce: config.debounce,
            ttl: config.option_cache_ttl,
            notifier: None,
            state: Mutex::new(ProviderState::default()),
            disposed: CancellationToken::new(),
        }
    }

    /// Provider over a fixed list. Resolves immediately.
    pub fn fixed(field: impl Into<String>, options: Vec<SelectOption>) -> Self {
        let state = ProviderState {
            current: options.clone(),
            ..ProviderState::default()
        };
        Self {
            field: field.into(),
            source: Source::Fixed(options),
            debounce: Duration::ZERO,
            ttl: Duration::MAX,
            notifier: None,
            state: Mutex::new(state),
            disposed: CancellationToken::new(),
        }
    }

    /// Send `filters` with every remote fetch.
    #[must_use]
    pub fn with_filters(mut self, extra: Record) -> Self {
        if let Source::Remote { filters, .. } = &mut self.source {
            *filters = extra;
        }
        self
    }

    /// Report fetch failures on `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Field this provider serves.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Options currently shown.
    #[must_use]
    pub fn current(&self) -> Vec<SelectOption> {
        self.state.lock().current.clone()
    }

    /// Whether a fetch for the latest keyword is pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Label of the option whose value equals `value` exactly.
    #[must_use]
    pub fn label_of(&self, value: &Value) -> Option<String> {
        let state = self.state.lock();
        let found = state
            .current
            .iter()
            .chain(state.cache.values().flat_map(|c| c.options.iter()))
            .find(|o| &o.value == value);
        found.map(|o| o.label.clone())
    }

    /// Resolve options for `keyword`.
    pub async fn resolve(&self, keyword: &str) -> Resolution {
        if self.disposed.is_cancelled() {
            return Resolution::Superseded;
        }
        let seq = {
            let mut state = self.state.lock();
            state.seq += 1;
            state.keyword = keyword.to_string();
            state.seq
        };

        let (fetcher, filters) = match &self.source {
            Source::Fixed(options) => {
                let options = filter_by_label(options, keyword);
                self.state.lock().current.clone_from(&options);
                return Resolution::Options(options);
            }
            Source::Remote { fetcher, filters } => (fetcher, filters),
        };

        let _guard = LoadingGuard {
            state: &self.state,
            seq,
        };
        self.state.lock().loading = true;

        tokio::select! {
            () = self.disposed.cancelled() => return Resolution::Superseded,
            () = tokio::time::sleep(self.debounce) => {}
        }

        let fetch = {
            let mut state = self.state.lock();
            if state.seq != seq {
                debug!(field = %self.field, keyword, "option request collapsed by newer keystroke");
                return Resolution::Superseded;
            }
            if let Some(options) = self.fresh(&state, keyword) {
                state.current.clone_from(&options);
                return Resolution::Options(options);
            }
            state
                .in_flight
                .entry(keyword.to_string())
                .or_insert_with(|| {
                    let fetcher = Arc::clone(fetcher);
                    let query = OptionQuery {
                        keyword: keyword.to_string(),
                        filters: filters.clone(),
                    };
                    debug!(field = %self.field, keyword, "fetching options");
                    async move { fetcher.fetch(query).await }.boxed().shared()
                })
                .clone()
        };

        let result = tokio::select! {
            () = self.disposed.cancelled() => return Resolution::Superseded,
            result = fetch => result,
        };

        let mut state = self.state.lock();
        state.in_flight.remove(keyword);
        let latest = state.seq == seq;
        match result {
            Ok(options) => {
                state.cache.insert(
                    keyword.to_string(),
                    CachedOptions {
                        options: options.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                if !latest {
                    debug!(field = %self.field, keyword, "dropping superseded option result");
                    return Resolution::Superseded;
                }
                state.current.clone_from(&options);
                Resolution::Options(options)
            }
            Err(err) => {
                warn!(field = %self.field, keyword, error = %err, "option fetch failed");
                if !latest {
                    return Resolution::Superseded;
                }
                state.current.clear();
                drop(state);
                if let Some(notifier) = &self.notifier {
                    notifier.error(format!("Failed to load options for {}: {err}", self.field));
                }
                Resolution::Options(Vec::new())
            }
        }
    }

    /// Show the options for the last keyword again, fetching only if the
    /// cached entry is missing or stale.
    pub async fn reopen(&self) -> Resolution {
        let keyword = {
            let mut state = self.state.lock();
            let keyword = state.keyword.clone();
            if matches!(self.source, Source::Remote { .. }) {
                if let Some(options) = self.fresh(&state, &keyword) {
                    state.seq += 1;
                    state.loading = false;
                    state.current.clone_from(&options);
                    return Resolution::Options(options);
                }
            }
            keyword
        };
        self.resolve(&keyword).await
    }

    /// Stop the provider; pending and future resolutions are superseded.
    pub fn dispose(&self) {
        self.disposed.cancel();
        let mut state = self.state.lock();
        state.loading = false;
        state.in_flight.clear();
    }

    fn fresh(&self, state: &ProviderState, keyword: &str) -> Option<Vec<SelectOption>> {
        state
            .cache
            .get(keyword)
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.options.clone())
    }
}
