//! Paginated list controller.
//!
//! Every trigger (mount, search, reset, page turn, refresh, poll tick) is
//! debounced; only the last trigger of a burst dispatches a fetch. Each
//! dispatched fetch carries its trigger's sequence number, and a response
//! commits only if its query is still the active one and no newer response
//! has been committed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ViewConfig;
use crate::error::{StaleResponse, TransportError};
use crate::notice::Notifier;
use crate::record::Record;

/// Requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page_num: u32,
    /// Items per page.
    pub page_size: u32,
}

/// Arguments of a list fetch. Serializes as
/// `{"pagination": {"pageNum", "pageSize"}, ...filters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Requested page.
    pub pagination: Pagination,
    /// Filter fields.
    #[serde(flatten)]
    pub filters: Record,
}

impl ListQuery {
    /// First page of `filters`.
    #[must_use]
    pub fn first_page(filters: Record, page_size: u32) -> Self {
        Self {
            pagination: Pagination {
                page_num: 1,
                page_size: page_size.max(1),
            },
            filters,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Records on this page.
    pub items: Vec<Record>,
    /// Total number of records matching the filters.
    pub total: u64,
}

/// Collaborator returning pages of records.
pub trait ListSource: Send + Sync + fmt::Debug {
    /// Fetch one page.
    fn list(&self, query: ListQuery) -> BoxFuture<'_, Result<Page, TransportError>>;
}

/// Last page number for `total` records at `page_size`; never below 1.
#[must_use]
pub fn last_page(total: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    total.div_ceil(size).max(1).min(u64::from(u32::MAX)) as u32
}

/// State of a list as seen by a front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSnapshot {
    /// Records displayed.
    pub items: Vec<Record>,
    /// Total reported with the displayed page.
    pub total: u64,
    /// Page number of the displayed items.
    pub page_num: u32,
    /// Page size of the displayed items.
    pub page_size: u32,
    /// Active query; may run ahead of the displayed page.
    pub query: ListQuery,
    /// A fetch is scheduled or in flight.
    pub loading: bool,
    /// Failure of the last fetch, cleared by the next success.
    pub last_error: Option<TransportError>,
}

struct State {
    query: ListQuery,
    items: Vec<Record>,
    total: u64,
    page_num: u32,
    page_size: u32,
    pending: usize,
    latest_trigger: u64,
    committed: u64,
    last_error: Option<TransportError>,
    mounted: bool,
    polling: Option<CancellationToken>,
}

impl State {
    fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            items: self.items.clone(),
            total: self.total,
            page_num: self.page_num,
            page_size: self.page_size,
            query: self.query.clone(),
            loading: self.pending > 0,
            last_error: self.last_error.clone(),
        }
    }
}

struct Inner {
    source: Arc<dyn ListSource>,
    debounce: Duration,
    poll_interval: Option<Duration>,
    notifier: Option<Notifier>,
    state: Mutex<State>,
    snapshots: watch::Sender<ListSnapshot>,
    shutdown: CancellationToken,
}

/// Decrements the pending count when a scheduled fetch finishes, however
/// it finishes.
struct PendingGuard {
    inner: Arc<Inner>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.pending = state.pending.saturating_sub(1);
        self.inner.publish(&state);
    }
}

impl Inner {
    fn publish(&self, state: &State) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Schedule a debounced fetch of the active query.
    fn schedule(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let trigger = {
            let mut state = self.state.lock();
            state.latest_trigger += 1;
            state.pending += 1;
            self.publish(&state);
            state.latest_trigger
        };

        let guard = PendingGuard {
            inner: Arc::clone(self),
        };
        tokio::spawn(async move {
            let inner = Arc::clone(&guard.inner);
            tokio::select! {
                () = inner.shutdown.cancelled() => return,
                () = tokio::time::sleep(inner.debounce) => {}
            }

            let query = {
                let state = inner.state.lock();
                if state.latest_trigger != trigger {
                    debug!(trigger, latest = state.latest_trigger, "list trigger collapsed");
                    return;
                }
                state.query.clone()
            };

            debug!(
                trigger,
                page_num = query.pagination.page_num,
                page_size = query.pagination.page_size,
                "fetching list page"
            );
            let result = tokio::select! {
                () = inner.shutdown.cancelled() => return,
                result = inner.source.list(query.clone()) => result,
            };
            inner.commit(trigger, &query, result);
            drop(guard);
        });
    }

    fn commit(self: &Arc<Self>, seq: u64, query: &ListQuery, result: Result<Page, TransportError>) {
        let mut state = self.state.lock();
        if *query != state.query || seq <= state.committed {
            let stale = StaleResponse {
                seq,
                latest: state.latest_trigger,
            };
            debug!(error = %stale, "dropping list response");
            return;
        }

        match result {
            Ok(page) => {
                state.committed = seq;
                state.last_error = None;
                let last = last_page(page.total, query.pagination.page_size);
                if page.items.is_empty() && query.pagination.page_num > last {
                    debug!(
                        page_num = query.pagination.page_num,
                        last, "page beyond last page, clamping"
                    );
                    state.query.pagination.page_num = last;
                    drop(state);
                    self.schedule();
                    return;
                }
                state.items = page.items;
                state.total = page.total;
                state.page_num = query.pagination.page_num;
                state.page_size = query.pagination.page_size;
            }
            Err(err) => {
                warn!(error = %err, "list fetch failed");
                state.committed = seq;
                state.last_error = Some(err.clone());
                if let Some(notifier) = &self.notifier {
                    notifier.error(err.to_string());
                }
            }
        }
        self.publish(&state);
    }
}

/// Builder for a [`ListController`].
#[derive(Debug)]
pub struct ListControllerBuilder {
    source: Arc<dyn ListSource>,
    config: ViewConfig,
    filters: Record,
    notifier: Option<Notifier>,
}

impl ListControllerBuilder {
    /// Use `config` for debounce, page size and polling.
    #[must_use]
    pub fn config(mut self, config: &ViewConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Filters used on mount.
    #[must_use]
    pub fn filters(mut self, filters: Record) -> Self {
        self.filters = filters;
        self
    }

    /// Report fetch failures on `notifier`.
    #[must_use]
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the controller. Nothing is fetched until [`ListController::mount`].
    #[must_use]
    pub fn build(self) -> ListController {
        let page_size = self.config.default_page_size.max(1);
        let state = State {
            query: ListQuery::first_page(self.filters, page_size),
            items: Vec::new(),
            total: 0,
            page_num: 1,
            page_size,
            pending: 0,
            latest_trigger: 0,
            committed: 0,
            last_error: None,
            mounted: false,
            polling: None,
        };
        let (snapshots, _) = watch::channel(state.snapshot());
        ListController {
            inner: Arc::new(Inner {
                source: self.source,
                debounce: self.config.debounce,
                poll_interval: self.config.poll_interval,
                notifier: self.notifier,
                state: Mutex::new(state),
                snapshots,
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

/// Owns the pagination state of one list view. Dropping it tears it down.
pub struct ListController {
    inner: Arc<Inner>,
}

impl fmt::Debug for ListController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ListController")
            .field("query", &state.query)
            .field("page_num", &state.page_num)
            .field("total", &state.total)
            .field("pending", &state.pending)
            .finish_non_exhaustive()
    }
}

impl ListController {
    /// Start building a controller over `source`.
    pub fn builder(source: Arc<dyn ListSource>) -> ListControllerBuilder {
        ListControllerBuilder {
            source,
            config: ViewConfig::default(),
            filters: Record::new(),
            notifier: None,
        }
    }

    /// Trigger the first fetch, and start polling if configured. Only the
    /// first call has an effect.
    pub fn mount(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.mounted {
                return;
            }
            state.mounted = true;
        }
        self.inner.schedule();
        if let Some(interval) = self.inner.poll_interval {
            self.start_polling(interval);
        }
    }

    /// Replace the filters and go to page 1.
    pub fn search(&self, filters: Record) {
        {
            let mut state = self.inner.state.lock();
            state.query.filters = filters;
            state.query.pagination.page_num = 1;
        }
        self.inner.schedule();
    }

    /// Restore default filters and go to page 1.
    pub fn reset(&self, defaults: Record) {
        self.search(defaults);
    }

    /// Go to `page` at `size`. A size change moves to the page containing
    /// the first displayed item, clamped to the last page.
    pub fn turn_page(&self, page: u32, size: u32) {
        {
            let mut state = self.inner.state.lock();
            let size = size.max(1);
            let page_num = if size == state.query.pagination.page_size {
                page.max(1)
            } else {
                let first_index =
                    u64::from(state.page_num.saturating_sub(1)) * u64::from(state.page_size);
                let target = (first_index / u64::from(size) + 1).min(u64::from(u32::MAX)) as u32;
                target.min(last_page(state.total, size))
            };
            state.query.pagination = Pagination {
                page_num,
                page_size: size,
            };
        }
        self.inner.schedule();
    }

    /// Fetch the active query again.
    pub fn refresh(&self) {
        self.inner.schedule();
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> ListSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receive a snapshot after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Refresh every `interval`, replacing any running poller.
    pub fn start_polling(&self, interval: Duration) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let token = self.inner.shutdown.child_token();
        if let Some(previous) = self.inner.state.lock().polling.replace(token.clone()) {
            previous.cancel();
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticks.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticks.tick() => {
                        debug!("auto-refresh tick");
                        inner.schedule();
                    }
                }
            }
        });
    }

    /// Stop auto-refresh.
    pub fn stop_polling(&self) {
        if let Some(token) = self.inner.state.lock().polling.take() {
            token.cancel();
        }
    }

    /// Cancel pending timers, in-flight fetches and polling. Later triggers
    /// are ignored.
    pub fn teardown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            debug!("tearing down list controller");
            self.inner.shutdown.cancel();
        }
    }

    /// Whether [`teardown`](Self::teardown) has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Drop for ListController {
    fn drop(&mut self) {
        self.teardown();
    }
}
