//! Create-versus-update submission with a re-entrancy guard.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{OperationError, SubmitError, TransportError};
use crate::form::Form;
use crate::list::ListController;
use crate::notice::Notifier;
use crate::record::Record;
use crate::schema::Schema;

/// Server-assigned record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Collaborator persisting records.
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Create a record.
    fn create(&self, payload: Record) -> BoxFuture<'_, Result<(), OperationError>>;

    /// Replace the record `id`.
    fn update(&self, id: RecordId, payload: Record) -> BoxFuture<'_, Result<(), OperationError>>;

    /// Fetch the record `id` for editing.
    fn get(&self, id: RecordId) -> BoxFuture<'_, Result<Record, TransportError>>;
}

/// Where a submission is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitPhase {
    /// Ready for a submission.
    Idle,
    /// Checking the payload.
    Validating,
    /// The payload had violations.
    ValidationFailed,
    /// Waiting on create/update.
    Submitting,
    /// The operation succeeded.
    Succeeded,
    /// The operation failed.
    Failed,
}

impl SubmitPhase {
    /// Whether the submit trigger should be disabled.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Validating | Self::Submitting)
    }
}

/// Result of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new record was created.
    Created,
    /// An existing record was updated.
    Updated,
    /// Another submission was in progress; nothing was sent.
    Ignored,
}

/// Returns the phase to `Idle` if a submission is abandoned mid-flight.
struct BusyGuard<'a> {
    phase: &'a watch::Sender<SubmitPhase>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_if_modified(|phase| {
            if phase.is_busy() {
                *phase = SubmitPhase::Idle;
                true
            } else {
                false
            }
        });
    }
}

/// Chooses create or update and prevents double submission.
#[derive(Debug)]
pub struct SubmitCoordinator {
    schema: Arc<Schema>,
    store: Arc<dyn RecordStore>,
    list: Option<Arc<ListController>>,
    notifier: Option<Notifier>,
    phase: watch::Sender<SubmitPhase>,
}

impl SubmitCoordinator {
    /// Coordinator validating against `schema` and persisting to `store`.
    pub fn new(schema: Arc<Schema>, store: Arc<dyn RecordStore>) -> Self {
        let (phase, _) = watch::channel(SubmitPhase::Idle);
        Self {
            schema,
            store,
            list: None,
            notifier: None,
            phase,
        }
    }

    /// Refresh `list` after every successful submission.
    #[must_use]
    pub fn with_list(mut self, list: Arc<ListController>) -> Self {
        self.list = Some(list);
        self
    }

    /// Publish outcomes on `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SubmitPhase {
        *self.phase.borrow()
    }

    /// Whether a submission is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase().is_busy()
    }

    /// Observe phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SubmitPhase> {
        self.phase.subscribe()
    }

    /// Validate `payload`, then update `target` or create a new record.
    pub async fn submit(
        &self,
        target: Option<RecordId>,
        payload: Record,
    ) -> Result<SubmitOutcome, SubmitError> {
        if !self.begin() {
            return Ok(SubmitOutcome::Ignored);
        }
        let _guard = BusyGuard { phase: &self.phase };

        if let Err(err) = self.schema.validate_record(&payload) {
            self.finish(SubmitPhase::ValidationFailed);
            return Err(err.into());
        }
        self.dispatch(target, payload).await
    }

    /// Validate and submit a form. On success the form is cleared; on
    /// server-side violations they are shown inline and values are kept.
    pub async fn submit_form(
        &self,
        form: &mut Form,
        target: Option<RecordId>,
    ) -> Result<SubmitOutcome, SubmitError> {
        if !self.begin() {
            return Ok(SubmitOutcome::Ignored);
        }
        let _guard = BusyGuard { phase: &self.phase };

        let payload = match form.validate() {
            Ok(values) => values,
            Err(err) => {
                self.finish(SubmitPhase::ValidationFailed);
                return Err(err.into());
            }
        };

        let result = self.dispatch(target, payload).await;
        match &result {
            Ok(SubmitOutcome::Created | SubmitOutcome::Updated) => form.clear(),
            Err(SubmitError::Validation(err)) => form.apply_violations(err),
            _ => {}
        }
        result
    }

    /// Move from a non-busy phase to `Validating`. Returns `false` if a
    /// submission is already in progress.
    fn begin(&self) -> bool {
        let mut started = false;
        self.phase.send_if_modified(|phase| {
            if phase.is_busy() {
                return false;
            }
            *phase = SubmitPhase::Validating;
            started = true;
            true
        });
        if !started {
            debug!("submission in progress, ignoring trigger");
        }
        started
    }

    fn finish(&self, terminal: SubmitPhase) {
        self.phase.send_replace(terminal);
        self.phase.send_replace(SubmitPhase::Idle);
    }

    async fn dispatch(
        &self,
        target: Option<RecordId>,
        payload: Record,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.phase.send_replace(SubmitPhase::Submitting);

        let result = match target {
            Some(id) => {
                info!(%id, "updating record");
                self.store
                    .update(id, payload)
                    .await
                    .map(|()| SubmitOutcome::Updated)
            }
            None => {
                info!("creating record");
                self.store
                    .create(payload)
                    .await
                    .map(|()| SubmitOutcome::Created)
            }
        };

        match result {
            Ok(outcome) => {
                self.finish(SubmitPhase::Succeeded);
                if let Some(notifier) = &self.notifier {
                    notifier.success(match outcome {
                        SubmitOutcome::Updated => "Updated successfully",
                        _ => "Created successfully",
                    });
                }
                if let Some(list) = &self.list {
                    list.refresh();
                }
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "submission failed");
                self.finish(SubmitPhase::Failed);
                if let (Some(notifier), OperationError::Transport(transport)) =
                    (&self.notifier, &err)
                {
                    notifier.error(transport.to_string());
                }
                Err(err.into())
            }
        }
    }
}
