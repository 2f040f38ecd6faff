//! Transient user-visible notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::ViewConfig;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// An operation succeeded.
    Success,
    /// Something degraded but the view keeps working.
    Warning,
    /// An operation failed.
    Error,
}

/// A toast-style message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Message text.
    pub message: String,
    /// When the notice was raised.
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    /// Create a notice stamped with the current time.
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast channel of notices owned by a view.
///
/// Cloning yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    /// Create a channel holding up to `capacity` undelivered notices.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a channel sized by `config.notice_capacity`.
    #[must_use]
    pub fn from_config(config: &ViewConfig) -> Self {
        Self::new(config.notice_capacity)
    }

    /// Subscribe to notices raised from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice. Returns the number of subscribers reached.
    pub fn publish(&self, notice: Notice) -> usize {
        self.tx.send(notice).unwrap_or(0)
    }

    /// Publish an info notice.
    pub fn info(&self, message: impl Into<String>) -> usize {
        self.publish(Notice::new(NoticeLevel::Info, message))
    }

    /// Publish a success notice.
    pub fn success(&self, message: impl Into<String>) -> usize {
        self.publish(Notice::new(NoticeLevel::Success, message))
    }

    /// Publish a warning notice.
    pub fn warning(&self, message: impl Into<String>) -> usize {
        self.publish(Notice::new(NoticeLevel::Warning, message))
    }

    /// Publish an error notice.
    pub fn error(&self, message: impl Into<String>) -> usize {
        self.publish(Notice::new(NoticeLevel::Error, message))
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_config(&ViewConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(4);
        assert_eq!(notifier.info("nobody listening"), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();

        notifier.success("created");
        notifier.error("list failed: timeout");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.level, NoticeLevel::Success);
        assert_eq!(first.message, "created");
        assert_eq!(second.level, NoticeLevel::Error);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_clones_share_channel() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.clone().warning("slow");

        assert_eq!(rx.try_recv().unwrap().message, "slow");
    }

    #[test]
    fn test_capacity_from_config() {
        let notifier = Notifier::from_config(&ViewConfig::default().with_notice_capacity(2));
        let mut rx = notifier.subscribe();

        notifier.info("one");
        notifier.info("two");
        notifier.info("three");

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert_eq!(rx.try_recv().unwrap().message, "two");
        assert_eq!(rx.try_recv().unwrap().message, "three");
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let notice = Notice::new(NoticeLevel::Warning, "x");
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["level"], "warning");
    }
}
