//! NotificationCenter - User-Visible Message Queue
//!
//! ## Responsibilities
//!
//! - Queue leveled notifications for the display layer
//! - Suppress identical consecutive messages inside a short window so
//!   retry storms do not spam the operator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identical consecutive messages inside this window are dropped
const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// One user-visible notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// NotificationCenter instance
pub struct NotificationCenter {
    tx: mpsc::UnboundedSender<Notification>,
    last: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl NotificationCenter {
    /// Create a center and the receiver the display layer drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                last: Mutex::new(None),
            },
            rx,
        )
    }

    /// Queue a notification. Returns false when suppressed by dedup or
    /// when the receiver is gone (teardown).
    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) -> bool {
        let message = message.into();
        let now = Utc::now();

        {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((prev_msg, prev_at)) = last.as_ref() {
                let elapsed = (now - *prev_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if *prev_msg == message && elapsed < DEDUP_WINDOW {
                    tracing::debug!(message = %message, "Notification suppressed (duplicate)");
                    return false;
                }
            }
            *last = Some((message.clone(), now));
        }

        tracing::info!(level = ?level, message = %message, "Notification queued");

        self.tx
            .send(Notification {
                id: Uuid::new_v4(),
                level,
                message,
                created_at: now,
            })
            .is_ok()
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.notify(NotificationLevel::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.notify(NotificationLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.notify(NotificationLevel::Error, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_delivers() {
        let (center, mut rx) = NotificationCenter::new();
        assert!(center.warning("camera unavailable"));

        let n = rx.recv().await.unwrap();
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.message, "camera unavailable");
    }

    #[tokio::test]
    async fn test_consecutive_duplicate_suppressed() {
        let (center, mut rx) = NotificationCenter::new();
        assert!(center.error("retry exhausted"));
        assert!(!center.error("retry exhausted"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.message, "retry exhausted");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_different_messages_not_suppressed() {
        let (center, mut rx) = NotificationCenter::new();
        assert!(center.info("a"));
        assert!(center.info("b"));
        assert!(center.info("a"));

        assert_eq!(rx.recv().await.unwrap().message, "a");
        assert_eq!(rx.recv().await.unwrap().message, "b");
        assert_eq!(rx.recv().await.unwrap().message, "a");
    }
}
