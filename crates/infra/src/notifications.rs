//! Outbound notification gateway.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

/// A single message to one recipient. `context` carries the template variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub kind: String,
    pub context: serde_json::Value,
    pub channel: Channel,
    pub priority: Priority,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("notification rejected: {0}")]
    Rejected(String),
    #[error("notification gateway unavailable: {0}")]
    Unavailable(String),
}

pub trait NotificationGateway: Send + Sync {
    fn send_notification(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log. Default gateway for the worker binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationGateway;

impl NotificationGateway for TracingNotificationGateway {
    fn send_notification(&self, notification: Notification) -> Result<(), NotificationError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotificationError::Rejected("recipient is empty".to_string()));
        }

        info!(
            recipient = %notification.recipient,
            kind = %notification.kind,
            channel = ?notification.channel,
            priority = ?notification.priority,
            context = %notification.context,
            "notification sent"
        );
        Ok(())
    }
}

/// Records everything it is asked to send. Can be switched to fail.
#[derive(Debug, Default)]
pub struct InMemoryNotificationGateway {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl InMemoryNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl NotificationGateway for InMemoryNotificationGateway {
    fn send_notification(&self, notification: Notification) -> Result<(), NotificationError> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| NotificationError::Unavailable("gateway lock poisoned".to_string()))?;
        if *failing {
            return Err(NotificationError::Unavailable("gateway offline".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| NotificationError::Unavailable("gateway lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
