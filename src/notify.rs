use std::sync::Mutex;

use log::info;

use crate::errors::NotifyError;
use crate::types::UserId;
use crate::wallet::lock;

/// a message for one marketplace user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: UserId,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(recipient: UserId, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// fire-and-forget delivery sink
///
/// Errors are reported back only so the caller can log them; they never
/// affect loan or wallet state.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "notify {}: {} - {}",
            notification.recipient, notification.subject, notification.body
        );
        Ok(())
    }
}

/// drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// mock notifier for testing; keeps what it was sent
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// a sink that records and then reports failure
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, recipient: UserId) -> Vec<Notification> {
        lock(&self.sent)
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        lock(&self.sent).push(notification.clone());
        if self.fail {
            Err(NotifyError::Delivery {
                recipient: notification.recipient,
                reason: "delivery unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
