//! Affiliate broadcast notifications.
//!
//! Notifications are appended to `notifications.json`, rewritten in full on
//! every broadcast.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::models::Notification;

/// File name of the notification list inside the data directory.
pub const NOTIFICATIONS_FILE: &str = "notifications.json";

pub struct NotificationSink {
    path: PathBuf,
}

impl NotificationSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append a notification stamped with the current time and return it.
    pub fn broadcast(
        &self,
        title: &str,
        message: &str,
        metadata: Map<String, Value>,
    ) -> Result<Notification> {
        let notification = Notification {
            title: title.to_string(),
            message: message.to_string(),
            metadata,
            timestamp: Utc::now(),
        };

        let mut notifications = self.load_notifications()?;
        notifications.push(notification.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&notifications)?;
        std::fs::write(&self.path, json).with_context(|| {
            format!(
                "Failed to write notifications file: {}",
                self.path.display()
            )
        })?;

        tracing::info!(title, "broadcast sent");
        Ok(notification)
    }

    /// All notifications sent so far, oldest first.
    pub fn load_notifications(&self) -> Result<Vec<Notification>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read notifications file: {}", self.path.display())
        })?;
        serde_json::from_str(&content).with_context(|| {
            format!(
                "Failed to parse notifications file: {}",
                self.path.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broadcast_appends() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sink = NotificationSink::new(tmp.path().join("data").join(NOTIFICATIONS_FILE));

        let meta = json!({"key": "value"}).as_object().cloned().unwrap();
        sink.broadcast("Test Title", "Test Message", meta).unwrap();
        sink.broadcast("Second", "Again", Map::new()).unwrap();

        let all = sink.load_notifications().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Test Title");
        assert_eq!(all[0].message, "Test Message");
        assert_eq!(all[0].metadata["key"], "value");
        assert_eq!(all[1].title, "Second");
    }

    #[test]
    fn broadcast_into_blocked_path_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let sink = NotificationSink::new(blocker.join(NOTIFICATIONS_FILE));
        assert!(sink.broadcast("t", "m", Map::new()).is_err());
    }
}
