//! An explicit generation session.
//!
//! A [`Session`] bundles the event recorder, collection store, and notification
//! sink for one data directory. Callers create one with [`Session::init`], pass
//! it by `&mut` into every operation, and take the log out with
//! [`Session::drain`] when done. No state is shared between sessions.

use anyhow::Result;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use crate::models::{Document, Event, Notification};
use crate::notify::{NotificationSink, NOTIFICATIONS_FILE};
use crate::store::CollectionStore;
use crate::tracker::{EventRecorder, SESSION_PROGRESS_FILE};

pub const EVENT_BROADCAST_SENT: &str = "Broadcast sent";
pub const EVENT_BROADCAST_FAILED: &str = "Broadcast failed";

/// Label of the event tracked after a document lands in `collection`.
pub fn document_added_event(collection: &str) -> String {
    format!("Document added to {}", collection)
}

pub struct Session {
    data_dir: PathBuf,
    recorder: EventRecorder,
    store: CollectionStore,
    notifier: NotificationSink,
}

impl Session {
    /// Start a fresh session rooted at `data_dir`.
    ///
    /// The session log starts empty; the first tracked event replaces any
    /// `session_progress.json` left by a previous session.
    pub fn init(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            recorder: EventRecorder::new(data_dir.join(SESSION_PROGRESS_FILE)),
            store: CollectionStore::new(&data_dir),
            notifier: NotificationSink::new(data_dir.join(NOTIFICATIONS_FILE)),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn notifier(&self) -> &NotificationSink {
        &self.notifier
    }

    /// Record a custom event.
    pub fn track(&mut self, event: &str, data: Map<String, Value>) {
        self.recorder.track(event, data);
    }

    /// Events tracked so far, in call order.
    pub fn progress(&self) -> &[Event] {
        self.recorder.events()
    }

    /// End the session, handing back its log.
    pub fn drain(&mut self) -> Vec<Event> {
        self.recorder.drain()
    }

    /// Store a document and track the addition. Storage errors propagate.
    pub fn add_document(&mut self, collection: &str, document: &Document) -> Result<String> {
        let id = self.store.add_document(collection, document)?;
        self.recorder
            .track(&document_added_event(collection), object(json!({ "doc_id": id })));
        Ok(id)
    }

    /// Broadcast a notification.
    ///
    /// A failed write does not fail the caller; it is logged and tracked as a
    /// `"Broadcast failed"` event instead of `"Broadcast sent"`.
    pub fn broadcast(
        &mut self,
        title: &str,
        message: &str,
        metadata: Map<String, Value>,
    ) -> Option<Notification> {
        match self.notifier.broadcast(title, message, metadata) {
            Ok(notification) => {
                let data = match serde_json::to_value(&notification) {
                    Ok(Value::Object(map)) => map,
                    _ => object(json!({ "title": title })),
                };
                self.recorder.track(EVENT_BROADCAST_SENT, data);
                Some(notification)
            }
            Err(e) => {
                tracing::warn!(title, error = %e, "broadcast could not be persisted");
                self.recorder.track(
                    EVENT_BROADCAST_FAILED,
                    object(json!({ "title": title, "error": format!("{:#}", e) })),
                );
                None
            }
        }
    }
}

/// Unwrap a `json!({...})` literal into its map.
pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_document_tracks_doc_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut session = Session::init(tmp.path());

        let doc = Document::Other(object(json!({"title": "Test Script"})));
        let id = session.add_document("test_collection", &doc).unwrap();

        let events = session.progress();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "Document added to test_collection");
        assert_eq!(events[0].data["doc_id"], id.as_str());
    }

    #[test]
    fn failed_add_tracks_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let mut session = Session::init(&blocker);

        let doc = Document::Other(Map::new());
        assert!(session.add_document("notes", &doc).is_err());
        assert!(session.progress().is_empty());
    }

    #[test]
    fn broadcast_tracks_sent_event() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut session = Session::init(tmp.path());

        let sent = session.broadcast("Title", "Body", object(json!({"scriptId": "s1"})));
        assert!(sent.is_some());
        let events = session.progress();
        assert_eq!(events[0].event, EVENT_BROADCAST_SENT);
        assert_eq!(events[0].data["title"], "Title");
        assert_eq!(events[0].data["metadata"]["scriptId"], "s1");
    }

    #[test]
    fn broadcast_failure_is_tracked_not_raised() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let mut session = Session::init(&blocker);

        assert!(session.broadcast("Title", "Body", Map::new()).is_none());
        assert_eq!(session.progress().len(), 1);
        assert_eq!(session.progress()[0].event, EVENT_BROADCAST_FAILED);
    }

    #[test]
    fn sessions_do_not_share_logs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut a = Session::init(tmp.path().join("a"));
        let b = Session::init(tmp.path().join("b"));
        a.track("only in a", Map::new());
        assert_eq!(a.progress().len(), 1);
        assert!(b.progress().is_empty());
    }
}
