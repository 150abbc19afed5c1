//! Session event recording.
//!
//! [`EventRecorder`] keeps an append-only, in-memory list of [`Event`]s and
//! mirrors the whole list to `session_progress.json` after every append.
//! Tracking must never break the pipeline, so a failed write is logged and
//! the in-memory append stands.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::models::Event;

/// File name of the persisted session log inside the data directory.
pub const SESSION_PROGRESS_FILE: &str = "session_progress.json";

pub struct EventRecorder {
    events: Vec<Event>,
    path: Option<PathBuf>,
}

impl EventRecorder {
    /// Recorder that mirrors its log to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            events: Vec::new(),
            path: Some(path.into()),
        }
    }

    /// Recorder with no durable mirror.
    pub fn in_memory() -> Self {
        Self {
            events: Vec::new(),
            path: None,
        }
    }

    pub fn track(&mut self, event: &str, data: Map<String, Value>) {
        self.events.push(Event {
            timestamp: Utc::now(),
            event: event.to_string(),
            data,
        });

        if let Some(path) = &self.path {
            if let Err(e) = write_events(path, &self.events) {
                tracing::warn!(event, error = %e, "could not persist session progress");
            }
        }
    }

    /// All events in append order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take the log, leaving the recorder empty. The durable mirror is left as is.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

fn write_events(path: &Path, events: &[Event]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(events)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a persisted session log. A missing file is an empty log.
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session log: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session log: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn track_appends_in_order_and_persists() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(SESSION_PROGRESS_FILE);
        let mut rec = EventRecorder::new(&path);

        rec.track("Test event 1", data(json!({"data": "value1"})));
        rec.track("Test event 2", data(json!({"data": "value2"})));

        let events = rec.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "Test event 1");
        assert_eq!(events[1].event, "Test event 2");
        assert!(events[0].timestamp <= events[1].timestamp);

        let on_disk = load_events(&path).unwrap();
        assert_eq!(on_disk, events);
    }

    #[test]
    fn earlier_entries_are_never_altered() {
        let mut rec = EventRecorder::in_memory();
        rec.track("first", Map::new());
        let snapshot = rec.events()[0].clone();
        rec.track("second", data(json!({"k": 1})));
        rec.track("third", Map::new());
        assert_eq!(rec.events()[0], snapshot);
        assert_eq!(rec.events().len(), 3);
    }

    #[test]
    fn persistence_failure_keeps_memory_log() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let mut rec = EventRecorder::new(blocker.join(SESSION_PROGRESS_FILE));
        rec.track("still recorded", Map::new());
        assert_eq!(rec.events().len(), 1);
    }

    #[test]
    fn drain_empties_the_log() {
        let mut rec = EventRecorder::in_memory();
        rec.track("a", Map::new());
        rec.track("b", Map::new());
        let drained = rec.drain();
        assert_eq!(drained.len(), 2);
        assert!(rec.events().is_empty());
    }

    #[test]
    fn load_missing_file_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load_events(&tmp.path().join("nope.json")).unwrap().is_empty());
    }
}
