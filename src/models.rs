//! Core data models used throughout Myth Audio.
//!
//! These types represent the events, notifications, and collection documents
//! that flow through the generation pipeline. Field names follow the on-disk
//! JSON layout (`ebookId`, `chapterNumber`, `estimated_duration`), which is
//! why some structs carry `serde(rename)` attributes.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Collection holding generated audio scripts.
pub const AUDIO_SCRIPTS: &str = "audio_scripts";
/// Collection holding grant compliance records.
pub const GRANT_LOGS: &str = "grant_logs";

/// A timestamped, labeled record of something the pipeline did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub data: Map<String, Value>,
}

/// A message describing new content, intended for affiliates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// One cue in an audio script, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScriptElement {
    Narration {
        text: String,
        #[serde(default)]
        timing: String,
    },
    Sfx {
        description: String,
    },
    Music {
        description: String,
    },
    Dialogue {
        character: String,
        text: String,
        #[serde(default)]
        emotion: String,
    },
}

/// The principal generated artifact, stored in [`AUDIO_SCRIPTS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioScript {
    pub title: String,
    #[serde(rename = "ebookId")]
    pub ebook_id: String,
    #[serde(rename = "chapterNumber")]
    pub chapter_number: u32,
    pub script: Vec<ScriptElement>,
    pub estimated_duration: String,
    pub theme: String,
}

/// Metadata attached to a [`GrantLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantMetadata {
    #[serde(rename = "chapterNumber")]
    pub chapter_number: u32,
    pub theme: String,
    #[serde(rename = "affiliateHook")]
    pub affiliate_hook: String,
}

/// Compliance record proving a deliverable was produced, stored in [`GRANT_LOGS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantLog {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "ebookId")]
    pub ebook_id: String,
    pub metadata: GrantMetadata,
    pub created_at: DateTime<Utc>,
}

/// A document bound for a collection.
///
/// Known collections only accept their own variant; every other collection
/// takes an arbitrary JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    AudioScript(AudioScript),
    GrantLog(GrantLog),
    Other(Map<String, Value>),
}

impl Document {
    /// Parse a raw JSON value into the document type expected by `collection`.
    pub fn from_value(collection: &str, value: Value) -> Result<Self> {
        match collection {
            AUDIO_SCRIPTS => {
                let script = serde_json::from_value(value)
                    .with_context(|| format!("document does not match the {} shape", collection))?;
                Ok(Document::AudioScript(script))
            }
            GRANT_LOGS => {
                let log = serde_json::from_value(value)
                    .with_context(|| format!("document does not match the {} shape", collection))?;
                Ok(Document::GrantLog(log))
            }
            _ => match value {
                Value::Object(map) => Ok(Document::Other(map)),
                other => bail!("document must be a JSON object, got: {}", other),
            },
        }
    }

    /// Check that this document may be stored in `collection`.
    pub fn check_collection(&self, collection: &str) -> Result<()> {
        let ok = match self {
            Document::AudioScript(_) => collection == AUDIO_SCRIPTS,
            Document::GrantLog(_) => collection == GRANT_LOGS,
            Document::Other(_) => collection != AUDIO_SCRIPTS && collection != GRANT_LOGS,
        };
        if !ok {
            bail!(
                "{} document cannot be stored in collection '{}'",
                self.kind(),
                collection
            );
        }
        Ok(())
    }

    /// Short name of the variant, for messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::AudioScript(_) => "audio script",
            Document::GrantLog(_) => "grant log",
            Document::Other(_) => "generic",
        }
    }

    /// Serialize into the JSON object written to disk.
    pub fn to_record(&self) -> Result<Map<String, Value>> {
        let value = match self {
            Document::AudioScript(s) => serde_json::to_value(s)?,
            Document::GrantLog(g) => serde_json::to_value(g)?,
            Document::Other(map) => return Ok(map.clone()),
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => bail!("document did not serialize to a JSON object"),
        }
    }
}
