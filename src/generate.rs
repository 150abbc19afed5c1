//! Chapter audio script generation.
//!
//! [`generate_chapter_audio_script`] is the pipeline entry point. For one
//! chapter it:
//!
//! 1. tracks that generation started,
//! 2. builds a prompt from the chapter, theme, and affiliate hook,
//! 3. requests a JSON script from the model (or takes the fallback),
//! 4. normalizes the reply into an [`AudioScript`],
//! 5. stores the script in `audio_scripts`,
//! 6. stores a [`GrantLog`] in `grant_logs`,
//! 7. broadcasts a notification,
//! 8. tracks that generation completed.
//!
//! Every call tracks exactly five events. Storage errors propagate and leave
//! the events tracked so far in the session log.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ai::{
    request_structured_content, ContentRequester, ContentSource, PLACEHOLDER_DURATION,
    UNSPECIFIED_THEME,
};
use crate::models::{
    AudioScript, Document, GrantLog, GrantMetadata, ScriptElement, AUDIO_SCRIPTS, GRANT_LOGS,
};
use crate::session::{object, Session};

pub const EVENT_GENERATION_STARTED: &str = "Chapter audio script generation started";
pub const EVENT_GENERATION_COMPLETED: &str = "Chapter audio script generation completed";

const GRANT_EVENT_TYPE: &str = "ebook_created";
const BROADCAST_MESSAGE: &str = "A new chapter has manifested. Share to unlock mythic badges.";

/// Chapter input. Both fields are optional; nothing is validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub ebook_id: String,
    pub chapter: Chapter,
    pub chapter_number: u32,
    pub theme: Option<String>,
    pub affiliate_hook: Option<String>,
}

impl GenerationRequest {
    pub fn new(ebook_id: impl Into<String>, chapter: Chapter, chapter_number: u32) -> Self {
        Self {
            ebook_id: ebook_id.into(),
            chapter,
            chapter_number,
            theme: None,
            affiliate_hook: None,
        }
    }

    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn affiliate_hook(mut self, hook: impl Into<String>) -> Self {
        self.affiliate_hook = Some(hook.into());
        self
    }

    /// The chapter title, or `"Chapter N"` when none was given.
    pub fn chapter_title(&self) -> String {
        self.chapter
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Chapter {}", self.chapter_number))
    }
}

/// Result of one generation.
///
/// `script` is the document as handed to the store. The stored record also
/// carries the store-assigned `id` (equal to `script_id`) and `created_at`;
/// read it back with `CollectionStore::load_collection` when those are needed.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub script_id: String,
    pub grant_log_id: String,
    pub script: AudioScript,
    #[serde(skip)]
    pub source: ContentSource,
}

/// Build the model prompt for a chapter.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str("Generate a detailed audio script for the following chapter:\n\n");
    prompt.push_str(&format!("Chapter Title: {}\n", request.chapter_title()));
    prompt.push_str(&format!(
        "Theme: {}\n",
        request.theme.as_deref().unwrap_or(UNSPECIFIED_THEME)
    ));
    prompt.push_str("Tone: Dark, mysterious, horror-themed\n");
    prompt.push_str("Target Audience: Mature audiences interested in mythic horror\n");
    if let Some(hook) = request.affiliate_hook.as_deref().filter(|h| !h.is_empty()) {
        prompt.push_str(&format!("Affiliate Hook (weave in subtly): {}\n", hook));
    }
    if let Some(content) = request.chapter.content.as_deref().filter(|c| !c.is_empty()) {
        prompt.push_str("\nChapter Content:\n");
        prompt.push_str(content);
        prompt.push('\n');
    }
    prompt.push_str(
        r#"
The script should include:
1. Narrative text with dramatic pacing
2. Sound effect cues
3. Music cues
4. Character dialogue with emotional direction
5. Timing suggestions for audio production

Respond with a single JSON object with the following structure:
{
  "title": "Chapter title",
  "script": [
    {"type": "narration", "text": "...", "timing": "..."},
    {"type": "sfx", "description": "..."},
    {"type": "music", "description": "..."},
    {"type": "dialogue", "character": "...", "text": "...", "emotion": "..."}
  ],
  "estimated_duration": "minutes",
  "theme": "horror theme"
}
"#,
    );
    prompt
}

/// Shape a model reply (or fallback) into an [`AudioScript`].
///
/// Missing or malformed fields get defaults; script elements that do not parse
/// are dropped. `ebookId` and `chapterNumber` always come from the request.
pub fn normalize_script(raw: &Map<String, Value>, request: &GenerationRequest) -> AudioScript {
    let text_field = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let script: Vec<ScriptElement> = raw
        .get("script")
        .and_then(Value::as_array)
        .map(|elements| {
            elements
                .iter()
                .filter_map(|el| match serde_json::from_value::<ScriptElement>(el.clone()) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping malformed script element");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    AudioScript {
        title: text_field("title").unwrap_or_else(|| request.chapter_title()),
        ebook_id: request.ebook_id.clone(),
        chapter_number: request.chapter_number,
        script,
        estimated_duration: text_field("estimated_duration")
            .unwrap_or_else(|| PLACEHOLDER_DURATION.to_string()),
        theme: text_field("theme")
            .or_else(|| request.theme.clone())
            .unwrap_or_else(|| UNSPECIFIED_THEME.to_string()),
    }
}

/// Generate, store, log, and announce the audio script for one chapter.
///
/// # Errors
///
/// Only storage errors from the collection store. AI failures take the
/// fallback path and never surface here.
pub async fn generate_chapter_audio_script(
    session: &mut Session,
    requester: &dyn ContentRequester,
    model: &str,
    request: &GenerationRequest,
) -> Result<GenerationOutput> {
    session.track(
        EVENT_GENERATION_STARTED,
        object(json!({
            "ebookId": request.ebook_id,
            "chapterNumber": request.chapter_number,
            "theme": request.theme,
        })),
    );

    let prompt = build_prompt(request);
    let (raw, source) =
        request_structured_content(requester, model, &prompt, request.theme.as_deref()).await;
    let script = normalize_script(&raw, request);

    let script_id = session.add_document(AUDIO_SCRIPTS, &Document::AudioScript(script.clone()))?;

    let grant_log = GrantLog {
        event_type: GRANT_EVENT_TYPE.to_string(),
        ebook_id: request.ebook_id.clone(),
        metadata: GrantMetadata {
            chapter_number: request.chapter_number,
            theme: request
                .theme
                .clone()
                .unwrap_or_else(|| UNSPECIFIED_THEME.to_string()),
            affiliate_hook: request.affiliate_hook.clone().unwrap_or_default(),
        },
        created_at: Utc::now(),
    };
    let grant_log_id = session.add_document(GRANT_LOGS, &Document::GrantLog(grant_log))?;

    session.broadcast(
        &format!("New Lore: {}", request.chapter_title()),
        BROADCAST_MESSAGE,
        object(json!({
            "ebookId": request.ebook_id,
            "scriptId": script_id,
        })),
    );

    let mut completed = object(json!({
        "ebookId": request.ebook_id,
        "chapterNumber": request.chapter_number,
        "script_id": script_id,
        "grant_log_id": grant_log_id,
        "source": source.label(),
    }));
    if let ContentSource::Fallback { reason } = &source {
        completed.insert("fallback_reason".to_string(), Value::String(reason.clone()));
    }
    session.track(EVENT_GENERATION_COMPLETED, completed);

    tracing::info!(
        ebook_id = %request.ebook_id,
        chapter = request.chapter_number,
        script_id = %script_id,
        source = source.label(),
        "chapter audio script generated"
    );

    Ok(GenerationOutput {
        script_id,
        grant_log_id,
        script,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "ebook_001",
            Chapter {
                title: Some("The Summoning".to_string()),
                content: Some("In the depths of the forest...".to_string()),
            },
            1,
        )
    }

    #[test]
    fn prompt_embeds_chapter_details() {
        let req = request()
            .theme("fox-demon horror")
            .affiliate_hook("Share this tale");
        let prompt = build_prompt(&req);
        assert!(prompt.contains("The Summoning"));
        assert!(prompt.contains("fox-demon horror"));
        assert!(prompt.contains("Share this tale"));
        assert!(prompt.contains("In the depths of the forest"));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn prompt_without_title_uses_chapter_number() {
        let req = GenerationRequest::new("e", Chapter::default(), 7);
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Chapter Title: Chapter 7"));
        assert!(!prompt.contains("Affiliate Hook"));
        assert!(!prompt.contains("Chapter Content"));
    }

    #[test]
    fn normalize_fills_defaults() {
        let script = normalize_script(&Map::new(), &request());
        assert_eq!(script.title, "The Summoning");
        assert_eq!(script.ebook_id, "ebook_001");
        assert_eq!(script.chapter_number, 1);
        assert!(script.script.is_empty());
        assert_eq!(script.estimated_duration, PLACEHOLDER_DURATION);
        assert_eq!(script.theme, UNSPECIFIED_THEME);
    }

    #[test]
    fn normalize_prefers_model_values_but_not_ids() {
        let raw = object(json!({
            "title": "A Darker Title",
            "ebookId": "spoofed",
            "chapterNumber": 99,
            "script": [
                {"type": "narration", "text": "Night fell.", "timing": "0:00-0:05"},
                {"type": "laser", "pew": true},
                {"type": "music", "description": "low drone"}
            ],
            "estimated_duration": "6 minutes",
            "theme": "folk horror"
        }));
        let script = normalize_script(&raw, &request().theme("ignored"));
        assert_eq!(script.title, "A Darker Title");
        assert_eq!(script.ebook_id, "ebook_001");
        assert_eq!(script.chapter_number, 1);
        assert_eq!(script.script.len(), 2);
        assert_eq!(script.estimated_duration, "6 minutes");
        assert_eq!(script.theme, "folk horror");
    }

    #[test]
    fn normalize_uses_requested_theme_when_model_has_none() {
        let script = normalize_script(&Map::new(), &request().theme("kitsune"));
        assert_eq!(script.theme, "kitsune");
    }
}
