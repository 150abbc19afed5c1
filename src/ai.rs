//! AI content requester abstraction and implementations.
//!
//! Defines the [`ContentRequester`] trait and concrete implementations:
//! - **[`DisabledRequester`]**: always fails; used when no credential is configured
//!   or `ai.provider = "disabled"`.
//! - **[`GeminiRequester`]**: calls the Google Gemini `generateContent` API and
//!   asks for a JSON response.
//!
//! Requesters return `Result<_, AiError>`. Callers that need a value no matter
//! what go through [`request_structured_content`], which turns any error into
//! the deterministic [`fallback_script`].
//!
//! # Provider Selection
//!
//! ```rust
//! # use myth_audio::config::AiConfig;
//! # use myth_audio::ai::create_requester;
//! let mut config = AiConfig::default();
//! config.provider = "disabled".to_string();
//! let requester = create_requester(&config).unwrap();
//! assert_eq!(requester.name(), "disabled");
//! ```
//!
//! A single attempt is made per request. There is no retry.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::config::AiConfig;

/// Duration placeholder used when none is known.
pub const PLACEHOLDER_DURATION: &str = "unknown";
/// Theme used when neither the model nor the caller supplied one.
pub const UNSPECIFIED_THEME: &str = "unspecified";

const FALLBACK_NARRATION: &str =
    "Script generation was unavailable for this chapter. This placeholder narration stands in until the script can be generated.";

/// Environment variable consulted when the configured one is `GEMINI_API_KEY` and unset.
const SECONDARY_KEY_ENV: &str = "GOOGLE_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no API credential found in environment variable {0}")]
    MissingCredential(String),
    #[error("AI provider is disabled")]
    Disabled,
    #[error("request to AI provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("AI provider returned no text")]
    EmptyResponse,
    #[error("AI response is not a JSON object: {0}")]
    MalformedResponse(String),
}

/// Where a piece of structured content came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSource {
    Ai,
    Fallback { reason: String },
}

impl ContentSource {
    pub fn label(&self) -> &'static str {
        match self {
            ContentSource::Ai => "ai",
            ContentSource::Fallback { .. } => "fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ContentSource::Fallback { .. })
    }
}

/// Trait for generative model backends that answer a prompt with a JSON object.
#[async_trait]
pub trait ContentRequester: Send + Sync {
    /// Backend identifier (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Send `prompt` to `model` and parse the reply as a JSON object.
    async fn request_json(&self, model: &str, prompt: &str) -> Result<Map<String, Value>, AiError>;
}

/// Request structured content, falling back to [`fallback_script`] on any error.
///
/// Never fails. The returned [`ContentSource`] tells the caller which branch was taken.
pub async fn request_structured_content(
    requester: &dyn ContentRequester,
    model: &str,
    prompt: &str,
    theme: Option<&str>,
) -> (Map<String, Value>, ContentSource) {
    match requester.request_json(model, prompt).await {
        Ok(content) => (content, ContentSource::Ai),
        Err(e) => {
            tracing::warn!(requester = requester.name(), model, error = %e, "using fallback script");
            (
                fallback_script(theme),
                ContentSource::Fallback {
                    reason: e.to_string(),
                },
            )
        }
    }
}

/// Deterministic stand-in for a generated script.
///
/// Carries no title so the chapter's own title is used downstream.
pub fn fallback_script(theme: Option<&str>) -> Map<String, Value> {
    let value = json!({
        "script": [
            {
                "type": "narration",
                "text": FALLBACK_NARRATION,
                "timing": "0:00-0:10"
            }
        ],
        "estimated_duration": PLACEHOLDER_DURATION,
        "theme": theme.unwrap_or(UNSPECIFIED_THEME),
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============ Disabled Requester ============

/// A requester that always fails, triggering the fallback path.
pub struct DisabledRequester {
    missing_env: Option<String>,
}

impl DisabledRequester {
    /// Disabled by configuration.
    pub fn new() -> Self {
        Self { missing_env: None }
    }

    /// Disabled because `var` holds no credential.
    pub fn missing_credential(var: &str) -> Self {
        Self {
            missing_env: Some(var.to_string()),
        }
    }
}

impl Default for DisabledRequester {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentRequester for DisabledRequester {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn request_json(
        &self,
        _model: &str,
        _prompt: &str,
    ) -> Result<Map<String, Value>, AiError> {
        match &self.missing_env {
            Some(var) => Err(AiError::MissingCredential(var.clone())),
            None => Err(AiError::Disabled),
        }
    }
}

// ============ Gemini Requester ============

/// Requester using the Google Gemini REST API.
///
/// Calls `POST {endpoint}/models/{model}:generateContent` with
/// `responseMimeType = "application/json"`, bounded by `ai.timeout_secs`.
pub struct GeminiRequester {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiRequester {
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ContentRequester for GeminiRequester {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn request_json(&self, model: &str, prompt: &str) -> Result<Map<String, Value>, AiError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, model);
        let body = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        tracing::debug!(model, "requesting structured content");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await?;
        let text = parse_gemini_response(&json)?;
        parse_json_object(&text)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &Value) -> Result<String, AiError> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or(AiError::EmptyResponse)?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(text)
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fences(text: &str) -> &str {
    if let Some((_, rest)) = text.split_once("```json") {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some((_, rest)) = text.split_once("```") {
        rest.split("```").next().unwrap_or(rest)
    } else {
        text
    }
}

fn parse_json_object(text: &str) -> Result<Map<String, Value>, AiError> {
    let cleaned = strip_code_fences(text).trim();
    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AiError::MalformedResponse(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
        Err(e) => Err(AiError::MalformedResponse(e.to_string())),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Look up the API key named by `var`, trying `GOOGLE_API_KEY` as a second
/// choice when `var` is the default `GEMINI_API_KEY`.
fn resolve_api_key(var: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    non_empty(var).or_else(|| {
        if var == "GEMINI_API_KEY" {
            non_empty(SECONDARY_KEY_ENV)
        } else {
            None
        }
    })
}

/// Create the appropriate [`ContentRequester`] based on configuration.
///
/// | Condition | Requester |
/// |-----------|-----------|
/// | `provider = "disabled"` | [`DisabledRequester`] |
/// | no credential in the environment | [`DisabledRequester`] |
/// | `provider = "gemini"` with a credential | [`GeminiRequester`] |
///
/// A missing credential is not an error.
pub fn create_requester(config: &AiConfig) -> Result<Box<dyn ContentRequester>> {
    if !config.is_enabled() {
        return Ok(Box::new(DisabledRequester::new()));
    }
    match resolve_api_key(&config.api_key_env, |name| std::env::var(name).ok()) {
        Some(key) => Ok(Box::new(GeminiRequester::new(config, key)?)),
        None => {
            tracing::info!(
                env = %config.api_key_env,
                "no AI credential configured, scripts will use fallback content"
            );
            Ok(Box::new(DisabledRequester::missing_credential(
                &config.api_key_env,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nEnjoy";
        assert_eq!(strip_code_fences(text).trim(), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fences("```\n{}\n```").trim(), "{}");
        assert_eq!(strip_code_fences("{\"plain\": true}"), "{\"plain\": true}");
    }

    #[test]
    fn non_object_json_is_malformed() {
        assert!(matches!(
            parse_json_object("[1, 2]"),
            Err(AiError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_json_object("the model rambled"),
            Err(AiError::MalformedResponse(_))
        ));
        assert!(parse_json_object("```json\n{\"title\": \"x\"}\n```").is_ok());
    }

    #[test]
    fn parses_gemini_candidate_text() {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "{\"title\": "}, {"text": "\"Night\"}"}]
                }
            }]
        });
        let text = parse_gemini_response(&response).unwrap();
        let map = parse_json_object(&text).unwrap();
        assert_eq!(map["title"], "Night");
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        assert!(matches!(
            parse_gemini_response(&json!({"promptFeedback": {}})),
            Err(AiError::EmptyResponse)
        ));
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = fallback_script(Some("fox-demon horror"));
        let b = fallback_script(Some("fox-demon horror"));
        assert_eq!(a, b);
        assert_eq!(a["theme"], "fox-demon horror");
        assert_eq!(a["script"].as_array().unwrap().len(), 1);
        assert_eq!(a["script"][0]["type"], "narration");
        assert!(a.get("title").is_none());

        assert_eq!(fallback_script(None)["theme"], UNSPECIFIED_THEME);
    }

    #[test]
    fn api_key_resolution() {
        let only_google = |name: &str| (name == "GOOGLE_API_KEY").then(|| "g".to_string());
        assert_eq!(
            resolve_api_key("GEMINI_API_KEY", only_google),
            Some("g".to_string())
        );
        assert_eq!(resolve_api_key("MY_KEY", only_google), None);

        let blank = |_: &str| Some("  ".to_string());
        assert_eq!(resolve_api_key("GEMINI_API_KEY", blank), None);
    }

    #[tokio::test]
    async fn disabled_requester_falls_back() {
        let requester = DisabledRequester::missing_credential("GEMINI_API_KEY");
        let (content, source) =
            request_structured_content(&requester, "gemini-2.0-flash-exp", "prompt", None).await;
        assert_eq!(content, fallback_script(None));
        match source {
            ContentSource::Fallback { reason } => assert!(reason.contains("GEMINI_API_KEY")),
            ContentSource::Ai => panic!("expected fallback"),
        }
    }

    #[test]
    fn disabled_provider_needs_no_credential() {
        let config = AiConfig {
            provider: "disabled".to_string(),
            ..AiConfig::default()
        };
        let requester = create_requester(&config).unwrap();
        assert_eq!(requester.name(), "disabled");
    }
}
