//! Values exchanged between the stages of a render run.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Upper bound on prompt length, counted in characters.
pub const MAX_PROMPT_CHARS: usize = 500;

/// MIME type of every artifact the render engine produces.
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Identifier scoping every file a single render run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConstraints {
    pub max_length: usize,
}

impl Default for RenderConstraints {
    fn default() -> Self {
        Self {
            max_length: MAX_PROMPT_CHARS,
        }
    }
}

/// An incoming request to turn a prompt into a video.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub prompt_text: String,
    pub constraints: RenderConstraints,
}

impl RenderRequest {
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            constraints: RenderConstraints::default(),
        }
    }

    /// Check the prompt against the request constraints.
    pub fn validate(&self) -> Result<PromptText, DomainError> {
        PromptText::parse(&self.prompt_text, self.constraints.max_length)
    }
}

/// A prompt that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptText(String);

impl PromptText {
    pub fn parse(raw: &str, max_length: usize) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::validation("prompt must not be empty"));
        }

        let length = raw.chars().count();
        if length > max_length {
            return Err(DomainError::validation(format!(
                "prompt is {length} characters; the limit is {max_length}"
            )));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Caption script produced by the text model, already unwrapped from the
/// upstream response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionResult {
    text: String,
}

impl CaptionResult {
    pub fn new(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::invariant("caption text must not be empty"));
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of non-blank lines in the script.
    pub fn line_count(&self) -> usize {
        self.text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Document the render engine reads its inputs from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderParameters {
    /// Caption text the engine lays over the video.
    pub prompt_text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RenderParameters {
    pub fn from_captions(captions: &CaptionResult) -> Self {
        Self {
            prompt_text: captions.text().to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Exit status and captured streams of one engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJobOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RenderJobOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// A produced video, addressed by its public locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoArtifact {
    pub path: String,
    pub mime_type: &'static str,
}

impl VideoArtifact {
    pub fn mp4(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: VIDEO_MIME_TYPE,
        }
    }
}
