//! Caption generation seam between the pipeline and the text model.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::render::{CaptionResult, PromptText};

/// Minimum number of caption lines requested from the model.
pub const CAPTION_LINE_FLOOR: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptionError {
    /// Transport, auth or status failure talking to the text model.
    #[error("caption service unavailable: {message}")]
    UpstreamUnavailable { message: String },
    /// The service answered, but not in the envelope shape we expect.
    #[error("caption service returned a malformed response: {reason}")]
    MalformedUpstreamResponse { reason: String },
}

impl CaptionError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedUpstreamResponse {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::MalformedUpstreamResponse { .. } => "malformed_upstream_response",
        }
    }
}

#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    /// Turn a validated prompt into a caption script. One attempt, no retry.
    async fn generate_captions(&self, prompt: &PromptText) -> Result<CaptionResult, CaptionError>;
}

/// Build the single-turn instruction sent to the text model.
pub fn caption_instructions(prompt: &PromptText) -> String {
    format!(
        "Make a caption script for a TikTok-style video. Give only 1 suggestion. \
         Generate subtitles only, with at least {CAPTION_LINE_FLOOR} creative lines, \
         and no timestamps.\n\nPrompt: {}",
        prompt.as_str()
    )
}
