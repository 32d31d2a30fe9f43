//! Caption generation through the Gemini `generateContent` endpoint.

use std::time::Instant;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    application::captions::{CaptionError, CaptionGenerator, caption_instructions},
    config::CaptionSettings,
    domain::render::{CaptionResult, PromptText},
};

use super::error::InfraError;

const TARGET: &str = "infra::gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_EXCERPT: usize = 512;

#[derive(Debug, Clone)]
pub struct GeminiCaptionGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiCaptionGenerator {
    pub fn new(settings: &CaptionSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("captionreel/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                settings.base_url, settings.model
            ),
            api_key: settings.api_key.clone(),
        })
    }

    async fn request(&self, prompt: &PromptText) -> Result<CaptionResult, CaptionError> {
        let instructions = caption_instructions(prompt);
        let body = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart {
                    text: &instructions,
                }],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CaptionError::unavailable(describe_transport_error(err)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CaptionError::unavailable(describe_transport_error(err)))?;

        if !status.is_success() {
            return Err(CaptionError::unavailable(format!(
                "caption service answered {}: {}",
                status.as_u16(),
                body_excerpt(status, &bytes)
            )));
        }

        debug!(
            target = TARGET,
            body = %String::from_utf8_lossy(&bytes),
            "Caption service raw response"
        );

        parse_generate_content(&bytes)
    }
}

#[async_trait]
impl CaptionGenerator for GeminiCaptionGenerator {
    async fn generate_captions(&self, prompt: &PromptText) -> Result<CaptionResult, CaptionError> {
        let started_at = Instant::now();
        let result = self.request(prompt).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match &result {
            Ok(captions) => info!(
                target = TARGET,
                op = "gemini::generate_captions",
                result = "ok",
                elapsed_ms,
                caption_lines = captions.line_count(),
                "Captions generated"
            ),
            Err(err) => {
                counter!("captionreel_caption_upstream_error_total", "kind" => err.kind())
                    .increment(1);
                warn!(
                    target = TARGET,
                    op = "gemini::generate_captions",
                    result = "error",
                    error_code = err.kind(),
                    elapsed_ms,
                    error = %err,
                    "Caption generation failed"
                );
            }
        }

        result
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Unwrap `candidates[0].content.parts[0].text` from a response body.
pub fn parse_generate_content(body: &[u8]) -> Result<CaptionResult, CaptionError> {
    let response: GenerateContentResponse = serde_json::from_slice(body)
        .map_err(|err| CaptionError::malformed(format!("response is not valid JSON: {err}")))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CaptionError::malformed("response has no candidates"))?;
    let content = candidate
        .content
        .ok_or_else(|| CaptionError::malformed("first candidate has no content"))?;
    let text = content
        .parts
        .into_iter()
        .next()
        .and_then(|part| part.text)
        .ok_or_else(|| CaptionError::malformed("first candidate has no text part"))?;

    CaptionResult::new(text).map_err(|_| CaptionError::malformed("first text part is blank"))
}

fn describe_transport_error(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "request to caption service timed out".to_string()
    } else if err.is_connect() {
        "could not connect to caption service".to_string()
    } else {
        format!("request to caption service failed: {}", err.without_url())
    }
}

fn body_excerpt(status: StatusCode, bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    trimmed.chars().take(ERROR_BODY_EXCERPT).collect()
}
