use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::task::JoinError;

use crate::application::{error::ErrorReport, pipeline::PipelineError};

const SOURCE: &str = "infra::http::api";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Uniform `{ error, details? }` envelope for the JSON API.
///
/// `details` only ever carries a fixed stage description and, for engine
/// failures, the bounded stderr excerpt. The full error chain goes to the
/// attached [`ErrorReport`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    details: Option<String>,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        message: &'static str,
        details: Option<String>,
        report: ErrorReport,
    ) -> Self {
        Self {
            status,
            message,
            details,
            report,
        }
    }

    pub fn bad_request(message: &'static str, details: Option<String>) -> Self {
        let report = ErrorReport::from_message(
            SOURCE,
            StatusCode::BAD_REQUEST,
            details.clone().unwrap_or_else(|| message.to_string()),
        );
        Self::new(StatusCode::BAD_REQUEST, message, details, report)
    }

    pub fn missing_prompt() -> Self {
        Self::bad_request("No userPrompt provided.", None)
    }

    pub fn from_rejection(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid request body.", Some(rejection.body_text()))
    }

    pub fn from_join(err: JoinError) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let report = ErrorReport::from_error(SOURCE, status, &err);
        Self::new(status, "Internal server error", None, report)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = if matches!(err, PipelineError::InvalidInput(_)) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let report = ErrorReport::from_error(SOURCE, status, &err);

        let (message, details) = match &err {
            PipelineError::InvalidInput(inner) => ("Invalid userPrompt.", Some(inner.to_string())),
            PipelineError::CaptionGenerationFailed(_) => (
                "Caption generation failed",
                Some("The caption service did not return usable captions.".to_string()),
            ),
            PipelineError::PersistenceFailed(_) => (
                "Failed to save render parameters",
                Some("The render parameters could not be written.".to_string()),
            ),
            PipelineError::InvocationError(_) => (
                "Remotion render failed",
                Some("The render engine could not be run.".to_string()),
            ),
            PipelineError::RenderFailed {
                exit_code,
                stderr_excerpt,
            } => (
                "Remotion render failed",
                Some(with_excerpt(
                    format!("The render engine exited with code {exit_code}."),
                    stderr_excerpt,
                )),
            ),
            PipelineError::RenderTimedOut {
                timeout,
                stderr_excerpt,
            } => (
                "Remotion render failed",
                Some(with_excerpt(
                    format!(
                        "The render engine did not finish within {}s.",
                        timeout.as_secs()
                    ),
                    stderr_excerpt,
                )),
            ),
            PipelineError::MissingOutput { .. } => (
                "Remotion render failed",
                Some("The render engine finished without producing a video.".to_string()),
            ),
        };

        Self::new(status, message, details, report)
    }
}

fn with_excerpt(summary: String, excerpt: &str) -> String {
    if excerpt.is_empty() {
        summary
    } else {
        format!("{summary} {excerpt}")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message.to_string(),
            details: self.details,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
