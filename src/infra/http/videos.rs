use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::error;

use crate::{application::error::HttpError, infra::artifacts::ArtifactError};

use super::HttpState;

pub(super) async fn serve_video(
    State(state): State<HttpState>,
    Path(name): Path<String>,
) -> Response {
    const SOURCE: &str = "infra::http::videos::serve_video";

    match state.artifacts.read(&name).await {
        Ok(bytes) => build_video_response(&name, bytes),
        Err(ArtifactError::InvalidName) => not_found(SOURCE, format!("rejected name `{name}`")),
        Err(ArtifactError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            not_found(SOURCE, format!("no video named `{name}`"))
        }
        Err(err) => {
            error!(
                target = SOURCE,
                name = %name,
                error = %err,
                "failed to read rendered video"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read video",
                &err,
            )
            .into_response()
        }
    }
}

fn not_found(source: &'static str, detail: String) -> Response {
    HttpError::new(source, StatusCode::NOT_FOUND, "Video not found", detail).into_response()
}

fn build_video_response(name: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Each job id is written once.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
