use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{domain::render::RenderRequest, infra::http::HttpState};

use super::{
    error::ApiError,
    models::{RenderVideoRequest, RenderVideoResponse},
};

const SUCCESS_MESSAGE: &str = "Video rendered successfully!";

pub async fn render_video(
    State(state): State<HttpState>,
    payload: Result<Json<RenderVideoRequest>, JsonRejection>,
) -> Result<Json<RenderVideoResponse>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_rejection)?;
    let prompt = payload
        .user_prompt
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(ApiError::missing_prompt)?;

    // Runs detached from the connection: a client that disconnects does not
    // abort the render or its cleanup.
    let pipeline = state.pipeline.clone();
    let artifact =
        tokio::spawn(async move { pipeline.render_video(RenderRequest::new(prompt)).await })
            .await
            .map_err(ApiError::from_join)??;

    Ok(Json(RenderVideoResponse {
        message: SUCCESS_MESSAGE.to_string(),
        output_path: artifact.path,
    }))
}
