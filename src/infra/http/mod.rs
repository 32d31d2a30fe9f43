pub mod api;
mod middleware;
mod videos;

pub use middleware::REQUEST_ID_HEADER;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{application::pipeline::RenderPipeline, infra::artifacts::ArtifactStorage};

use self::middleware::{cors, log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<RenderPipeline>,
    pub artifacts: Arc<ArtifactStorage>,
}

impl HttpState {
    pub fn new(pipeline: Arc<RenderPipeline>) -> Self {
        let artifacts = pipeline.artifacts().clone();
        Self {
            pipeline,
            artifacts,
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .merge(api::build_api_router())
        .route("/videos/{name}", get(videos::serve_video))
        .route("/_health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(cors))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
