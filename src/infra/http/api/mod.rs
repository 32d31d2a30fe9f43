pub mod error;
pub mod handlers;
pub mod models;

use axum::{Router, routing::post};

use super::HttpState;

pub fn build_api_router() -> Router<HttpState> {
    Router::new().route("/render-video", post(handlers::render_video))
}
