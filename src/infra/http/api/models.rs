use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoRequest {
    #[serde(default)]
    pub user_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoResponse {
    pub message: String,
    pub output_path: String,
}
