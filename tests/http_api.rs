mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use captionreel::{
    application::captions::CaptionError,
    infra::http::{HttpState, REQUEST_ID_HEADER, build_router},
};
use serde_json::{Value, json};
use support::{EngineBehavior, FAKE_VIDEO, Harness, HarnessBuilder, StubCaptions, StubEngine};
use tower::ServiceExt;

fn router(harness: &Harness) -> Router {
    build_router(HttpState::new(harness.pipeline.clone()))
}

fn render_request(body: Body) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/render-video")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn render_then_fetch_the_video() {
    let harness = HarnessBuilder::default().build();
    let app = router(&harness);

    let response = app
        .clone()
        .oneshot(render_request(Body::from(
            json!({ "userPrompt": "a cat doing a backflip" }).to_string(),
        )))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let body = json_body(response).await;
    assert_eq!(body["message"], "Video rendered successfully!");
    let output_path = body["outputPath"].as_str().expect("outputPath").to_string();
    assert!(output_path.starts_with("/videos/"));

    let response = app.oneshot(get(&output_path)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).expect("type"),
        "video/mp4"
    );
    assert!(response.headers().contains_key(header::CONTENT_LENGTH));
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(bytes.starts_with(FAKE_VIDEO));
}

#[tokio::test]
async fn missing_or_empty_prompt_is_rejected() {
    let harness = HarnessBuilder::default().build();
    let app = router(&harness);

    for body in [json!({}), json!({ "userPrompt": "" }), json!({ "userPrompt": null })] {
        let response = app
            .clone()
            .oneshot(render_request(Body::from(body.to_string())))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let body = json_body(response).await;
        assert_eq!(body["error"], "No userPrompt provided.");
        assert!(body.get("details").is_none());
    }

    assert_eq!(harness.captions.calls(), 0);
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn oversized_prompt_is_rejected() {
    let harness = HarnessBuilder::default().build();

    let response = router(&harness)
        .oneshot(render_request(Body::from(
            json!({ "userPrompt": "a".repeat(501) }).to_string(),
        )))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid userPrompt.");
    assert!(body["details"].as_str().expect("details").contains("500"));
    assert_eq!(harness.captions.calls(), 0);
}

#[tokio::test]
async fn unparseable_body_is_a_bad_request() {
    let harness = HarnessBuilder::default().build();
    let app = router(&harness);

    for body in ["{not json", r#"{"userPrompt": 42}"#] {
        let response = app
            .clone()
            .oneshot(render_request(Body::from(body)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid request body.");
    }
}

#[tokio::test]
async fn caption_failure_is_a_server_error_without_upstream_detail() {
    let harness = HarnessBuilder::default()
        .captions(StubCaptions::failing(CaptionError::unavailable(
            "caption service answered 403: API key leaked-key is invalid",
        )))
        .build();

    let response = router(&harness)
        .oneshot(render_request(Body::from(
            json!({ "userPrompt": "sunset" }).to_string(),
        )))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Caption generation failed");
    assert!(!body.to_string().contains("leaked-key"));
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn render_failure_reports_the_stderr_excerpt() {
    let harness = HarnessBuilder::default()
        .engine(StubEngine::new(EngineBehavior::Fail {
            code: 1,
            stderr: "Error: Could not find composition with ID CaptionedVideo".to_string(),
        }))
        .build();

    let response = router(&harness)
        .oneshot(render_request(Body::from(
            json!({ "userPrompt": "sunset" }).to_string(),
        )))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Remotion render failed");
    assert!(
        body["details"]
            .as_str()
            .expect("details")
            .contains("Could not find composition")
    );
    assert_eq!(harness.video_files(), 0);
}

#[tokio::test]
async fn unknown_and_escaping_video_names_are_not_found() {
    let harness = HarnessBuilder::default().build();
    std::fs::write(harness.dir.path().join("secret.mp4"), b"outside").expect("write");
    std::fs::write(harness.videos_dir().join("notes.txt"), b"text").expect("write");
    let app = router(&harness);

    for uri in [
        "/videos/missing.mp4",
        "/videos/..%2Fsecret.mp4",
        "/videos/%2E%2E%2Fsecret.mp4",
        "/videos/notes.txt",
    ] {
        let response = app.clone().oneshot(get(uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {uri}");
    }
}

#[tokio::test]
async fn concurrent_requests_get_distinct_outputs() {
    let harness = HarnessBuilder::default()
        .engine(StubEngine::with_delay(
            EngineBehavior::Succeed,
            std::time::Duration::from_millis(30),
        ))
        .build();
    let app = router(&harness);

    let (first, second) = tokio::join!(
        app.clone().oneshot(render_request(Body::from(
            json!({ "userPrompt": "a dog surfing" }).to_string(),
        ))),
        app.clone().oneshot(render_request(Body::from(
            json!({ "userPrompt": "a cat skiing" }).to_string(),
        ))),
    );

    let first = json_body(first.expect("first")).await;
    let second = json_body(second.expect("second")).await;
    assert_ne!(first["outputPath"], second["outputPath"]);
    assert_eq!(harness.video_files(), 2);
}

#[tokio::test]
async fn cors_preflight_and_headers() {
    let harness = HarnessBuilder::default().build();
    let app = router(&harness);

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/render-video")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(preflight).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("allow origin"),
        "*"
    );
    assert_eq!(harness.captions.calls(), 0);

    let response = app
        .oneshot(render_request(Body::from("{}")))
        .await
        .expect("response");
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("allow origin"),
        "*"
    );
}

#[tokio::test]
async fn health_check_answers_no_content() {
    let harness = HarnessBuilder::default().build();

    let response = router(&harness)
        .oneshot(get("/_health"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
