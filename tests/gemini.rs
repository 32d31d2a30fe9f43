use std::time::Duration;

use captionreel::{
    application::captions::{CaptionError, CaptionGenerator},
    config::CaptionSettings,
    domain::render::PromptText,
    infra::gemini::GeminiCaptionGenerator,
};
use httpmock::MockServer;

const MODEL_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn settings(server: &MockServer) -> CaptionSettings {
    CaptionSettings {
        api_key: "test-key".to_string(),
        base_url: server.base_url(),
        model: "gemini-test".to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

fn prompt() -> PromptText {
    PromptText::parse("a cat doing a backflip", 500).expect("prompt")
}

#[tokio::test]
async fn returns_the_first_candidate_text() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path(MODEL_PATH)
            .header("x-goog-api-key", "test-key");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Jump!\nFlip!\nLand!"}]},"finishReason":"STOP"}]}"#,
            );
    });

    let generator = GeminiCaptionGenerator::new(&settings(&server)).expect("generator");
    let captions = generator
        .generate_captions(&prompt())
        .await
        .expect("captions");

    mock.assert();
    assert_eq!(captions.text(), "Jump!\nFlip!\nLand!");
}

#[tokio::test]
async fn rejected_credentials_are_upstream_unavailable() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path(MODEL_PATH);
        then.status(403)
            .header("content-type", "application/json")
            .body(r#"{"error":{"code":403,"message":"API key not valid"}}"#);
    });

    let generator = GeminiCaptionGenerator::new(&settings(&server)).expect("generator");
    let err = generator
        .generate_captions(&prompt())
        .await
        .expect_err("upstream failure");

    mock.assert();
    match err {
        CaptionError::UpstreamUnavailable { message } => {
            assert!(message.contains("403"), "message: {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_envelope_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("POST").path(MODEL_PATH);
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
    });

    let generator = GeminiCaptionGenerator::new(&settings(&server)).expect("generator");
    let err = generator
        .generate_captions(&prompt())
        .await
        .expect_err("malformed");

    assert!(matches!(err, CaptionError::MalformedUpstreamResponse { .. }));
}

#[tokio::test]
async fn unreachable_service_is_upstream_unavailable() {
    let settings = CaptionSettings {
        api_key: "test-key".to_string(),
        // Port 9 (discard) on loopback is not expected to accept connections.
        base_url: "http://127.0.0.1:9".to_string(),
        model: "gemini-test".to_string(),
        request_timeout: Duration::from_secs(2),
    };

    let generator = GeminiCaptionGenerator::new(&settings).expect("generator");
    let err = generator
        .generate_captions(&prompt())
        .await
        .expect_err("connection failure");

    assert!(matches!(err, CaptionError::UpstreamUnavailable { .. }));
}
