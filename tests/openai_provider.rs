use std::{sync::Arc, time::Duration};

use pictory::{
    GenerationFailure, ImageAsset,
    capabilities::encode,
    config::OpenAiConfig,
    providers::{GenerationModel, GenerationRequest, OpenAiChatModel, RetryPolicy, RetryingModel},
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "sk-test".to_string(),
        base_url: format!("{}/v1", server.uri()),
        vision_model: "vision-model".to_string(),
        text_model: "text-model".to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    })
}

fn instant_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        backoff_multiplier: 2.0,
    }
}

#[tokio::test]
async fn caption_request_sends_inline_image_and_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "vision-model",
            "max_tokens": 200,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "Describe this image." },
                    { "type": "image_url", "image_url": { "url": "data:image/jpeg;base64,/9j/" } }
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("A boy plays in a park at sunset.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = OpenAiChatModel::from_config(&config, &config.vision_model).unwrap();
    let asset = ImageAsset::new("1.jpg", vec![0xFF, 0xD8, 0xFF], "image/jpeg");
    let request = GenerationRequest::new("Describe this image.", 200).with_image(encode(&asset).unwrap());

    let text = model.generate(&request).await.unwrap();
    assert_eq!(text, "A boy plays in a park at sunset.");
}

#[tokio::test]
async fn text_request_carries_system_role() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "text-model",
            "messages": [
                { "role": "system", "content": "You are an expert story planner." },
                { "role": "user", "content": "Plan a story." }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("1. Beginning")))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = OpenAiChatModel::from_config(&config, &config.text_model).unwrap();
    let request = GenerationRequest::new("Plan a story.", 600).with_system("You are an expert story planner.");

    assert_eq!(model.generate(&request).await.unwrap(), "1. Beginning");
}

#[tokio::test]
async fn invalid_key_is_an_authentication_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = OpenAiChatModel::from_config(&config, "text-model").unwrap();

    let err = model.generate(&GenerationRequest::new("hi", 10)).await.unwrap_err();
    assert_eq!(
        err,
        GenerationFailure::Authentication {
            status: 401,
            body: "Incorrect API key provided".to_string(),
        }
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn exhausted_quota_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "message": "You exceeded your current quota",
                "type": "insufficient_quota",
                "code": "insufficient_quota"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = RetryingModel::new(
        Arc::new(OpenAiChatModel::from_config(&config, "text-model").unwrap()),
        instant_retries(3),
    );

    let err = model.generate(&GenerationRequest::new("hi", 10)).await.unwrap_err();
    assert!(matches!(err, GenerationFailure::Quota(_)));
}

#[tokio::test]
async fn server_error_is_retried_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream hiccup"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Once upon a time.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = RetryingModel::new(
        Arc::new(OpenAiChatModel::from_config(&config, "text-model").unwrap()),
        instant_retries(2),
    );

    let text = model.generate(&GenerationRequest::new("write", 1600)).await.unwrap();
    assert_eq!(text, "Once upon a time.");
}

#[tokio::test]
async fn blank_completion_is_an_empty_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  \n ")))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = OpenAiChatModel::from_config(&config, "text-model").unwrap();

    let err = model.generate(&GenerationRequest::new("write", 10)).await.unwrap_err();
    assert_eq!(err, GenerationFailure::EmptyResponse);
}

#[tokio::test]
async fn non_json_success_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let model = OpenAiChatModel::from_config(&config, "text-model").unwrap();

    let err = model.generate(&GenerationRequest::new("write", 10)).await.unwrap_err();
    assert!(matches!(err, GenerationFailure::Malformed(_)));
}
