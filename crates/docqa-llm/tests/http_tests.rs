use std::time::Duration;

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docqa_core::config::LlmServiceConfig;
use docqa_core::error::Error;
use docqa_core::traits::LanguageModel;
use docqa_llm::ChatClient;

fn config(base_url: &str, timeout_secs: u64) -> LlmServiceConfig {
    LlmServiceConfig {
        base_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        timeout_secs,
    }
}

#[tokio::test]
async fn parses_completion_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "max_tokens": 128
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Paris. [Source 1]"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&config(&server.uri(), 5), "test-model", 0.0).expect("client");
    let out = client.complete("What is the capital of France?", 128).await.expect("complete");
    assert_eq!(out, "Paris. [Source 1]");
}

#[tokio::test]
async fn server_error_is_generation_failed_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&config(&server.uri(), 5), "test-model", 0.0).expect("client");
    let err = client.complete("prompt", 128).await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn timeout_is_generation_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "late"}}]
                }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = ChatClient::new(&config(&server.uri(), 1), "test-model", 0.0).expect("client");
    let err = client.complete("prompt", 128).await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn empty_choices_is_generation_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&server)
        .await;

    let client = ChatClient::new(&config(&server.uri(), 5), "test-model", 0.0).expect("client");
    let err = client.complete("prompt", 128).await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailed(_)), "got {err:?}");
}
