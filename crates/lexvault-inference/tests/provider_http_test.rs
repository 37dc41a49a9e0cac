//! HTTP contract tests for the OpenAI and Gemini providers against a mock
//! server.

use lexvault_core::{AiProvider, Error};
use lexvault_inference::{GeminiConfig, GeminiProvider, OpenAiConfig, OpenAiProvider};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(
        OpenAiConfig::default()
            .with_base_url(server.uri())
            .with_api_key("test-key"),
    )
    .expect("Failed to create provider")
}

fn gemini(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new(
        GeminiConfig::default()
            .with_base_url(server.uri())
            .with_api_key("gem-key"),
    )
    .expect("Failed to create provider")
}

#[tokio::test]
async fn test_openai_embedding_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "text-embedding-3-small",
            "input": "indemnification clause"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{ "embedding": [0.25, -0.5, 1.0], "index": 0 }],
            "model": "text-embedding-3-small",
            "usage": { "prompt_tokens": 2, "total_tokens": 2 }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let vector = openai(&mock_server)
        .generate_embedding("indemnification clause")
        .await
        .unwrap();
    assert_eq!(vector.to_vec(), vec![0.25f32, -0.5, 1.0]);
}

#[tokio::test]
async fn test_openai_chat_includes_context() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "The lease ends in 2027." },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = openai(&mock_server);
    let answer = provider
        .generate_response(
            "When does the lease end?",
            &["Term: through December 2027".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(answer, "The lease ends in 2027.");

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("Term: through December 2027"));
    assert_eq!(body["messages"][1]["content"], "When does the lease end?");
}

#[tokio::test]
async fn test_openai_error_surfaces_api_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Invalid API key", "type": "invalid_request_error" }
        })))
        .mount(&mock_server)
        .await;

    let err = openai(&mock_server)
        .generate_embedding("x")
        .await
        .unwrap_err();
    match err {
        Error::Embedding(msg) => {
            assert!(msg.contains("401"));
            assert!(msg.contains("Invalid API key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_gemini_embed_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:embedContent"))
        .and(header("x-goog-api-key", "gem-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "models/text-embedding-004",
            "content": { "parts": [{ "text": "witness statement" }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embedding": { "values": [0.1, 0.2] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let vector = gemini(&mock_server)
        .generate_embedding("witness statement")
        .await
        .unwrap();
    assert_eq!(vector.to_vec(), vec![0.1f32, 0.2]);
}

#[tokio::test]
async fn test_gemini_generate_content_joins_parts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Yes, " }, { "text": "it was signed." }] }
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let answer = gemini(&mock_server)
        .generate_response("Was it signed?", &["Signed 3 May".to_string()])
        .await
        .unwrap();
    assert_eq!(answer, "Yes, it was signed.");

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Signed 3 May"));
    assert_eq!(body["contents"][0]["role"], "user");
}

#[tokio::test]
async fn test_gemini_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let err = gemini(&mock_server)
        .generate_response("q", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(ref m) if m.contains("503")));
}
