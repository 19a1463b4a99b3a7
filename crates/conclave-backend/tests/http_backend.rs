//! Integration tests for `HttpBackend` and `ModelRouter` against a mock
//! OpenAI-compatible server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use conclave_backend::*;
use conclave_core::{AgentType, ConclaveError};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str, tokens: u64) -> serde_json::Value {
    serde_json::json!({
        "id": "cmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 12, "completion_tokens": tokens}
    })
}

fn config_for(id: &str, server: &MockServer) -> BackendConfig {
    BackendConfig::new(id, BackendProvider::Vllm, format!("{id}-model")).with_base_url(server.uri())
}

// ---------------------------------------------------------------------------
// Non-streaming invoke sends model, limits and messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invoke_parses_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "clinical-70b-model",
            "max_tokens": 256,
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Likely influenza.", 4)))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config_for("clinical-70b", &server);
    cfg.api_key = "sk-test".into();
    let backend = HttpBackend::new(cfg).unwrap();

    let resp = backend
        .invoke(&InvokeRequest::new("fever, myalgia", 256, 0.2).with_system_prompt("You are a clinician."))
        .await
        .unwrap();
    assert_eq!(resp.content.to_text(), "Likely influenza.");
    assert_eq!(resp.tokens, 4);
}

// ---------------------------------------------------------------------------
// Non-2xx maps to a Backend error carrying the status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_maps_to_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(config_for("billing-8b", &server)).unwrap();
    let err = backend
        .invoke(&InvokeRequest::new("code this", 64, 0.0))
        .await
        .unwrap_err();
    match err {
        ConclaveError::Backend { backend, status, message } => {
            assert_eq!(backend, "billing-8b");
            assert_eq!(status, Some(503));
            assert!(message.contains("overloaded"));
        }
        other => panic!("expected Backend error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Slow server maps to BackendTimeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("late", 1))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut cfg = config_for("general-8b", &server);
    cfg.timeout_ms = 50;
    let backend = HttpBackend::new(cfg).unwrap();
    let err = backend
        .invoke(&InvokeRequest::new("hello", 8, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ConclaveError::BackendTimeout { timeout_ms: 50, .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Streaming responses are collected as fragments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streamed_chunks_become_fragments() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"CPT \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"99213\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let mut cfg = config_for("billing-8b", &server);
    cfg.stream = true;
    let backend = HttpBackend::new(cfg).unwrap();
    let resp = backend
        .invoke(&InvokeRequest::new("visit code", 32, 0.0))
        .await
        .unwrap();

    assert_eq!(resp.content.fragment_count(), 2);
    assert_eq!(resp.content.to_text(), "CPT 99213");
    assert_eq!(resp.tokens, 3);
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_hits_configured_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(config_for("general-8b", &server)).unwrap();
    assert!(backend.health().await);

    let mut cfg = config_for("general-8b", &server);
    cfg.health_path = "/ready".into();
    let backend = HttpBackend::new(cfg).unwrap();
    assert!(!backend.health().await);
}

// ---------------------------------------------------------------------------
// Router falls back from a failing HTTP primary to a healthy HTTP fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn router_falls_back_over_http() {
    let primary_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&primary_server)
        .await;

    let fallback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("fallback answer", 2)))
        .expect(1)
        .mount(&fallback_server)
        .await;

    let primary: Arc<dyn BackendClient> =
        Arc::new(HttpBackend::new(config_for("clinical-70b", &primary_server)).unwrap());
    let fallback: Arc<dyn BackendClient> = Arc::new(LimitedBackend::new(
        Arc::new(HttpBackend::new(config_for("general-8b", &fallback_server)).unwrap()),
        2,
    ));

    let router = ModelRouter::new(
        RouteTable::uniform("clinical-70b", Some("general-8b")),
        vec![primary, fallback],
    )
    .unwrap();

    let inv = router
        .invoke_with_fallback(AgentType::Clinical, &InvokeRequest::new("chest pain", 128, 0.2))
        .await
        .unwrap();
    assert_eq!(inv.model_used, "general-8b");
    assert_eq!(inv.content.to_text(), "fallback answer");
}

// ---------------------------------------------------------------------------
// Multi-byte characters split across network chunks survive decoding
// ---------------------------------------------------------------------------

/// Serve one streamed completion, writing the body as two HTTP chunks
/// split inside a UTF-8 sequence.
async fn serve_split_stream(listener: tokio::net::TcpListener, body: Vec<u8>, split: usize) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (mut socket, _) = listener.accept().await.unwrap();
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if request.len() >= head_end + 4 + length {
                break;
            }
        }
        if n == 0 {
            break;
        }
    }

    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
        )
        .await
        .unwrap();
    for part in [&body[..split], &body[split..]] {
        socket
            .write_all(format!("{:x}\r\n", part.len()).as_bytes())
            .await
            .unwrap();
        socket.write_all(part).await.unwrap();
        socket.write_all(b"\r\n").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    socket.write_all(b"0\r\n\r\n").await.unwrap();
    socket.flush().await.unwrap();
}

#[tokio::test]
async fn streamed_codepoint_split_across_chunks() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"patient f\u{e9}bril\"}}]}\n\n",
        "data: [DONE]\n\n",
    )
    .as_bytes()
    .to_vec();
    let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
    let server = tokio::spawn(serve_split_stream(listener, body, split));

    let mut cfg = BackendConfig::new("clinical-70b", BackendProvider::Vllm, "meditron")
        .with_base_url(format!("http://{addr}"));
    cfg.stream = true;
    let backend = HttpBackend::new(cfg).unwrap();
    let resp = backend
        .invoke(&InvokeRequest::new("temperature?", 32, 0.0))
        .await
        .unwrap();

    assert_eq!(resp.content.to_text(), "patient f\u{e9}bril");
    server.await.unwrap();
}
