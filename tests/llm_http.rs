//! OpenAI-compatible client against a throwaway local HTTP server.

mod common;

use pdf_ocr_pipeline::{LlmClient, LlmConfig, Pipeline, PipelineConfig, PipelineError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ── Mock server ──────────────────────────────────────────────────────────────

/// Accept one connection, answer it with `status` / `body`, and hand back the
/// raw request text.
async fn serve_once(status: &'static str, body: String) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });
    (addr, handle)
}

/// Accept one connection and never answer.
async fn serve_silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _request = read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    addr
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn completion(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

fn config_for(addr: SocketAddr, timeout_secs: u64) -> LlmConfig {
    common::init_logging();
    LlmConfig::builder()
        .base_url(format!("http://{addr}/v1"))
        .api_key("sk-test-123")
        .model("gpt-4o-mini")
        .timeout_secs(timeout_secs)
        .build()
        .unwrap()
}

async fn send(config: &LlmConfig) -> Result<String, PipelineError> {
    LlmClient::from_config(config)
        .unwrap()
        .send("system", "user text", &config.model, config.timeout())
        .await
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn success_returns_message_content() {
    let (addr, server) = serve_once("200 OK", completion("hello there")).await;
    let config = config_for(addr, 10);

    let reply = send(&config).await.unwrap();
    assert_eq!(reply, "hello there");

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(request.starts_with("POST /v1/chat/completions "), "{request}");
    assert!(lower.contains("authorization: bearer sk-test-123"), "{request}");
    assert!(request.contains(r#""model":"gpt-4o-mini""#), "{request}");
    assert!(request.contains(r#""role":"system""#));
    assert!(request.contains("user text"));
    assert!(!request.contains("response_format"));
}

#[tokio::test]
async fn json_mode_requests_a_json_object() {
    let (addr, server) = serve_once("200 OK", completion(r#"{"ok":true}"#)).await;
    let config = config_for(addr, 10);

    let reply = LlmClient::from_config(&config)
        .unwrap()
        .send_json("system", "user", &config.model, config.timeout())
        .await
        .unwrap();
    assert_eq!(reply, r#"{"ok":true}"#);

    let request = server.await.unwrap();
    assert!(
        request.contains(r#""response_format":{"type":"json_object"}"#),
        "{request}"
    );
}

#[tokio::test]
async fn missing_content_is_a_schema_failure() {
    let body = serde_json::json!({"choices": [{"message": {"role": "assistant"}}]}).to_string();
    let (addr, _server) = serve_once("200 OK", body).await;

    let err = send(&config_for(addr, 10)).await.unwrap_err();
    assert!(matches!(err, PipelineError::LlmSchemaFailure { .. }), "{err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn non_json_body_is_a_schema_failure() {
    let (addr, _server) = serve_once("200 OK", "<html>gateway</html>".to_string()).await;

    let err = send(&config_for(addr, 10)).await.unwrap_err();
    assert!(matches!(err, PipelineError::LlmSchemaFailure { .. }), "{err:?}");
}

#[tokio::test]
async fn unauthorized_is_a_transport_failure_with_status() {
    let body = r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string();
    let (addr, _server) = serve_once("401 Unauthorized", body).await;

    let err = send(&config_for(addr, 10)).await.unwrap_err();
    match &err {
        PipelineError::LlmTransportFailure { status, detail } => {
            assert_eq!(*status, Some(401));
            assert!(detail.contains("authentication"), "{detail}");
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_error_keeps_status() {
    let (addr, _server) = serve_once("503 Service Unavailable", "{}".to_string()).await;

    let err = send(&config_for(addr, 10)).await.unwrap_err();
    assert!(
        matches!(err, PipelineError::LlmTransportFailure { status: Some(503), .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn silent_server_times_out() {
    let addr = serve_silent().await;

    let err = send(&config_for(addr, 1)).await.unwrap_err();
    match err {
        PipelineError::LlmTransportFailure { status, detail } => {
            assert_eq!(status, None);
            assert!(detail.contains("timed out"), "{detail}");
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = send(&config_for(addr, 5)).await.unwrap_err();
    assert!(
        matches!(err, PipelineError::LlmTransportFailure { status: None, .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn pipeline_segments_over_http() {
    let reply = "<json>{\"documents\":[{\"title\":\"Deed\",\"pages\":[1,2],\"summary\":\"Warranty deed\",\"recording_reference\":null}],\"total_pages\":2}</json>";
    let (addr, server) = serve_once("200 OK", completion(reply)).await;
    let llm = config_for(addr, 10);
    let client = LlmClient::from_config(&llm).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::new(Default::default(), llm)).with_llm(client);

    let text = "<page number 1>\nWARRANTY DEED\n</page number 1>\n<page number 2>\nwitness\n</page number 2>";
    let result = pipeline.segment(text).await.unwrap();
    assert_eq!(result.total_pages, 2);
    assert_eq!(result.documents[0].title.as_deref(), Some("Deed"));

    let request = server.await.unwrap();
    assert!(request.contains("WARRANTY DEED"));
}
