use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentdex_core::config::ProviderSettings;
use agentdex_core::error::Error;
use agentdex_core::traits::{Embedder, TextGenerator};
use agentdex_providers::GeminiClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serves `replies` in order (the last one repeats) and counts requests.
async fn scripted_server(replies: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
    delayed_server(replies.into_iter().map(|(status, body)| (Duration::ZERO, status, body)).collect()).await
}

/// Like `scripted_server`, but each reply waits for its delay before it is sent.
async fn delayed_server(replies: Vec<(Duration, u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let (delay, status, body) = replies[n.min(replies.len() - 1)];
            tokio::spawn(async move {
                read_request(&mut socket).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (format!("http://{addr}"), hits)
}

async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else { return };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= split + 4 + length {
                return;
            }
        }
    }
}

fn settings(base_url: String) -> ProviderSettings {
    ProviderSettings {
        base_url,
        api_key: Some("test-key".into()),
        timeout_secs: 5,
        max_retries: 2,
        backoff_ms: 1,
        ..ProviderSettings::default()
    }
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let ok = r#"{"candidates": [{"content": {"parts": [{"text": "hello"}]}}]}"#;
    let (url, hits) = scripted_server(vec![(503, "{}"), (429, "{}"), (200, ok)]).await;
    let client = GeminiClient::new(&settings(url)).expect("client");
    assert_eq!(client.generate("hi", None).await.expect("generate"), "hello");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let (url, hits) = scripted_server(vec![(500, "{}")]).await;
    let client = GeminiClient::new(&settings(url)).expect("client");
    assert!(matches!(client.embed("x").await, Err(Error::Provider(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let (url, hits) = scripted_server(vec![(400, r#"{"error": "bad"}"#)]).await;
    let client = GeminiClient::new(&settings(url)).expect("client");
    assert!(matches!(client.generate("hi", None).await, Err(Error::Provider(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn undecodable_body_is_a_parse_error() {
    let (url, _) = scripted_server(vec![(200, "not json")]).await;
    let client = GeminiClient::new(&settings(url)).expect("client");
    assert!(matches!(client.embed("x").await, Err(Error::Parse(_))));
}

#[tokio::test]
async fn embedding_round_trip_over_http() {
    let (url, _) = scripted_server(vec![(200, r#"{"embedding": {"values": [0.1, 0.2, 0.3]}}"#)]).await;
    let client = GeminiClient::new(&settings(url)).expect("client");
    assert_eq!(client.embedder_id(), "gemini:embedding-001");
    assert_eq!(client.embed("x").await.expect("embed").len(), 3);
}

#[tokio::test]
async fn slow_attempt_is_retried_within_call_budget() {
    let ok = r#"{"embedding": {"values": [1.0, 2.0]}}"#;
    let (url, hits) = delayed_server(vec![(Duration::from_secs(3), 200, ok), (Duration::ZERO, 200, ok)]).await;
    let settings = ProviderSettings { timeout_secs: 1, backoff_ms: 10, ..settings(url) };
    let client = GeminiClient::new(&settings).expect("client");
    let vector = tokio::time::timeout(settings.call_budget(), client.embed("leads"))
        .await
        .expect("call finished inside its budget")
        .expect("embed");
    assert_eq!(vector, vec![1.0, 2.0]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
