//! `AuthEndpointSession` against a minimal in-process HTTP responder.

use coach_link::{AuthEndpointSession, SessionProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Responder {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    hits: Arc<AtomicUsize>,
}

/// Answers every request with `status` and `body`, recording the raw request head.
async fn responder(status: u16, body: &'static str) -> Responder {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let hits = Arc::new(AtomicUsize::new(0));

    let log = requests.clone();
    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            log.lock().unwrap().push(String::from_utf8_lossy(&buf[..n]).to_string());
            counter.fetch_add(1, Ordering::SeqCst);

            let response = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    Responder {
        base_url,
        requests,
        hits,
    }
}

#[tokio::test]
async fn test_valid_token_yields_session() {
    let server = responder(200, r#"{"id":"user-42","email":"mentee@example.com"}"#).await;
    let provider = AuthEndpointSession::new(&server.base_url, "anon-key", Some("good-token".into())).unwrap();

    let session = provider.get_session().await.unwrap();
    assert_eq!(session.user(), Some("user-42"));
    assert_eq!(session.access_token.as_deref(), Some("good-token"));

    let request = server.requests.lock().unwrap()[0].to_lowercase();
    assert!(request.starts_with("get /auth/v1/user "));
    assert!(request.contains("apikey: anon-key"));
    assert!(request.contains("authorization: bearer good-token"));
}

#[tokio::test]
async fn test_rejected_token_is_signed_out() {
    let server = responder(401, r#"{"message":"invalid JWT"}"#).await;
    let provider = AuthEndpointSession::new(&server.base_url, "anon-key", Some("expired".into())).unwrap();

    let session = provider.get_session().await.unwrap();
    assert!(!session.valid);
    assert_eq!(session.user(), None);
}

#[tokio::test]
async fn test_server_error_is_an_error() {
    let server = responder(503, r#"{}"#).await;
    let provider = AuthEndpointSession::new(&server.base_url, "anon-key", Some("tok".into())).unwrap();

    assert!(provider.get_session().await.is_err());
}

#[tokio::test]
async fn test_result_is_cached_for_ttl() {
    let server = responder(200, r#"{"id":"user-1"}"#).await;
    let provider = AuthEndpointSession::new(&server.base_url, "anon-key", Some("tok".into()))
        .unwrap()
        .with_ttl(Duration::from_secs(60));

    provider.get_session().await.unwrap();
    provider.get_session().await.unwrap();
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);

    let uncached = AuthEndpointSession::new(&server.base_url, "anon-key", Some("tok".into()))
        .unwrap()
        .with_ttl(Duration::ZERO);
    uncached.get_session().await.unwrap();
    uncached.get_session().await.unwrap();
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}
