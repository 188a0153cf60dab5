//! End-to-end rate limiting over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use yuplan::error::Result;
use yuplan::http::{HttpServer, IdentitySource, RateLimitState, RATE_LIMIT_EXCEEDED};
use yuplan::ratelimit::{LimitConfig, RateLimiter};

struct TestServer {
    addr: SocketAddr,
    limiter: Arc<RateLimiter>,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    async fn start(limit: u64, window: Duration, identity_source: IdentitySource) -> Self {
        let limiter = Arc::new(RateLimiter::new(LimitConfig::new(limit, window)));
        let state = RateLimitState::new(Arc::clone(&limiter), identity_source);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(addr, state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_listener(listener, async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            limiter,
            shutdown_tx,
            handle,
        }
    }

    async fn get(&self, path: &str, forwarded_for: Option<&str>) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();

        let mut request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n", path);
        if let Some(ip) = forwarded_for {
            request.push_str(&format!("X-Forwarded-For: {}\r\n", ip));
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap();
        (status, raw)
    }

    async fn stop(self) {
        self.shutdown_tx.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_peer_address_quota() {
    let server = TestServer::start(3, Duration::from_secs(60), IdentitySource::PeerAddr).await;

    for _ in 0..3 {
        let (status, _) = server.get("/health", None).await;
        assert_eq!(status, 200);
    }

    let (status, raw) = server.get("/health", None).await;
    assert_eq!(status, 429);
    assert!(raw.contains(RATE_LIMIT_EXCEEDED));
    assert!(raw.to_ascii_lowercase().contains("retry-after: 60"));

    // Port is stripped, so every connection shares the loopback identity
    assert_eq!(server.limiter.tracked_identities(), 1);
    assert_eq!(server.limiter.current_count("127.0.0.1"), Some(3));

    server.stop().await;
}

#[tokio::test]
async fn test_forwarded_clients_are_independent() {
    let server = TestServer::start(3, Duration::from_secs(60), IdentitySource::ForwardedFor).await;

    for _ in 0..3 {
        let (status, _) = server.get("/api/v1", Some("192.168.1.1")).await;
        assert_eq!(status, 200);
    }

    let (status, _) = server.get("/api/v1", Some("192.168.1.1")).await;
    assert_eq!(status, 429);

    let (status, _) = server.get("/api/v1", Some("192.168.1.2")).await;
    assert_eq!(status, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_quota_returns_after_window() {
    let server = TestServer::start(2, Duration::from_millis(100), IdentitySource::PeerAddr).await;

    assert_eq!(server.get("/health", None).await.0, 200);
    assert_eq!(server.get("/health", None).await.0, 200);
    assert_eq!(server.get("/health", None).await.0, 429);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(server.get("/health", None).await.0, 200);

    server.stop().await;
}
