//! HTTP server implementation.

use std::net::SocketAddr;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{with_rate_limit, RateLimitState};
use crate::error::Result;

/// HTTP server hosting the catalog API behind the rate limiter.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Rate limiting applied to every route, if enabled
    rate_limit: Option<RateLimitState>,
}

impl HttpServer {
    /// Create a new HTTP server with rate limiting.
    pub fn new(addr: SocketAddr, rate_limit: RateLimitState) -> Self {
        Self {
            addr,
            rate_limit: Some(rate_limit),
        }
    }

    /// Create a new HTTP server that admits every request.
    pub fn without_rate_limit(addr: SocketAddr) -> Self {
        Self {
            addr,
            rate_limit: None,
        }
    }

    /// Build the router for all routes served by this server.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_handler))
            .nest("/api/v1", api_routes())
            .fallback(not_found_handler);

        match &self.rate_limit {
            Some(state) => with_rate_limit(router, state.clone()),
            None => router,
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            rate_limited = self.rate_limit.is_some(),
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

fn api_routes() -> Router {
    Router::new().route("/", get(api_info_handler))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn api_info_handler() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use axum::{body::Body, extract::ConnectInfo, http::Request};
    use tower::ServiceExt;

    use crate::http::IdentitySource;
    use crate::ratelimit::{LimitConfig, RateLimiter};

    fn addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn get_from(uri: &str, peer: &str) -> Request<Body> {
        let peer: SocketAddr = peer.parse().unwrap();
        Request::builder()
            .uri(uri)
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap()
    }

    fn limited_server(limit: u64) -> HttpServer {
        let limiter = Arc::new(RateLimiter::new(LimitConfig::new(
            limit,
            Duration::from_secs(60),
        )));
        HttpServer::new(addr(), RateLimitState::new(limiter, IdentitySource::PeerAddr))
    }

    #[tokio::test]
    async fn test_health_route() {
        let app = limited_server(10).router();

        let response = app.oneshot(get_from("/health", "10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_api_group_registered() {
        let app = limited_server(10).router();

        let response = app.clone().oneshot(get_from("/api/v1", "10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_from("/api/v1/missing", "10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit_covers_all_routes() {
        let app = limited_server(2).router();

        let response = app.clone().oneshot(get_from("/health", "10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(get_from("/nowhere", "10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get_from("/health", "10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_without_rate_limit_admits_everything() {
        let app = HttpServer::without_rate_limit(addr()).router();

        for _ in 0..20 {
            let response = app.clone().oneshot(get_from("/health", "10.0.0.1:1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
