//! Rate limiting middleware.

use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tracing::warn;

use super::identity::IdentitySource;
use crate::ratelimit::{Decision, RateLimiter};

/// Body message returned with every rejected request.
pub const RATE_LIMIT_EXCEEDED: &str = "Rate limit exceeded. Please try again later.";

/// State shared by the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    identity_source: IdentitySource,
}

impl RateLimitState {
    /// Create middleware state from a shared limiter and identity policy.
    pub fn new(limiter: Arc<RateLimiter>, identity_source: IdentitySource) -> Self {
        Self {
            limiter,
            identity_source,
        }
    }

    /// Get the shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// Admit or reject a request before it reaches the rest of the handler chain.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = state.identity_source.identify(&request);

    match state.limiter.evaluate(&identity) {
        Decision::Allow => next.run(request).await,
        Decision::Deny { retry_after } => {
            warn!(
                identity = %identity,
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            too_many_requests(retry_after)
        }
    }
}

/// Wrap every route of `router` with the rate limiting middleware.
pub fn with_rate_limit<S>(router: Router<S>, state: RateLimitState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(state, rate_limit))
}

fn too_many_requests(retry_after: Duration) -> Response {
    // Whole seconds, rounded up
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.max(1).to_string())],
        Json(json!({ "error": RATE_LIMIT_EXCEEDED })),
    )
        .into_response()
}
