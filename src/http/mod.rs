//! HTTP surface: rate limiting middleware and the API server.

mod identity;
mod middleware;
mod server;

pub use identity::IdentitySource;
pub use middleware::{rate_limit, with_rate_limit, RateLimitState, RATE_LIMIT_EXCEEDED};
pub use server::HttpServer;
