//! Per-client rate limiting and idle client eviction.

mod limiter;
mod sweeper;
mod window;

pub use limiter::{Decision, LimitConfig, RateLimiter};
pub use sweeper::Sweeper;
