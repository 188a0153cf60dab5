//! Core rate limiter implementation.

use std::collections::HashMap;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::window::ClientWindow;
use crate::error::{Result, YuplanError};

/// Default maximum requests per window.
const DEFAULT_LIMIT: u64 = 100;
/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Idle clients are evicted after this many windows without a request.
const CLEANUP_WINDOWS: u32 = 2;

/// Configuration for a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests accepted per identity in one window
    pub limit: u64,
    /// Length of a window
    pub window: Duration,
    /// Interval between idle-eviction sweeps, also the idle grace period
    pub cleanup_interval: Duration,
}

impl LimitConfig {
    /// Create a configuration with the cleanup interval derived from the window.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            // Saturates; `validate` rejects windows this large
            cleanup_interval: window.checked_mul(CLEANUP_WINDOWS).unwrap_or(Duration::MAX),
        }
    }

    /// Override the cleanup interval.
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Check that the configuration describes a usable limiter.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(YuplanError::Config(
                "rate limit must allow at least one request per window".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(YuplanError::Config("rate limit window must be non-zero".to_string()));
        }
        if self.window.checked_mul(CLEANUP_WINDOWS).is_none() {
            return Err(YuplanError::Config(format!(
                "rate limit window of {}s is too large",
                self.window.as_secs()
            )));
        }
        if self.cleanup_interval.is_zero() {
            return Err(YuplanError::Config(
                "rate limit cleanup interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

/// Outcome of evaluating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was counted and may proceed
    Allow,
    /// The quota is exhausted for the current window
    Deny {
        /// Time until the client's window rolls over
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Fixed-window rate limiter keyed by client identity.
///
/// A single lock guards the whole table, so the check and the increment for
/// an identity happen as one step. The limiter is shared behind an `Arc`
/// between request handlers and the [`Sweeper`](super::Sweeper).
pub struct RateLimiter {
    /// Windows indexed by client identity
    windows: Mutex<HashMap<String, ClientWindow>>,
    config: LimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(config: LimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    /// Decide whether a request from `identity` is admitted.
    ///
    /// Admitted requests are counted against the identity's current window.
    pub fn evaluate(&self, identity: &str) -> Decision {
        self.evaluate_at(identity, Instant::now())
    }

    fn evaluate_at(&self, identity: &str, now: Instant) -> Decision {
        let LimitConfig { limit, window, .. } = self.config;

        let (created, rolled_over, admitted, count, retry_after) = {
            let mut windows = self.windows.lock();
            let mut created = false;
            let client = windows.entry(identity.to_string()).or_insert_with(|| {
                created = true;
                ClientWindow::new(now)
            });

            let rolled_over = client.roll_over(now, window);
            let admitted = client.try_admit(limit);
            (
                created,
                rolled_over,
                admitted,
                client.count(),
                client.duration_until_reset(now, window),
            )
        };

        if created {
            debug!(identity = %identity, limit = limit, "Tracking new client");
        } else if rolled_over {
            trace!(identity = %identity, "Client window rolled over");
        }

        if admitted {
            trace!(identity = %identity, count = count, "Request allowed");
            Decision::Allow
        } else {
            trace!(
                identity = %identity,
                retry_after_ms = retry_after.as_millis() as u64,
                "Request denied"
            );
            Decision::Deny { retry_after }
        }
    }

    /// Evict clients whose window started more than one cleanup interval ago.
    ///
    /// Returns the number of evicted clients.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let grace = self.config.cleanup_interval;

        let (evicted, remaining) = {
            let mut windows = self.windows.lock();
            let before = windows.len();
            windows.retain(|_, client| !client.is_idle(now, grace));
            (before - windows.len(), windows.len())
        };

        if evicted > 0 {
            debug!(evicted = evicted, remaining = remaining, "Evicted idle clients");
        }
        evicted
    }

    /// Get the accepted request count for a tracked identity.
    ///
    /// Returns `None` if the identity is not tracked.
    pub fn current_count(&self, identity: &str) -> Option<u64> {
        self.windows.lock().get(identity).map(|c| c.count())
    }

    /// Get the number of tracked identities.
    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimitConfig::default())
    }
}
