//! Per-client fixed window state.

use std::time::Duration;
use tokio::time::Instant;

/// Request accounting for a single client identity.
///
/// A window is a hard reset counter: once `window` has elapsed since
/// `window_start`, the next request starts a fresh window with a zero count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClientWindow {
    /// Requests accepted in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
}

impl ClientWindow {
    /// Create an empty window starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Start a new window if the current one has expired.
    ///
    /// Returns `true` if the window rolled over.
    pub fn roll_over(&mut self, now: Instant, window: Duration) -> bool {
        if now.saturating_duration_since(self.window_start) > window {
            self.count = 0;
            self.window_start = now;
            true
        } else {
            false
        }
    }

    /// Count one request if the window still has room under `limit`.
    ///
    /// A rejected request leaves the window untouched.
    pub fn try_admit(&mut self, limit: u64) -> bool {
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Get the number of accepted requests in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Time left until the window rolls over.
    pub fn duration_until_reset(&self, now: Instant, window: Duration) -> Duration {
        let elapsed = now.saturating_duration_since(self.window_start);
        window.saturating_sub(elapsed)
    }

    /// Whether no window has started for longer than `grace`.
    pub fn is_idle(&self, now: Instant, grace: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > grace
    }
}
