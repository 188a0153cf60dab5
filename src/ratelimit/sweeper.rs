//! Background eviction of idle clients.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;
use crate::error::Result;

/// Handle to the task that periodically sweeps a [`RateLimiter`].
///
/// The task runs one sweep per cleanup interval until [`Sweeper::shutdown`]
/// is called. Dropping the handle aborts the task.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// The first sweep runs one cleanup interval after spawning. Fails if the
    /// limiter's configuration is invalid, e.g. a zero cleanup interval.
    pub fn spawn(limiter: Arc<RateLimiter>) -> Result<Self> {
        limiter.config().validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(limiter, shutdown_rx));

        Ok(Self {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper task did not exit cleanly");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(limiter: Arc<RateLimiter>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = limiter.config().cleanup_interval;

    // An interval past the clock's range never elapses
    let Some(start) = Instant::now().checked_add(period) else {
        info!("Cleanup interval exceeds clock range, idle clients are never swept");
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
        return;
    };

    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = period.as_millis() as u64, "Idle client sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = limiter.sweep();
                debug!(
                    evicted = evicted,
                    tracked = limiter.tracked_identities(),
                    "Sweep complete"
                );
            }
            changed = shutdown_rx.changed() => {
                // A closed channel means the handle is gone
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Idle client sweeper stopped");
}
