//! Idle shedding
//!
//! Every watchdog tick an inactive worker draws a number in `0..=range`; on
//! the sentinel it is retired. The expected idle lifetime is therefore about
//! `range + 1` ticks, and workers idle at the same time are not retired in
//! lockstep.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::worker::Worker;

/// Draw that retires an idle worker
const SENTINEL: u32 = 0;

/// Randomized retirement policy for idle workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShedPolicy {
    /// Time between checks
    pub interval: Duration,
    /// Upper bound (inclusive) of the draw
    pub range: u32,
}

impl ShedPolicy {
    /// Check every `interval`, retiring an idle worker one draw in `range + 1`
    #[must_use]
    pub const fn new(interval: Duration, range: u32) -> Self {
        Self { interval, range }
    }

    /// One draw: `true` means retire now
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_range(0..=self.range) == SENTINEL
    }
}

/// Watch `worker` until it closes, the fleet stops, or it is shed
///
/// Returns `true` if the worker was retired for inactivity.
pub async fn watch_idle(
    worker: Arc<Worker>,
    policy: ShedPolicy,
    running: impl Fn() -> bool + Send,
) -> bool {
    while !worker.is_closed() && running() {
        if !worker.check_is_active() {
            let retire = policy.roll(&mut rand::thread_rng());
            if retire {
                tracing::info!(worker = %worker.id(), "shutting down worker for inactivity");
                worker.close().await;
                return true;
            }
        }

        tokio::time::sleep(policy.interval).await;
    }

    false
}
