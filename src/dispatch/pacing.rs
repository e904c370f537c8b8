//! Randomized post-send delay.
//!
//! Bursts of interactions trigger upstream throttling that shows up as
//! silently dropped commands, so every send is followed by a pause of
//! `min_delay + uniform(0, jitter)`.

use std::time::Duration;

use rand::Rng;
use tracing::trace;

use crate::config::PacingConfig;

#[derive(Debug, Clone)]
pub struct Pacer {
    min_delay: Duration,
    jitter_ms: u64,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            jitter_ms: config.jitter_ms,
        }
    }

    /// Next delay to apply
    pub fn next_delay(&self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.min_delay + Duration::from_millis(jitter)
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        trace!(delay_ms = delay.as_millis() as u64, "Pacing after send");
        tokio::time::sleep(delay).await;
    }
}
