use std::time::Duration;

use rand::Rng;

use crate::config::{DelayRange, PacingConfig};

/// Sleeps for randomized intervals between items and between pages.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub async fn between_items(&self) {
        pause(self.config.between_items).await;
    }

    pub async fn between_pages(&self) {
        pause(self.config.between_pages).await;
    }
}

async fn pause(range: DelayRange) {
    if range.is_zero() {
        return;
    }
    tokio::time::sleep(pick_delay(range)).await;
}

pub(crate) fn pick_delay(range: DelayRange) -> Duration {
    if range.max <= range.min {
        return range.min;
    }
    let min = range.min.as_millis() as u64;
    let max = range.max.as_millis() as u64;
    Duration::from_millis(rand::rng().random_range(min..=max))
}

/// Uniform random duration in `[0, max]`.
pub(crate) fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    pick_delay(DelayRange {
        min: Duration::ZERO,
        max,
    })
}
