//! Human pacing: bounded random waits, typing cadence and scroll distances.
//!
//! Every browser action the driver performs goes through one of these
//! ranges. The waits exist to look like a person reading a feed and are
//! never skipped or shortened by the driver.

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request delay configuration (inclusive millisecond range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDelay {
    /// Minimum delay in milliseconds
    pub min_ms: u64,
    /// Maximum delay in milliseconds
    pub max_ms: u64,
}

impl RequestDelay {
    /// Build a range; a reversed pair is swapped rather than rejected.
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms > max_ms {
            (max_ms, min_ms)
        } else {
            (min_ms, max_ms)
        };
        Self { min_ms, max_ms }
    }

    /// Get random delay within configured range with jitter
    pub fn random_delay(&self) -> u64 {
        let mut rng = rand::rng();
        let base_delay = rng.random_range(self.min_ms..=self.max_ms);

        // ±20% jitter, clamped back into the configured range
        let jitter_range = (base_delay as f64 * 0.2) as i64;
        let jitter = rng.random_range(-jitter_range..=jitter_range);

        (base_delay as i64 + jitter).clamp(self.min_ms as i64, self.max_ms as i64) as u64
    }

    pub fn random_duration(&self) -> Duration {
        Duration::from_millis(self.random_delay())
    }

    /// Sleep for a random delay in range. Not cancellable once started.
    pub async fn wait(&self, what: &str) {
        let ms = self.random_delay();
        if ms > 0 {
            debug!("pacing: {}: waiting {}ms", what, ms);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Between result pages: 2s-6s
    pub fn between_pages() -> Self {
        Self::new(2000, 6000)
    }

    /// After a click or filter change: 500ms-1500ms
    pub fn between_actions() -> Self {
        Self::new(500, 1500)
    }

    /// Per typed character: 80ms-200ms
    pub fn typing() -> Self {
        Self::new(80, 200)
    }

    /// Mouse hover before a click: 200ms-600ms
    pub fn hover() -> Self {
        Self::new(200, 600)
    }

    pub fn zero() -> Self {
        Self::new(0, 0)
    }
}

/// Scroll distance as a fraction of the viewport height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollRange {
    pub min_fraction: f64,
    pub max_fraction: f64,
}

impl ScrollRange {
    /// Fractions are clamped to `0.05..=2.0` and reordered if reversed.
    pub fn new(min_fraction: f64, max_fraction: f64) -> Self {
        let lo = min_fraction.clamp(0.05, 2.0);
        let hi = max_fraction.clamp(0.05, 2.0);
        if lo > hi {
            Self {
                min_fraction: hi,
                max_fraction: lo,
            }
        } else {
            Self {
                min_fraction: lo,
                max_fraction: hi,
            }
        }
    }

    pub fn random_fraction(&self) -> f64 {
        if self.max_fraction <= self.min_fraction {
            return self.min_fraction;
        }
        let mut rng = rand::rng();
        rng.random_range(self.min_fraction..=self.max_fraction)
    }
}

impl Default for ScrollRange {
    fn default() -> Self {
        Self::new(0.7, 0.9)
    }
}

/// All pacing knobs used by the browser driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub page_delay: RequestDelay,
    pub action_delay: RequestDelay,
    pub typing_delay: RequestDelay,
    pub hover_delay: RequestDelay,
    pub scroll: ScrollRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_delay: RequestDelay::between_pages(),
            action_delay: RequestDelay::between_actions(),
            typing_delay: RequestDelay::typing(),
            hover_delay: RequestDelay::hover(),
            scroll: ScrollRange::default(),
        }
    }
}

/// Pacing section of `lead-scout.json`; each range is `[min, max]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingFileConfig {
    pub page_delay_ms: Option<[u64; 2]>,
    pub action_delay_ms: Option<[u64; 2]>,
    pub typing_delay_ms: Option<[u64; 2]>,
    pub hover_delay_ms: Option<[u64; 2]>,
    pub scroll_fraction: Option<[f64; 2]>,
}

impl PacingFileConfig {
    pub fn resolve(&self) -> Pacing {
        let d = Pacing::default();
        let range = |v: Option<[u64; 2]>, fallback: RequestDelay| {
            v.map(|[a, b]| RequestDelay::new(a, b)).unwrap_or(fallback)
        };
        Pacing {
            page_delay: range(self.page_delay_ms, d.page_delay),
            action_delay: range(self.action_delay_ms, d.action_delay),
            typing_delay: range(self.typing_delay_ms, d.typing_delay),
            hover_delay: range(self.hover_delay_ms, d.hover_delay),
            scroll: self
                .scroll_fraction
                .map(|[a, b]| ScrollRange::new(a, b))
                .unwrap_or(d.scroll),
        }
    }
}
