//! Configuration for a resolver instance.

use std::time::Duration;

/// How a resolver instance should populate its initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Start empty; nothing is loaded from the `Store`.
    Fresh,
    /// Start by replaying the `Store`'s persisted mappings for this workflow.
    Restart,
}

/// Tunables for the `HashingService` driver and the resolver's start mode.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Base delay before retrying a lookup after `Backpressure`.
    pub backpressure_base: Duration,
    /// Jitter factor in `[0, 1]` applied to `backpressure_base`.
    pub backpressure_jitter_factor: f64,
    /// Per-send deadline enforced by the driver.
    pub request_timeout: Duration,
    /// Whether this instance starts fresh or replays persisted state.
    pub start_mode: StartMode,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            backpressure_base: Duration::from_secs(10),
            backpressure_jitter_factor: 0.5,
            request_timeout: Duration::from_secs(30),
            start_mode: StartMode::Fresh,
        }
    }
}

impl ResolverConfig {
    /// Convenience constructor for a restart-mode resolver; other fields
    /// keep their defaults.
    pub fn restart() -> Self {
        Self {
            start_mode: StartMode::Restart,
            ..Self::default()
        }
    }
}
