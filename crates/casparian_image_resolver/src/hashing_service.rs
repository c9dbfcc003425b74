//! Driver for the external HashingService contract: backpressure retry,
//! timeout detection, and feeding completions back into the resolver
//! mailbox as `Msg` values.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ids::{HashValue, TagId};
use crate::messages::Msg;

/// Outcome of one attempt to resolve a tag against the external service.
#[derive(Debug, Clone)]
pub enum HashingOutcome {
    Ok(HashValue),
    Err(String),
    /// The service is saturated; retry later.
    Backpressure,
}

/// Asynchronous external lookup: the registry client this crate drives
/// but does not implement.
#[async_trait]
pub trait HashingService: Send + Sync {
    async fn lookup(&self, tag: &TagId) -> HashingOutcome;
}

/// Owns the contract with the `HashingService` for one resolver instance.
///
/// Treated as private per resolver instance (per the concurrency model):
/// even though the underlying `Arc<dyn HashingService>` can be shared,
/// only the resolver task that owns this `Driver` ever calls `issue`.
pub(crate) struct Driver {
    service: Arc<dyn HashingService>,
    backpressure_base: Duration,
    backpressure_jitter_factor: f64,
    request_timeout: Duration,
    mailbox: mpsc::UnboundedSender<Msg>,
}

impl Driver {
    pub fn new(
        service: Arc<dyn HashingService>,
        backpressure_base: Duration,
        backpressure_jitter_factor: f64,
        request_timeout: Duration,
        mailbox: mpsc::UnboundedSender<Msg>,
    ) -> Self {
        Self {
            service,
            backpressure_base,
            backpressure_jitter_factor,
            request_timeout,
            mailbox,
        }
    }

    /// Issue the single outstanding lookup for `tag`. Retries on
    /// `Backpressure` live inside this one spawned task, so at most one
    /// attempt per tag is ever in flight from the resolver's perspective.
    pub fn issue(&self, tag: TagId) {
        let service = self.service.clone();
        let mailbox = self.mailbox.clone();
        let base = self.backpressure_base;
        let factor = self.backpressure_jitter_factor;
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(timeout, service.lookup(&tag)).await {
                    Ok(HashingOutcome::Ok(hash)) => {
                        debug!(tag = %tag, "hashing service resolved tag");
                        let _ = mailbox.send(Msg::HashOk { tag, hash });
                        return;
                    }
                    Ok(HashingOutcome::Err(reason)) => {
                        debug!(tag = %tag, %reason, "hashing service rejected tag");
                        let _ = mailbox.send(Msg::HashErr { tag, reason });
                        return;
                    }
                    Ok(HashingOutcome::Backpressure) => {
                        let delay = jittered_delay(base, factor);
                        debug!(tag = %tag, delay_ms = delay.as_millis() as u64, "hashing service backpressure, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(_elapsed) => {
                        warn!(tag = %tag, "hashing service request timed out");
                        let _ = mailbox.send(Msg::LookupTimeout);
                        return;
                    }
                }
            }
        });
    }
}

/// Draw a retry delay from `[base*(1-f), base*(1+f)]`.
fn jittered_delay(base: Duration, factor: f64) -> Duration {
    let factor = factor.clamp(0.0, 1.0);
    let base_secs = base.as_secs_f64();
    let low = base_secs * (1.0 - factor);
    let high = base_secs * (1.0 + factor);
    let secs = if high > low {
        rand::thread_rng().gen_range(low..=high)
    } else {
        low
    };
    Duration::from_secs_f64(secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_secs(10);
        for _ in 0..200 {
            let delay = jittered_delay(base, 0.5);
            assert!(delay >= Duration::from_secs_f64(5.0));
            assert!(delay <= Duration::from_secs_f64(15.0));
        }
    }

    #[test]
    fn zero_factor_is_deterministic() {
        let base = Duration::from_secs(10);
        let delay = jittered_delay(base, 0.0);
        assert_eq!(delay, base);
    }
}
