use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::BackoffPolicy;

/// Non-blocking reconnection schedule.
///
/// Callers ask [`is_due`](ReconnectBackoff::is_due) before attempting and
/// report the outcome; the delay doubles on each failure up to
/// `max_delay_ms`, with up to 25% of random jitter.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            next_attempt: None,
        }
    }

    pub fn is_due(
        &self,
        now: Instant,
    ) -> bool {
        self.next_attempt.map_or(true, |at| now >= at)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_failure(
        &mut self,
        now: Instant,
    ) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay_for(self.failures);
        self.next_attempt = Some(now + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }

    fn delay_for(
        &self,
        failures: u32,
    ) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let base = self.policy.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = base.min(self.policy.max_delay_ms);
        let jitter = if capped >= 4 {
            rand::thread_rng().gen_range(0..=capped / 4)
        } else {
            0
        };
        Duration::from_millis(capped.saturating_sub(jitter))
    }
}
