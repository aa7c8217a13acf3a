use std::time::Duration;

use tokio::time::Instant;

/// Deadlines of the two periodic jobs of the dispatch loop: the handlers'
/// `on_timer` tick and the slower external callback.
#[derive(Debug, Clone)]
pub(crate) struct DispatchTimer {
    tick_interval: Duration,
    external_interval: Duration,
    tick_deadline: Instant,
    external_deadline: Instant,
}

impl DispatchTimer {
    pub(crate) fn new(
        tick_interval: Duration,
        external_interval: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            tick_interval,
            external_interval,
            tick_deadline: now + tick_interval,
            external_deadline: now + external_interval,
        }
    }

    /// New intervals count from now.
    pub(crate) fn set_intervals(
        &mut self,
        tick_interval: Duration,
        external_interval: Duration,
    ) {
        if tick_interval == self.tick_interval && external_interval == self.external_interval {
            return;
        }
        *self = Self::new(tick_interval, external_interval);
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub(crate) fn next_deadline(&self) -> Instant {
        self.tick_deadline
    }

    pub(crate) fn is_tick_expired(
        &self,
        now: Instant,
    ) -> bool {
        self.tick_deadline <= now
    }

    pub(crate) fn is_external_expired(
        &self,
        now: Instant,
    ) -> bool {
        self.external_deadline <= now
    }

    pub(crate) fn reset_tick(
        &mut self,
        now: Instant,
    ) {
        self.tick_deadline = now + self.tick_interval;
    }

    pub(crate) fn reset_external(
        &mut self,
        now: Instant,
    ) {
        self.external_deadline = now + self.external_interval;
    }
}
