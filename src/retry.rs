//! Time-windowed retry budget.
//!
//! A failed attempt is retried immediately. Retries are not counted
//! one by one; instead, each time the time elapsed since the start of the
//! current window exceeds the phase timeout, one slot of the budget is used
//! and a new window starts. A phase gives up once all slots are used, so its
//! worst-case latency is about `timeout * slots`.

use core::{ops::ControlFlow, time::Duration};
use log::debug;

/// Default number of slots of a retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Retry behavior selected by a signed `max_retries` value.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum RetryLimit {
    /// Retry until the given number of slots is used.
    Slots(u32),
    /// Do not retry; stop at the first failure.
    NoError,
}

impl RetryLimit {
    /// Interprets `max_retries`: zero selects the default,
    /// negative values select [`RetryLimit::NoError`].
    #[must_use]
    pub fn from_max_retries(max_retries: i32) -> Self {
        match u32::try_from(max_retries) {
            Ok(0) => Self::Slots(DEFAULT_MAX_RETRIES),
            Ok(n) => Self::Slots(n),
            Err(_) => Self::NoError,
        }
    }
}

/// Retry budget of a single phase.
#[derive(Debug)]
pub struct RetryBudget {
    timeout: Duration,
    max_slots: u32,
    slots: u32,
    start: Option<Duration>,
}

impl RetryBudget {
    /// Constructs a budget of `max_slots` windows of `timeout` each.
    #[must_use]
    pub fn new(timeout: Duration, max_slots: u32) -> Self {
        Self {
            timeout,
            max_slots,
            slots: 0,
            start: None,
        }
    }

    /// Returns the number of used slots.
    #[must_use]
    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Records a failed attempt at time `now`.
    ///
    /// Returns [`ControlFlow::Break`] once the budget is exhausted.
    pub fn record_failure(&mut self, now: Duration) -> ControlFlow<()> {
        let start = *self.start.get_or_insert(now);

        if now.saturating_sub(start) > self.timeout {
            self.slots += 1;
            self.start = Some(now);

            debug!("Retry slot {}/{} used", self.slots, self.max_slots);
        }

        if self.slots >= self.max_slots {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
