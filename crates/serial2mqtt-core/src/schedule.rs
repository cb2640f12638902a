//! Drift-free periodic trigger
//!
//! The next deadline advances by exactly one period from the previous
//! deadline, so small scheduling delays do not accumulate. After a long stall
//! the deadline is pulled up to `now`, so at most one fire happens per poll
//! instead of a catch-up burst.

/// Current wall clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Periodic trigger state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    next_fire_ms: i64,
    period_ms: i64,
}

impl Scheduler {
    /// Scheduler firing first at `start_ms`, then every `period_ms`.
    ///
    /// A period of zero or less disables the trigger.
    pub fn new(period_ms: i64, start_ms: i64) -> Self {
        Self {
            next_fire_ms: start_ms,
            period_ms,
        }
    }

    /// Scheduler for a period given in seconds, as in the options file
    pub fn from_period_secs(period_secs: u64, start_ms: i64) -> Self {
        let period_ms = i64::try_from(period_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        Self::new(period_ms, start_ms)
    }

    /// Whether the trigger can ever fire
    pub fn is_enabled(&self) -> bool {
        self.period_ms > 0
    }

    /// Deadline of the next fire
    pub fn next_fire_ms(&self) -> i64 {
        self.next_fire_ms
    }

    /// Period between fires
    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Check the trigger at `now_ms`; returns true when the action is due.
    pub fn poll(&mut self, now_ms: i64) -> bool {
        if !self.is_enabled() || now_ms < self.next_fire_ms {
            return false;
        }
        self.next_fire_ms = now_ms.max(self.next_fire_ms.saturating_add(self.period_ms));
        true
    }
}
