//! Retry bookkeeping of the polling engine.
//!
//! All transitions are plain methods so the ladder can be tested without
//! timers.

/// What triggered a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// `start_polling`'s immediate fetch.
    Start,
    /// Repeating timer.
    Tick,
    /// The single scheduled retry.
    Retry,
    /// `retry_from_error`.
    Manual,
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Schedule retry number `retry_count`.
    Retry {
        /// 1-based retry number.
        retry_count: u32,
    },
    /// The retry budget is spent; stop polling and report.
    Exhausted,
}

/// Counters and flags of the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingState {
    /// Failures since the last success.
    pub consecutive_errors: u32,
    /// Retries scheduled since the last success.
    pub retry_count: u32,
    /// A retry is scheduled and owns the next attempt.
    pub is_retrying: bool,
    /// No fetch has succeeded yet.
    pub is_first_attempt: bool,
}

impl Default for PollingState {
    fn default() -> Self {
        Self {
            consecutive_errors: 0,
            retry_count: 0,
            is_retrying: false,
            is_first_attempt: true,
        }
    }
}

impl PollingState {
    /// Returns true if a fetch for `trigger` may run now.
    ///
    /// Timer ticks and the start fetch yield to a scheduled retry; every
    /// other trigger runs.
    pub fn should_run(&self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Start | Trigger::Tick => !self.is_retrying,
            Trigger::Retry | Trigger::Manual => true,
        }
    }

    /// Returns true if a fetch should announce `fetching`.
    pub fn announces_fetching(&self) -> bool {
        self.is_first_attempt
    }

    /// Records a successful fetch.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.retry_count = 0;
        self.is_first_attempt = false;
    }

    /// Records a failed fetch and decides the next step.
    pub fn record_failure(&mut self, max_retries: u32) -> FailureAction {
        self.consecutive_errors += 1;
        if self.retry_count < max_retries {
            self.retry_count += 1;
            self.is_retrying = true;
            FailureAction::Retry {
                retry_count: self.retry_count,
            }
        } else {
            FailureAction::Exhausted
        }
    }

    /// Clears the retry flag before the scheduled retry runs.
    pub fn finish_retry(&mut self) {
        self.is_retrying = false;
    }

    /// Resets the error and retry counters.
    pub fn reset_counters(&mut self) {
        self.consecutive_errors = 0;
        self.retry_count = 0;
    }

    /// Resets everything for a manual retry.
    pub fn reset_for_manual_retry(&mut self) {
        *self = Self::default();
    }
}
