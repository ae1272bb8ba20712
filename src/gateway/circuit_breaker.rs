//! Per-backend circuit breaker state machine (§3, §4.3, testable property 8).
//!
//! CLOSED iff `failure_count < threshold`. OPEN only transitions to
//! HALF_OPEN after `cooldown` has elapsed since `last_failure_time`. Any
//! success while HALF_OPEN resets to CLOSED with `failure_count = 0`.

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    threshold: u32,
    cooldown: Duration,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        CircuitBreaker {
            state: BreakerState::Closed,
            failure_count: 0,
            threshold,
            cooldown,
            last_failure_time: None,
            last_success_time: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Checks whether a call may proceed right now, transitioning OPEN to
    /// HALF_OPEN in place if the cooldown has elapsed. Must be called
    /// immediately before dispatching a call.
    pub fn can_execute(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .last_failure_time
                    .map(|t| now.signed_duration_since(t))
                    .unwrap_or_default();
                if elapsed >= chrono::Duration::from_std(self.cooldown).unwrap_or_default() {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_success_time = Some(now);
        self.failure_count = 0;
        self.state = BreakerState::Closed;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure_time = Some(now);
        match self.state {
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
            }
            BreakerState::Closed | BreakerState::Open => {
                self.failure_count += 1;
                if self.failure_count >= self.threshold {
                    self.state = BreakerState::Open;
                }
            }
        }
    }
}
