//! Bounded exponential backoff for the presence subscription.
//!
//! The manager is a plain state machine: the coordinator feeds it status
//! transitions and acts on the returned [`ReconnectDecision`]. It also owns
//! the handle of the single pending retry timer so an explicit disconnect
//! can abort it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TerminalError;
use crate::protocol::ConnectionStatus;

/// Delay policy: `min(base * 2^attempt, max)`, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (zero based). Saturates at
    /// `max_delay` instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// What the coordinator should do after a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Arm a timer for `delay`, then reconnect. `attempt` is one based.
    Schedule { attempt: u32, delay: Duration },
    /// Retries are exhausted; stay in `Error`.
    GiveUp(TerminalError),
    /// Connected; the failure counter was cleared.
    Reset,
    Ignore,
}

pub struct ReconnectionManager {
    backoff: Backoff,
    max_retries: u32,
    /// Consecutive failed attempts since the last `Connected`.
    attempt: u32,
    pending: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl ReconnectionManager {
    pub fn new(backoff: Backoff, max_retries: u32) -> Self {
        Self {
            backoff,
            max_retries,
            attempt: 0,
            pending: None,
            cancelled: false,
        }
    }

    pub fn on_status(&mut self, status: ConnectionStatus) -> ReconnectDecision {
        match status {
            ConnectionStatus::Connected => {
                if self.attempt > 0 {
                    info!(after = self.attempt, "presence reconnected");
                }
                self.attempt = 0;
                ReconnectDecision::Reset
            }
            ConnectionStatus::Connecting => ReconnectDecision::Ignore,
            ConnectionStatus::Error | ConnectionStatus::Disconnected => {
                if self.cancelled || self.pending.is_some() {
                    return ReconnectDecision::Ignore;
                }
                if self.attempt >= self.max_retries {
                    return ReconnectDecision::GiveUp(TerminalError {
                        retries: self.attempt,
                    });
                }
                let delay = self.backoff.delay(self.attempt);
                self.attempt += 1;
                debug!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                ReconnectDecision::Schedule {
                    attempt: self.attempt,
                    delay,
                }
            }
        }
    }

    /// Hold the timer for the scheduled retry. Any older timer is aborted.
    pub fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.pending.replace(timer) {
            old.abort();
        }
    }

    /// The pending timer has fired; the retry it triggered is in flight.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    /// Stop for good: abort the pending timer and ignore further failures.
    /// The aborted timer does not count as a retry.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(timer) = self.pending.take() {
            timer.abort();
        }
    }

    /// Clear the failure counter and re-enable scheduling.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.cancelled = false;
        if let Some(timer) = self.pending.take() {
            timer.abort();
        }
    }

    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
