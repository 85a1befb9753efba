//! Bounded polling with cancellation.
//!
//! Replaces self-rescheduling timers: one loop per tracked job, a fixed
//! interval before every attempt, a hard attempt ceiling, and a
//! [`CancellationToken`] that stops the loop between or during attempts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Configuration for polling behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before each attempt
    pub interval: Duration,
    /// Attempts before giving up (pending and transient errors both count)
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Upper bound on how long a poll loop can run (ignoring request latency).
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// What one attempt observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Terminal success
    Done(T),
    /// Terminal failure reported by the remote side
    Failed(String),
    /// Not finished yet
    Pending,
    /// The attempt itself failed (network); retried silently
    Transient(String),
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Failed(String),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Run `op` until it reports a terminal step, the attempt budget is spent,
/// or `cancel` fires. `op` receives the 1-based attempt number.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    operation_name: &str,
    mut op: F,
) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(policy.interval) => {}
        }

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            step = op(attempt) => step,
        };

        match step {
            PollStep::Done(value) => {
                tracing::debug!(attempt, operation = operation_name, "Poll finished");
                return PollOutcome::Ready(value);
            }
            PollStep::Failed(error) => {
                tracing::debug!(attempt, operation = operation_name, error = %error, "Poll reported failure");
                return PollOutcome::Failed(error);
            }
            PollStep::Pending => {
                tracing::trace!(attempt, operation = operation_name, "Still pending");
            }
            PollStep::Transient(error) => {
                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    operation = operation_name,
                    error = %error,
                    "Poll attempt failed, retrying"
                );
            }
        }
    }

    tracing::warn!(
        attempts = policy.max_attempts,
        operation = operation_name,
        "Poll gave up after all attempts"
    );
    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    }
}
