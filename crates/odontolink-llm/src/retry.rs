//! Bounded retry around the oracle call.

use std::future::Future;
use std::time::{Duration, Instant};

use odontolink_config::{RescueConfig, MAX_RESCUE_RETRIES};
use tracing::debug;

use crate::backend::LlmError;

/// Why one attempt failed.
#[derive(Debug)]
pub enum AttemptFailure {
    /// Network, API or timeout failure.
    Transport(LlmError),
    /// The reply arrived but failed the schema.
    Invalid(String),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Transport(e) => write!(f, "{e}"),
            AttemptFailure::Invalid(reason) => write!(f, "invalid reply: {reason}"),
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32, latency: Duration },
    Failed { last: AttemptFailure, attempts: u32, latency: Duration },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn latency(&self) -> Duration {
        match self {
            RetryOutcome::Succeeded { latency, .. } | RetryOutcome::Failed { latency, .. } => *latency,
        }
    }
}

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Wait after the first transport failure, doubled for each later one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RESCUE_RETRIES,
            timeout: Duration::from_millis(8000),
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RescueConfig) -> Self {
        Self {
            max_retries: config.max_retries.min(MAX_RESCUE_RETRIES),
            timeout: Duration::from_millis(config.timeout_ms),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before attempt `attempt + 1`, given `attempt` attempts so far.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the zero-based attempt number. Each attempt is bounded
    /// by the timeout; a timed-out attempt counts as a transport failure.
    /// Transport failures are followed by an exponential backoff; invalid
    /// replies are retried at once.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let start = Instant::now();
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, op(attempt)).await {
                Ok(r) => r,
                Err(_) => Err(AttemptFailure::Transport(LlmError::Timeout(
                    self.timeout.as_millis() as u64,
                ))),
            };
            attempt += 1;
            match result {
                Ok(value) => {
                    return RetryOutcome::Succeeded { value, attempts: attempt, latency: start.elapsed() };
                }
                Err(failure) if attempt >= self.max_attempts() => {
                    return RetryOutcome::Failed { last: failure, attempts: attempt, latency: start.elapsed() };
                }
                Err(failure) => {
                    debug!("Rescue attempt {} failed: {}", attempt, failure);
                    if matches!(failure, AttemptFailure::Transport(_)) {
                        tokio::time::sleep(self.backoff_after(attempt)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let outcome = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(AttemptFailure::Invalid("empty".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert!(matches!(outcome, RetryOutcome::Succeeded { value: "ok", attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 2,
            timeout: Duration::from_millis(50),
            backoff: Duration::from_millis(20),
        };
        let start = Instant::now();
        let outcome: RetryOutcome<()> = policy
            .run(|_| async { Err(AttemptFailure::Transport(LlmError::Unavailable("down".into()))) })
            .await;
        assert_eq!(outcome.attempts(), 3);
        // 20 ms after the first failure, 40 ms after the second.
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(matches!(outcome, RetryOutcome::Failed { last: AttemptFailure::Transport(_), .. }));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transport_failure() {
        let policy = RetryPolicy {
            max_retries: 0,
            timeout: Duration::from_millis(10),
            backoff: Duration::ZERO,
        };
        let outcome: RetryOutcome<()> = policy
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            outcome,
            RetryOutcome::Failed { last: AttemptFailure::Transport(LlmError::Timeout(10)), attempts: 1, .. }
        ));
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(10), MAX_BACKOFF);
        assert_eq!(policy.backoff_after(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_config_retries_are_clamped() {
        let config = RescueConfig { max_retries: u32::MAX, ..RescueConfig::default() };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, MAX_RESCUE_RETRIES);
        assert_eq!(policy.max_attempts(), 3);

        let unbounded = RetryPolicy { max_retries: u32::MAX, ..policy };
        assert_eq!(unbounded.max_attempts(), u32::MAX);
    }
}
