//! Execution policy applied to every tool call: recovery chain, bounded
//! exponential retry, an absolute timeout and cooperative cancellation.

use crate::error::ToolError;
use rember_core::DomainErrorKind;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of running a handler under the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome<T> {
    Success(T),
    /// A recovery rule replaced the failure with a user-facing message.
    Recovered(String),
    Cancelled,
    TimedOut(Duration),
    /// A failure no rule recovered; carries the error message only.
    Fault(String),
}

#[derive(Debug, Clone)]
struct RecoveryRule {
    kind: DomainErrorKind,
    message: String,
}

/// Ordered rules mapping domain errors to fixed messages.
///
/// Rules are checked before any retry; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RecoveryChain {
    rules: Vec<RecoveryRule>,
}

impl RecoveryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, kind: DomainErrorKind, message: impl Into<String>) -> Self {
        self.rules.push(RecoveryRule {
            kind,
            message: message.into(),
        });
        self
    }

    pub fn recover(&self, error: &ToolError) -> Option<&str> {
        let ToolError::Domain(domain) = error else {
            return None;
        };
        self.rules
            .iter()
            .find(|rule| rule.kind == domain.kind)
            .map(|rule| rule.message.as_str())
    }
}

/// Where a call stands between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyState {
    Idle,
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
}

/// Timeout, retry and backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
    /// Absolute bound on the whole attempt sequence.
    pub timeout: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ExecutionPolicy {
    /// Backoff after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `attempt_fn` until it succeeds, a rule recovers its failure, the
    /// failure is not retryable, the attempts run out, the timeout elapses or
    /// `cancel` fires.
    ///
    /// Each attempt receives a child of `cancel` that is also cancelled when
    /// the attempt is abandoned because of the timeout.
    pub async fn run<T, F, Fut>(
        &self,
        recovery: &RecoveryChain,
        mut attempt_fn: F,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut state = PolicyState::Idle;

        loop {
            if cancel.is_cancelled() {
                debug!(?state, "Cancelled before next transition");
                return ExecutionOutcome::Cancelled;
            }

            state = match state {
                PolicyState::Idle => PolicyState::Attempting { attempt: 1 },

                PolicyState::Attempting { attempt } => {
                    let token = cancel.child_token();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return ExecutionOutcome::Cancelled;
                        }
                        _ = sleep_until(deadline) => {
                            token.cancel();
                            warn!(attempt, "Tool call timed out");
                            return ExecutionOutcome::TimedOut(self.timeout);
                        }
                        result = attempt_fn(token.clone()) => result,
                    };

                    let error = match result {
                        Ok(value) => return ExecutionOutcome::Success(value),
                        Err(error) => error,
                    };

                    if let Some(message) = recovery.recover(&error) {
                        debug!(attempt, error = %error, "Recovered tool failure");
                        return ExecutionOutcome::Recovered(message.to_string());
                    }
                    if matches!(error, ToolError::Cancelled) {
                        return ExecutionOutcome::Cancelled;
                    }
                    if !error.is_retryable() {
                        return ExecutionOutcome::Fault(error.to_string());
                    }
                    if Instant::now() >= deadline {
                        return ExecutionOutcome::TimedOut(self.timeout);
                    }
                    if attempt >= self.max_attempts {
                        warn!(attempts = attempt, error = %error, "Retry budget exhausted");
                        return ExecutionOutcome::Fault(error.to_string());
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        backoff_ms = delay.as_millis(),
                        error = %error,
                        "Tool call failed, retrying"
                    );
                    PolicyState::Backoff { attempt, delay }
                }

                PolicyState::Backoff { attempt, delay } => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return ExecutionOutcome::Cancelled;
                        }
                        _ = sleep_until(deadline) => {
                            warn!(attempt, "Tool call timed out while backing off");
                            return ExecutionOutcome::TimedOut(self.timeout);
                        }
                        _ = sleep(delay) => PolicyState::Attempting { attempt: attempt + 1 },
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rember_core::DomainError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const QUOTA_MESSAGE: &str = "You've reached your monthly limit.";

    fn chain() -> RecoveryChain {
        RecoveryChain::new().on(DomainErrorKind::QuotaExceeded, QUOTA_MESSAGE)
    }

    /// Fails with a transient error `failures` times, then succeeds.
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
    ) -> impl FnMut(CancellationToken) -> std::future::Ready<Result<&'static str, ToolError>> {
        move |_token| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= failures {
                std::future::ready(Err(ToolError::Transient(format!("failure {}", call))))
            } else {
                std::future::ready(Ok("done"))
            }
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = ExecutionPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_recovery_chain_first_rule_wins() {
        let chain = RecoveryChain::new()
            .on(DomainErrorKind::QuotaExceeded, "first")
            .on(DomainErrorKind::QuotaExceeded, "second");
        let error = ToolError::Domain(DomainError::quota_exceeded("limit"));

        assert_eq!(chain.recover(&error), Some("first"));
        assert_eq!(chain.recover(&ToolError::Transient("x".into())), None);
        assert_eq!(
            chain.recover(&ToolError::Domain(DomainError::rate_limited("x"))),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let outcome = ExecutionPolicy::default()
            .run(&chain(), flaky(calls.clone(), 2), &CancellationToken::new())
            .await;

        assert_eq!(outcome, ExecutionOutcome::Success("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s + 4s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_stops_after_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = ExecutionPolicy::default()
            .run(&chain(), flaky(calls.clone(), u32::MAX), &CancellationToken::new())
            .await;

        assert_eq!(outcome, ExecutionOutcome::Fault("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_domain_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: ExecutionOutcome<()> = ExecutionPolicy::default()
            .run(
                &chain(),
                move |_token| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(ToolError::Domain(DomainError::quota_exceeded("30/30"))) }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, ExecutionOutcome::Recovered(QUOTA_MESSAGE.to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecovered_domain_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: ExecutionOutcome<()> = ExecutionPolicy::default()
            .run(
                &RecoveryChain::new(),
                move |_token| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(ToolError::Domain(DomainError::rate_limited("Too many requests"))) }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Fault("Too many requests".to_string())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let outcome = ExecutionPolicy::default()
            .run(&chain(), flaky(calls.clone(), u32::MAX), &cancel)
            .await;

        assert_eq!(outcome, ExecutionOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_attempt_reaches_handler() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_by_handler = seen.clone();
        let outcome: ExecutionOutcome<()> = ExecutionPolicy::default()
            .run(
                &chain(),
                move |token| {
                    *seen_by_handler.lock().unwrap() = Some(token.clone());
                    async move {
                        token.cancelled().await;
                        Err(ToolError::Cancelled)
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(outcome, ExecutionOutcome::Cancelled);
        let token = seen.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_makes_no_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = ExecutionPolicy::default()
            .run(&chain(), flaky(calls.clone(), 0), &cancel)
            .await;

        assert_eq!(outcome, ExecutionOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_slow_attempt() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_by_handler = seen.clone();
        let start = Instant::now();

        let outcome: ExecutionOutcome<()> = ExecutionPolicy::default()
            .run(
                &chain(),
                move |token| {
                    *seen_by_handler.lock().unwrap() = Some(token);
                    async {
                        sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, ExecutionOutcome::TimedOut(Duration::from_secs(30)));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        // The abandoned attempt is told to stop
        assert!(seen.lock().unwrap().as_ref().unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_takes_precedence_over_remaining_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ExecutionPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        };
        let start = Instant::now();

        // Attempts at t=0 and t=2, the second backoff would end at t=6
        let outcome = policy
            .run(&chain(), flaky(calls.clone(), u32::MAX), &CancellationToken::new())
            .await;

        assert_eq!(outcome, ExecutionOutcome::TimedOut(Duration::from_secs(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: ExecutionOutcome<()> = ExecutionPolicy::default()
            .run(
                &chain(),
                move |_token| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(ToolError::Rejected("note too long".into())) }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, ExecutionOutcome::Fault("note too long".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
