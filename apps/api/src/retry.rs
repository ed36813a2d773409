//! Bounded retry with exponential backoff, shared by every call into the provider.
//!
//! The policy holds no attempt state: every `run` call counts its own attempts,
//! so one policy value can be used by any number of call sites.

use std::fmt::Display;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Status handed to the caller before each backoff delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    /// The retry about to be made (1-based).
    pub retry: u32,
    pub delay: Duration,
    pub message: String,
}

/// Tagged result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32, error: E },
    /// A non-retryable error; no further attempts were made.
    Aborted(E),
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { error, .. } | RetryOutcome::Aborted(error) => Err(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Two retries, waiting 2s then 4s.
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay inserted before retry `n` (n >= 1). No jitter.
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `state` is lent to each attempt, which lets an
    /// attempt borrow mutable resources (e.g. a chat session) across its await points.
    pub async fn run<S, T, E, F, N>(&self, state: &mut S, mut op: F, mut notify: N) -> RetryOutcome<T, E>
    where
        E: Retryable + Display,
        F: for<'a> FnMut(&'a mut S, u32) -> BoxFuture<'a, Result<T, E>>,
        N: FnMut(&RetryNotice),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match op(&mut *state, attempt).await {
                Ok(value) => {
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return RetryOutcome::Aborted(error);
            }
            if attempt >= self.max_attempts() {
                warn!("Giving up after {} attempts: {}", attempt, error);
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    error,
                };
            }

            let delay = self.delay_before(attempt);
            warn!(
                "Attempt {}/{} failed: {} (retrying in {}s)",
                attempt,
                self.max_attempts(),
                error,
                delay.as_secs_f32()
            );
            notify(&RetryNotice {
                retry: attempt,
                delay,
                message: format!(
                    "Connection hiccup, retrying in {}s... (attempt {} of {})",
                    format_secs(delay),
                    attempt + 1,
                    self.max_attempts()
                ),
            });
            tokio::time::sleep(delay).await;
        }
    }
}

fn format_secs(delay: Duration) -> String {
    let secs = delay.as_secs_f32();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    enum FakeError {
        Transient,
        Fatal,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Transient)
        }
    }

    /// Fails with the queued errors in order, then succeeds.
    struct Script {
        failures: Vec<FakeError>,
        calls: u32,
    }

    impl Script {
        fn new(failures: Vec<FakeError>) -> Self {
            Self { failures, calls: 0 }
        }
    }

    async fn step(script: &mut Script) -> Result<&'static str, FakeError> {
        script.calls += 1;
        if script.failures.is_empty() {
            Ok("done")
        } else {
            Err(script.failures.remove(0))
        }
    }

    #[test]
    fn test_default_delays_are_2s_then_4s() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_before(1), Duration::from_secs(2));
        assert_eq!(policy.delay_before(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_makes_three_attempts() {
        let policy = RetryPolicy::default();
        let mut script = Script::new(vec![FakeError::Transient, FakeError::Transient]);
        let mut notices = Vec::new();
        let started = tokio::time::Instant::now();

        let outcome = policy
            .run(
                &mut script,
                |s, _| Box::pin(step(s)),
                |n| notices.push(n.clone()),
            )
            .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Success {
                value: "done",
                attempts: 3
            }
        ));
        assert_eq!(script.calls, 3);
        let delays: Vec<_> = notices.iter().map(|n| n.delay).collect();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_three_attempts() {
        let policy = RetryPolicy::default();
        let mut script = Script::new(vec![
            FakeError::Transient,
            FakeError::Transient,
            FakeError::Transient,
            FakeError::Transient,
        ]);

        let outcome = policy
            .run(&mut script, |s, _| Box::pin(step(s)), |_| {})
            .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted { attempts: 3, .. }
        ));
        assert_eq!(script.calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_aborts_immediately() {
        let policy = RetryPolicy::default();
        let mut script = Script::new(vec![FakeError::Fatal]);
        let mut notified = false;

        let outcome = policy
            .run(&mut script, |s, _| Box::pin(step(s)), |_| notified = true)
            .await;

        assert!(matches!(outcome, RetryOutcome::Aborted(FakeError::Fatal)));
        assert_eq!(script.calls, 1);
        assert!(!notified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_message_embeds_delay() {
        let policy = RetryPolicy::default();
        let mut script = Script::new(vec![FakeError::Transient]);
        let mut messages = Vec::new();

        policy
            .run(
                &mut script,
                |s, _| Box::pin(step(s)),
                |n| messages.push(n.message.clone()),
            )
            .await;

        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("retrying in 2s"), "{}", messages[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_run_counts_its_own_attempts() {
        let policy = RetryPolicy::default();
        let mut first = Script::new(vec![FakeError::Transient]);
        let mut second = Script::new(vec![FakeError::Transient, FakeError::Transient]);

        let a = policy.run(&mut first, |s, _| Box::pin(step(s)), |_| {}).await;
        let b = policy.run(&mut second, |s, _| Box::pin(step(s)), |_| {}).await;

        assert!(matches!(a, RetryOutcome::Success { attempts: 2, .. }));
        assert!(matches!(b, RetryOutcome::Success { attempts: 3, .. }));
    }

    #[test]
    fn test_into_result_maps_exhausted_to_err() {
        let outcome: RetryOutcome<(), FakeError> = RetryOutcome::Exhausted {
            attempts: 3,
            error: FakeError::Transient,
        };
        assert!(outcome.into_result().is_err());
    }
}
