use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::warn;

/// Errors that can tell whether trying the same call again may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not transient; it is returned after the first attempt.
    Permanent(E),
    /// Every attempt failed with a transient error; `last` is the final one.
    Exhausted { attempts: usize, last: E },
}

/// Exponential backoff for destination setup calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(250), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// The pauses taken between consecutive attempts.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.base_delay,
            max: self.max_delay,
            remaining: self.max_attempts - 1,
        }
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    pub async fn retry<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let mut backoff = self.backoff();
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
                Err(err) => err,
            };

            let Some(delay) = backoff.next() else {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            };

            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Doubling delays capped at the policy's maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    remaining: usize,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next.min(self.max);
        self.next = self.next.saturating_mul(2);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Flaky,
        Denied,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, FakeError::Flaky)
        }
    }

    fn quick(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = quick(5)
            .retry("create table", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(FakeError::Flaky) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = quick(3)
            .retry("create table", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Flaky)
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, last: FakeError::Flaky })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = quick(5)
            .retry("create table", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Denied)
            })
            .await;

        assert!(matches!(result, Err(RetryError::Permanent(FakeError::Denied))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(300));
        let delays: Vec<u64> = policy.backoff().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 300, 300]);
    }

    #[test]
    fn test_single_attempt_never_sleeps() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1), Duration::ZERO).backoff().count(), 0);
    }
}
