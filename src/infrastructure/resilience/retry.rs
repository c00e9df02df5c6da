//! Generic retry policy with exponential backoff, shared by every outbound
//! adapter (LLM provider, cloud tool calls, remote durability engine).

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Classifies whether a failure is worth retrying. Adapters implement this
/// on their own error type so the policy stays generic.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff retry policy. Backoff doubles with each attempt,
/// capped at `max_backoff_ms`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }
                    let backoff = self.calculate_backoff(attempt);
                    tracing::warn!(attempt = attempt + 1, max_retries = self.max_retries, ?backoff, "retrying after transient failure");
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(bool);

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(6, 1000, 8000);
        assert_eq!(policy.calculate_backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.calculate_backoff(10), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy::new(3, 1, 2);
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<i32, TestError> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(TestError(true))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<i32, TestError> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError(false))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
