//! Bounded retry of a whole unit of work on transient store contention.
//!
//! A retried unit always starts from scratch (new database transaction, new
//! lock, new reads). Failed attempts roll back completely, so repeating them
//! cannot double-apply anything.

use std::{future::Future, time::Duration};

use crate::{EngineError, ResultEngine};

/// Attempts used for balance-moving operations.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 5;
/// Attempts used for read-only lookups.
pub const DEFAULT_READ_ATTEMPTS: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub const fn writes() -> Self {
        Self::new(
            DEFAULT_WRITE_ATTEMPTS,
            Duration::from_millis(10),
            Duration::from_millis(500),
        )
    }

    pub const fn reads() -> Self {
        Self::new(
            DEFAULT_READ_ATTEMPTS,
            Duration::from_millis(5),
            Duration::from_millis(250),
        )
    }

    /// Delay before attempt `attempt + 1`, doubling from `base_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::writes()
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy is
/// exhausted.
///
/// Transient errors (see [`EngineError::is_transient`]) are retried. When the
/// attempts run out, store errors become [`EngineError::PersistenceFailure`];
/// an exhausted reference generator keeps its own variant. Every other error
/// is returned as-is on first sight.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut unit: F,
) -> ResultEngine<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResultEngine<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match unit().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                tracing::error!(operation, attempt, error = %err, "giving up after transient failures");
                return Err(match err {
                    EngineError::Database(db_err) => EngineError::PersistenceFailure {
                        attempts: attempt,
                        message: db_err.to_string(),
                    },
                    other => other,
                });
            }
            Err(err) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use sea_orm::{ConnAcquireErr, DbErr};

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn busy() -> EngineError {
        EngineError::Database(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(4), Duration::from_millis(50));
        assert_eq!(policy.backoff(64), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = retry_transient(fast(5), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(busy())
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_persistence_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry_transient(fast(3), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(busy())
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            EngineError::PersistenceFailure { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry_transient(fast(5), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(EngineError::WalletNotFound("nobody".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err, EngineError::WalletNotFound("nobody".to_string()));
    }

    #[tokio::test]
    async fn exhausted_reference_generation_keeps_its_variant() {
        let err = retry_transient(fast(2), "test", || async {
            Err::<(), _>(EngineError::ReferenceGenerationFailed { attempts: 5 })
        })
        .await
        .unwrap_err();
        assert_eq!(err, EngineError::ReferenceGenerationFailed { attempts: 5 });
    }
}
