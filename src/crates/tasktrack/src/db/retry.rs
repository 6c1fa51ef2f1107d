//! Bounded, fixed-delay retry for storage contention
//!
//! Only busy/locked failures are retried. The delay is constant with no
//! jitter, so retry timing is deterministic.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for contention failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,

    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Errors that can tell whether they are transient contention
pub trait Retryable {
    fn is_contention(&self) -> bool;
}

impl Retryable for sqlx::Error {
    fn is_contention(&self) -> bool {
        is_contention(self)
    }
}

/// SQLite primary result codes for SQLITE_BUSY and SQLITE_LOCKED
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Check whether a storage error means the store is busy or a table is locked.
///
/// Extended result codes (e.g. `SQLITE_BUSY_SNAPSHOT`) are folded onto their
/// primary code; the message is checked as a fallback.
pub fn is_contention(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };

    if let Some(code) = db_err.code().and_then(|c| c.parse::<i64>().ok()) {
        let primary = code & 0xff;
        if primary == SQLITE_BUSY || primary == SQLITE_LOCKED {
            return true;
        }
    }

    let message = db_err.message().to_ascii_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

/// Run `operation` against `ctx`, retrying contention failures.
///
/// The operation is attempted once, then up to `policy.max_retries` more
/// times while it fails with contention, sleeping `policy.delay` between
/// attempts. Any other error, or the last contention error, is returned
/// unchanged.
pub async fn with_retry<C, T, E, F>(
    policy: &RetryPolicy,
    label: &str,
    ctx: &mut C,
    mut operation: F,
) -> std::result::Result<T, E>
where
    C: Send,
    E: Retryable + std::fmt::Display,
    F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, std::result::Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        match operation(ctx).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = %label, attempt = attempt, "Retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if e.is_contention() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    operation = %label,
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Store busy, will retry"
                );
                sleep(policy.delay).await;
            }
            Err(e) => {
                if e.is_contention() {
                    warn!(
                        operation = %label,
                        attempts = attempt + 1,
                        error = %e,
                        "Store busy, retries exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Busy,
        Broken,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                FakeError::Busy => write!(f, "SQLITE_BUSY: database is locked"),
                FakeError::Broken => write!(f, "disk I/O error"),
            }
        }
    }

    impl Retryable for FakeError {
        fn is_contention(&self) -> bool {
            matches!(self, FakeError::Busy)
        }
    }

    /// Fails with the scripted errors, then succeeds with the attempt count
    struct Script {
        failures: Vec<FakeError>,
        attempts: usize,
    }

    fn run_script(script: &mut Script) -> BoxFuture<'_, Result<usize, FakeError>> {
        Box::pin(async move {
            script.attempts += 1;
            if script.failures.is_empty() {
                Ok(script.attempts)
            } else {
                Err(script.failures.remove(0))
            }
        })
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_twice_then_success() {
        let mut script = Script {
            failures: vec![FakeError::Busy, FakeError::Busy],
            attempts: 0,
        };

        let result = with_retry(&RetryPolicy::default(), "test", &mut script, run_script).await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_original_error() {
        let mut script = Script {
            failures: (0..10).map(|_| FakeError::Busy).collect(),
            attempts: 0,
        };

        let result = with_retry(&RetryPolicy::default(), "test", &mut script, run_script).await;

        assert_eq!(result, Err(FakeError::Busy));
        // Initial attempt + 3 retries
        assert_eq!(script.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let mut script = Script {
            failures: vec![FakeError::Broken, FakeError::Busy],
            attempts: 0,
        };

        let result = with_retry(&RetryPolicy::default(), "test", &mut script, run_script).await;

        assert_eq!(result, Err(FakeError::Broken));
        assert_eq!(script.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let mut script = Script {
            failures: vec![FakeError::Busy, FakeError::Busy, FakeError::Busy],
            attempts: 0,
        };

        let start = tokio::time::Instant::now();
        let result = with_retry(&RetryPolicy::default(), "test", &mut script, run_script).await;

        assert_eq!(result, Ok(4));
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[test]
    fn test_non_database_errors_are_not_contention() {
        assert!(!is_contention(&sqlx::Error::RowNotFound));
        assert!(!is_contention(&sqlx::Error::PoolTimedOut));
    }
}
