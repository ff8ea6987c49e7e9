//! Retry logic with exponential backoff
//!
//! Fetches talk to remote hosts and fail transiently (DNS hiccups, dropped
//! connections, overloaded mirrors). Those failures are retried here, inside the
//! fetch collaborator; the batch runner itself never retries.
//!
//! # Example
//!
//! ```no_run
//! use toolstrap::retry::{IsRetryable, with_retry};
//! use toolstrap::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let result = with_retry(&config, &cancel, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, VcsError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset, remote hang-ups) should return `true`.
/// Permanent failures (unknown repository, bad revision, missing binary) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// VCS client stderr fragments that indicate a transient network problem
const TRANSIENT_VCS_MESSAGES: &[&str] = &[
    "could not resolve host",
    "connection reset",
    "connection timed out",
    "operation timed out",
    "early eof",
    "the remote end hung up unexpectedly",
    "temporary failure",
    "503",
    "502",
];

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Network errors are retryable when the request never completed
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Vcs(VcsError::CommandFailed { stderr, .. }) => {
                let stderr = stderr.to_lowercase();
                TRANSIENT_VCS_MESSAGES.iter().any(|m| stderr.contains(m))
            }
            // Resolution failures and unknown systems are permanent
            Error::Vcs(_) => false,
            Error::ActionFailed { source, .. } => source.is_retryable(),
            // Cancellation must never be retried
            Error::Cancelled => false,
            Error::InvalidArgument(_)
            | Error::WorkerPanicked(_)
            | Error::Config { .. }
            | Error::Build(_)
            | Error::Serialization(_)
            | Error::TomlParse { .. }
            | Error::ExternalTool(_)
            | Error::NotSupported(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `cancel` - Stops waiting between attempts; the last error is returned
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::select! {
                    _ = tokio::time::sleep(jittered_delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(error = %e, "Cancelled while waiting to retry");
                        return Err(e);
                    }
                }

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Grow `delay` by the backoff multiplier, capped at `max_delay`
///
/// Products that do not fit a `Duration` (overflow, NaN, negative) fall back to the cap.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .map_or(config.max_delay, |next| next.min(config.max_delay))
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_success_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&RetryConfig::default(), &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn test_retry_transient_then_succeed() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(3), &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should retry twice before success"
        );
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(2), &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "initial attempt plus two retries"
        );
    }

    #[tokio::test]
    async fn test_permanent_error_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(5), &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting_between_attempts() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(60),
            ..fast_config(5)
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let result = with_retry(&config, &cancel, || async { Err::<(), _>(TestError::Transient) }).await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_next_delay_grows_and_caps() {
        let config = fast_config(3);
        assert_eq!(
            next_delay(Duration::from_millis(10), &config),
            Duration::from_millis(20)
        );
        assert_eq!(
            next_delay(Duration::from_millis(800), &config),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_next_delay_survives_unrepresentable_multipliers() {
        for multiplier in [f64::MAX, f64::NAN, -3.0] {
            let config = RetryConfig {
                backoff_multiplier: multiplier,
                ..fast_config(3)
            };
            assert_eq!(
                next_delay(Duration::from_secs(5), &config),
                config.max_delay,
                "{multiplier}"
            );
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let jittered = add_jitter(base);
            assert!(jittered >= base);
            assert!(jittered <= base * 2);
        }
    }

    #[test]
    fn test_error_is_retryable_io() {
        let timeout = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        let missing = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(timeout.is_retryable());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_error_is_retryable_vcs_stderr() {
        let failed = |stderr: &str| {
            Error::Vcs(VcsError::CommandFailed {
                command: "git clone".into(),
                dir: PathBuf::from("/ws"),
                stderr: stderr.into(),
            })
        };

        assert!(failed("fatal: unable to access: Could not resolve host: github.com").is_retryable());
        assert!(failed("fatal: the remote end hung up unexpectedly").is_retryable());
        assert!(!failed("fatal: repository 'https://github.com/a/b' not found").is_retryable());
    }

    #[test]
    fn test_error_is_retryable_permanent() {
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::InvalidArgument("x".into()).is_retryable());
        assert!(!Error::NotSupported("hg".into()).is_retryable());
        assert!(
            !Error::Vcs(VcsError::UnresolvedImportPath {
                import_path: "x".into(),
                reason: "y".into(),
            })
            .is_retryable()
        );
    }
}
