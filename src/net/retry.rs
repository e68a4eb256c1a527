//! Backoff driver for retryable failures.
//!
//! A request attempt resolves to one of three outcomes; the driver loop
//! inspects the tag instead of branching on error types. The wait ladder
//! starts at four seconds and doubles up to 128 seconds; when the attempt
//! after the final wait still fails, the last retryable error is surfaced.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::protocol::{DriverError, DriverResult};

pub(crate) const INITIAL_SLEEP_TIME_SECS: u64 = 4;
pub(crate) const SLEEP_TIME_MULTIPLIER: u64 = 2;
pub(crate) const MAX_SLEEP_TIME_SECS: u64 = 128;

/// Outcome of a single request attempt.
pub(crate) enum Attempt<T> {
    Success(T),
    Retry(DriverError),
    Fatal(DriverError),
}

/// Runs `attempt` under the backoff ladder. The first attempt is expected
/// to have already failed with `first_error` before entering the loop.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    first_error: DriverError,
    mut attempt: F,
) -> DriverResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut last_error = first_error;
    let mut wait_secs = INITIAL_SLEEP_TIME_SECS;
    while wait_secs <= MAX_SLEEP_TIME_SECS {
        info!("retrying in {} seconds...", wait_secs);
        sleep(Duration::from_secs(wait_secs)).await;
        match attempt().await {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fatal(error) => return Err(error),
            Attempt::Retry(error) => last_error = error,
        }
        wait_secs *= SLEEP_TIME_MULTIPLIER;
    }
    info!(
        "giving up after the {} second wait, no more retries will be made",
        MAX_SLEEP_TIME_SECS
    );
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn server_error(code: u16) -> DriverError {
        DriverError::Status {
            code,
            error_num: None,
            message: "boom".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_failures_then_success_waits_the_exact_ladder() {
        // First failure happens before the loop; four more retryable
        // failures inside it, then success. Waits must be 4, 8, 16, 32, 64.
        let attempts = Arc::new(AtomicUsize::new(0));
        let waits = Arc::new(std::sync::Mutex::new(Vec::new()));
        let started = Instant::now();

        let result = {
            let attempts = attempts.clone();
            let waits = waits.clone();
            retry_with_backoff(server_error(503), move || {
                let attempts = attempts.clone();
                let waits = waits.clone();
                async move {
                    waits.lock().unwrap().push(started.elapsed().as_secs());
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 4 {
                        Attempt::Retry(server_error(503))
                    } else {
                        Attempt::Success(n)
                    }
                }
            })
            .await
        };

        assert_eq!(result.unwrap(), 4);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        // Cumulative elapsed time at each attempt: 4, 12, 28, 60, 124.
        assert_eq!(*waits.lock().unwrap(), vec![4, 12, 28, 60, 124]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_the_last_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: DriverResult<()> = {
            let attempts = attempts.clone();
            retry_with_backoff(server_error(500), move || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Attempt::Retry(server_error(502))
                }
            })
            .await
        };

        // Waits 4, 8, 16, 32, 64, 128 -> six attempts inside the loop.
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        let err = result.unwrap_err();
        assert_eq!(err.response_code(), Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_outcome_stops_the_loop() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: DriverResult<()> = {
            let attempts = attempts.clone();
            retry_with_backoff(server_error(500), move || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Attempt::Fatal(DriverError::Serialization("bad body".to_string()))
                }
            })
            .await
        };

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), DriverError::Serialization(_)));
    }
}
