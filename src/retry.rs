//! Bounded exponential backoff for retryable failures.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Backoff schedule: a fixed attempt cap with a delay that doubles from
/// `floor` up to `ceiling` between attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub attempts: u32,
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 3,
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(10),
        }
    }
}

/// Run `op` up to `backoff.attempts` times, sleeping between attempts.
///
/// Only errors whose [`Error::is_retryable`] flag is set are retried;
/// anything else is returned immediately. When attempts are exhausted the
/// last retryable error is surfaced to the caller.
pub async fn with_backoff<T, F, Fut>(backoff: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = backoff.attempts.max(1);
    let mut delay = backoff.floor;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(attempt, error = %e, "retryable failure, backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(backoff.ceiling);
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop either returns a value or an error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> Backoff {
        Backoff {
            attempts: 3,
            floor: Duration::from_millis(1),
            ceiling: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(quick(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::EmbeddingConnection("refused".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(quick(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::EmbeddingModel("missing".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::EmbeddingModel(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(quick(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::EmbeddingConnection("timed out".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::EmbeddingConnection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
