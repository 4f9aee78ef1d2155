//! Shared retry/backoff helper for the three provider adapters (§4.A).
//!
//! Generalizes the teacher's fixed-interval `rate_limit_backoff` into a
//! jittered exponential backoff capped per the spec's "base 500ms, cap 8s"
//! rule, with an attempt budget instead of an unbounded retry loop.

use rand::Rng;
use std::time::Duration;

use crate::error::ProviderError;

/// Outcome of a single attempt, used to decide whether `with_retry` should
/// try again or surface immediately.
pub enum Attempt<T> {
    /// The call succeeded.
    Ok(T),
    /// A retriable failure (network error, or HTTP 408/429/5xx).
    Retriable(ProviderError),
    /// A non-retriable failure (4xx other than 408/429, or a malformed
    /// request built by us): surfaces immediately without consuming the
    /// remaining attempt budget.
    Fatal(ProviderError),
}

/// Compute the backoff duration before retry attempt number `attempt`
/// (0-indexed: the delay before the *second* attempt overall), as
/// `base * 2^attempt` capped at `cap`, with up to 50% jitter added.
pub fn backoff_duration(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = base
        .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
        .unwrap_or(cap);
    let capped = exp.min(cap);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
    capped + Duration::from_millis(jitter_ms)
}

/// Run `op` up to `max_attempts` times (the first attempt plus
/// `max_attempts - 1` retries), sleeping a jittered exponential backoff
/// between retriable failures. Fatal failures and the final retriable
/// failure are returned as-is.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, base: Duration, cap: Duration, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Attempt<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_err: Option<ProviderError> = None;

    for attempt in 0..max_attempts {
        match op(attempt).await {
            Attempt::Ok(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retriable(err) => {
                last_err = Some(err);
                if attempt + 1 < max_attempts {
                    tokio::time::sleep(backoff_duration(base, cap, attempt)).await;
                }
            }
        }
    }

    Err(last_err.expect("max_attempts >= 1 guarantees at least one iteration"))
}

/// Classify an HTTP status code into retriable-vs-not per §4.A's common
/// contract: 408, 429, 500, 502, 503, 504 are retriable; any other
/// non-2xx status is a non-retriable `BadRequest`.
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retriable_status_codes() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retriable_status(status));
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_retriable_status(status));
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(8);
        assert!(backoff_duration(base, cap, 0) >= base);
        assert!(backoff_duration(base, cap, 0) < base * 2);
        assert!(backoff_duration(base, cap, 10) <= cap + cap / 2);
    }

    #[tokio::test]
    async fn with_retry_succeeds_without_retrying_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, ProviderError> = with_retry(
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Ok("done") }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, ProviderError> = with_retry(
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
            |attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Attempt::Retriable(ProviderError::Transient {
                            provider: "text",
                            message: format!("attempt {attempt}"),
                        })
                    } else {
                        Attempt::Ok("done")
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_surfaces_after_exhausting_attempts() {
        let result: Result<&str, ProviderError> = with_retry(
            2,
            Duration::from_millis(1),
            Duration::from_millis(10),
            |_attempt| async {
                Attempt::Retriable(ProviderError::Transient {
                    provider: "image",
                    message: "503".into(),
                })
            },
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Transient { .. })));
    }

    #[tokio::test]
    async fn with_retry_surfaces_fatal_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, ProviderError> = with_retry(
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Attempt::Fatal(ProviderError::BadRequest {
                        provider: "text",
                        message: "bad api key".into(),
                    })
                }
            },
        )
        .await;
        assert!(matches!(result, Err(ProviderError::BadRequest { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
