use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;
const BACKOFF_SECONDS: &[u64] = &[1, 2, 4];

/// Backoff before retry number `attempt` (zero-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = BACKOFF_SECONDS
        .get(attempt as usize)
        .copied()
        .unwrap_or(4);
    Duration::from_secs(secs)
}

/// Retry an order API call expression with backoff on 429 responses.
///
/// Usage: `retry_api!(self.get_json(url.clone()))`
///
/// The expression is re-evaluated on each retry attempt. This is a macro
/// because async closures that return borrowed futures can't satisfy `Fn`.
macro_rules! retry_api {
    ($expr:expr) => {{
        let mut _attempt: u32 = 0;
        loop {
            match $expr.await {
                Ok(val) => break Ok::<_, $crate::error::Error>(val),
                Err(e) => {
                    let e: $crate::error::Error = e;
                    if e.is_rate_limited() && _attempt < $crate::sync::rate_limit::MAX_RETRIES {
                        $crate::sync::rate_limit::backoff_sleep(_attempt).await;
                        _attempt += 1;
                    } else {
                        break Err(e);
                    }
                }
            }
        }
    }};
}

pub(crate) use retry_api;

/// Sleep for the backoff duration (for use in non-macro contexts).
pub async fn backoff_sleep(attempt: u32) {
    let wait = backoff_delay(attempt);
    log::warn!(
        "Rate limited (429). Waiting {}s before retry {}/{}",
        wait.as_secs(),
        attempt + 1,
        MAX_RETRIES
    );
    tokio::time::sleep(wait).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(9), Duration::from_secs(4));
    }

    async fn flaky(calls: &AtomicU32, fail_times: u32, status: u16) -> Result<&'static str> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < fail_times {
            Err(Error::Api {
                status,
                message: "nope".into(),
            })
        } else {
            Ok("ok")
        }
    }

    #[tokio::test]
    async fn test_retries_429_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_api!(flaky(&calls, 1, 429));
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result = retry_api!(flaky(&calls, 10, 429));
        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_api!(flaky(&calls, 1, 500));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
