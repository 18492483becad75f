//! Bounded retry-with-delay.
//!
//! Key fetch and proof polling share one policy type. Both loops terminate
//! after a fixed number of attempts, not after a wall-clock deadline.

use std::future::Future;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Sleep before the first attempt as well (polling), rather than only
    /// between attempts (retrying).
    pub delay_first: bool,
}

impl RetryPolicy {
    /// 10 attempts, 500 ms apart.
    pub const KEY_FETCH: Self = Self::new(10, Duration::from_millis(500));

    /// 30 fetches, each preceded by a 2 s wait.
    pub const PROOF_POLL: Self = Self::new(30, Duration::from_secs(2)).delay_first();

    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            delay_first: false,
        }
    }

    pub const fn delay_first(mut self) -> Self {
        self.delay_first = true;
        self
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if self.delay_first || attempt > 1 {
                tokio::time::sleep(self.delay).await;
            }
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e),
            }
        }
        Err(RetryExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: Option<E>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result: Result<(), _> = RetryPolicy::KEY_FETCH
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("unavailable")
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 10);
        assert_eq!(exhausted.last_error, Some("unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        // Nine gaps between ten attempts.
        assert_eq!(start.elapsed(), Duration::from_millis(4_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_first_success() {
        let result = RetryPolicy::KEY_FETCH
            .run(|attempt| async move {
                if attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_sleeps_before_each_attempt() {
        let start = Instant::now();
        let result = RetryPolicy::new(3, Duration::from_secs(2))
            .delay_first()
            .run(|attempt| async move { if attempt == 1 { Ok(()) } else { Err(()) } })
            .await;
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::PROOF_POLL.max_attempts, 30);
        assert!(RetryPolicy::PROOF_POLL.delay_first);
        assert!(!RetryPolicy::KEY_FETCH.delay_first);
    }
}
