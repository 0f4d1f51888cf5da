use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Used when the configured qps is zero.
pub const DEFAULT_QPS: f32 = 5.0;
/// Used when the configured burst is zero.
pub const DEFAULT_BURST: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("burst is required to be greater than 0 when qps is set to greater than 0")]
    InvalidBurst,
}

#[derive(Debug)]
struct State {
    /// Can go negative, each missing token is a request already waiting.
    tokens: f64,
    last: Instant,
}

/// A token bucket holding at most `burst` tokens, refilled at `qps` tokens
/// per second. The bucket starts full.
#[derive(Debug)]
pub struct TokenBucket {
    qps: f32,
    burst: u32,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(qps: f32, burst: u32) -> Self {
        TokenBucket {
            qps,
            burst,
            state: Mutex::new(State {
                tokens: f64::from(burst),
                last: Instant::now(),
            }),
        }
    }

    /// Builds the limiter for a client from its configured `qps` and `burst`.
    ///
    /// Zero values select [`DEFAULT_QPS`] and [`DEFAULT_BURST`], a negative
    /// qps disables rate limiting.
    pub fn from_config(qps: f32, burst: i32) -> Result<Option<TokenBucket>, Error> {
        if qps > 0.0 && burst <= 0 {
            return Err(Error::InvalidBurst);
        }

        let qps = if qps == 0.0 { DEFAULT_QPS } else { qps };
        let burst = if burst == 0 { DEFAULT_BURST } else { burst };
        if qps < 0.0 {
            return Ok(None);
        }

        Ok(Some(TokenBucket::new(qps, u32::try_from(burst).unwrap_or(1))))
    }

    pub fn qps(&self) -> f32 {
        self.qps
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    fn refill(&self, state: &mut State, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * f64::from(self.qps)).min(f64::from(self.burst));
        state.last = now;
    }

    /// Takes a token, returning how long the caller has to wait before it
    /// may proceed.
    fn reserve(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        self.refill(&mut state, now);
        state.tokens -= 1.0;

        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            // a tiny qps can push the wait past what Duration represents
            Duration::try_from_secs_f64(-state.tokens / f64::from(self.qps))
                .unwrap_or(Duration::MAX)
        }
    }

    /// Takes a token if one is available right now.
    pub fn try_accept(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        self.refill(&mut state, now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Waits until a token is available and takes it.
    pub async fn accept(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limiter = TokenBucket::from_config(0.0, 0).unwrap().unwrap();
        assert_eq!(limiter.qps(), DEFAULT_QPS);
        assert_eq!(limiter.burst(), DEFAULT_BURST as u32);

        let limiter = TokenBucket::from_config(0.0, 3).unwrap().unwrap();
        assert_eq!(limiter.qps(), DEFAULT_QPS);
        assert_eq!(limiter.burst(), 3);
    }

    #[test]
    fn explicit() {
        let limiter = TokenBucket::from_config(20.0, 50).unwrap().unwrap();
        assert_eq!(limiter.qps(), 20.0);
        assert_eq!(limiter.burst(), 50);
    }

    #[test]
    fn disabled() {
        assert!(TokenBucket::from_config(-1.0, 0).unwrap().is_none());
        assert!(TokenBucket::from_config(-1.0, 10).unwrap().is_none());
    }

    #[test]
    fn burst_required() {
        assert!(matches!(
            TokenBucket::from_config(10.0, 0),
            Err(Error::InvalidBurst)
        ));
        assert!(matches!(
            TokenBucket::from_config(10.0, -1),
            Err(Error::InvalidBurst)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn try_accept() {
        let limiter = TokenBucket::new(1.0, 3);
        for _ in 0..3 {
            assert!(limiter.try_accept());
        }
        assert!(!limiter.try_accept());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_accept());
        assert!(!limiter.try_accept());
    }

    #[tokio::test(start_paused = true)]
    async fn accept_waits_for_refill() {
        let limiter = TokenBucket::new(2.0, 2);
        let start = Instant::now();

        limiter.accept().await;
        limiter.accept().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // the bucket is empty, the third token arrives after 1/qps
        limiter.accept().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(510), "{elapsed:?}");

        // and the fourth is queued behind it
        limiter.accept().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(990), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_qps() {
        let limiter = TokenBucket::from_config(1e-30, 1).unwrap().unwrap();

        limiter.accept().await;
        assert_eq!(limiter.reserve(), Duration::MAX);

        // the next token is out of reach, but waiting for it must not panic
        let waited = tokio::time::timeout(Duration::from_secs(1), limiter.accept()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_caps_at_burst() {
        let limiter = TokenBucket::new(100.0, 2);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(limiter.try_accept());
        assert!(limiter.try_accept());
        assert!(!limiter.try_accept());
    }
}
