//! Rate limiting middleware using token bucket algorithm

use axum::{extract::Request, middleware::Next, response::Response};
use clinsight_common::errors::AppError;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Shared limiter plus the per-second rate it was built with
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

impl RateLimit {
    /// Zero values are raised to one; a zero burst falls back to the rate
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);

        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
            requests_per_second: rate.get(),
        }
    }

    pub fn check(&self) -> Result<(), AppError> {
        self.limiter.check().map_err(|_| AppError::RateLimited {
            limit: self.requests_per_second,
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    request: Request,
    next: Next,
    limit: RateLimit,
) -> Result<Response, AppError> {
    if let Err(e) = limit.check() {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limit = RateLimit::new(100, 200);
        tokio_test::assert_ok!(limit.check());
    }

    #[test]
    fn test_burst_exhaustion() {
        let limit = RateLimit::new(1, 2);
        tokio_test::assert_ok!(limit.check());
        tokio_test::assert_ok!(limit.check());

        match limit.check() {
            Err(AppError::RateLimited { limit }) => assert_eq!(limit, 1),
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_settings_are_clamped() {
        let limit = RateLimit::new(0, 0);
        assert_eq!(limit.requests_per_second, 1);
        assert!(limit.check().is_ok());
        assert!(limit.check().is_err());
    }

    #[test]
    fn test_clones_share_bucket() {
        let limit = RateLimit::new(1, 1);
        let clone = limit.clone();
        assert!(limit.check().is_ok());
        assert!(clone.check().is_err());
    }
}
