//! Shared HTTP plumbing for the built-in providers: throttling, retry and
//! response classification.

use crate::errors::ProviderError;
use backoff::{future::retry, ExponentialBackoffBuilder};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Per-provider token bucket
pub type ProviderRateLimiter = DefaultDirectRateLimiter;

pub fn create_rate_limiter(requests_per_second: u32) -> Arc<ProviderRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rate)))
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Permanent failures and the failure after `max_retries` retries are returned as-is.
pub async fn with_retry<T, F, Fut>(provider: &str, max_retries: u32, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(250))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(8)))
        .build();

    let mut attempt = 0u32;
    retry(policy, || {
        attempt += 1;
        let current = attempt;
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && current <= max_retries => {
                    tracing::warn!(
                        provider = %provider,
                        attempt = current,
                        max_retries,
                        error = %e,
                        "Provider request failed, retrying"
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}

/// Send a request and decode a JSON body.
///
/// 404 maps to `Ok(None)`: the upstream has no data for the query.
pub async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<Option<T>, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_http(provider, &e))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body));
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| ProviderError::from_http(provider, &e))
}

pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("HTTP {}: {}", status, snippet.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::transient(provider, message)
    } else {
        ProviderError::permanent(provider, message)
    }
}
