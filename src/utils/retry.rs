//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;
use reqwest::StatusCode;

/// Backoff for broker connection at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: `max_times`
/// - Jitter enabled
pub fn connection_backoff(max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(max_times)
        .with_jitter()
}

/// Backoff for reconnecting after the broker stream drops.
///
/// Unbounded; the consumer stops retrying only when cancelled.
pub fn reconnect_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(30))
        .without_max_times()
        .with_jitter()
}

/// Backoff for product lookups.
///
/// - Min delay: 50ms
/// - Max delay: 1s
/// - Max attempts: `max_times`
/// - Jitter enabled
pub fn lookup_backoff(max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(max_times)
        .with_jitter()
}

/// Backoff for publishing order events.
pub fn publish_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(5)
        .with_jitter()
}

/// Determines if an HTTP status from the product service is worth retrying.
///
/// Retryable: 429 (rate limit) and 5xx. A 404 is an answer, not a failure.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Determines if a transport error is worth retrying (timeouts, refused connections).
pub fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
