//! Bootstrap utilities for order-ingest binaries.

use std::future::Future;

use backon::BackoffBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the ORDERS_LOG environment variable.
///
/// Defaults to "info" level if ORDERS_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run `connect` until it succeeds or the backoff is exhausted.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "broker")
/// * `backoff` - Delay schedule between attempts; its length bounds the retries
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connected client on success, or the last error once the backoff runs out.
pub async fn connect_with_retry<T, E, F, Fut, B>(
    service_name: &str,
    backoff: B,
    mut connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: BackoffBuilder,
{
    let mut delays = backoff.build();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match connect().await {
            Ok(client) => {
                info!(service = %service_name, attempt, "Connected");
                return Ok(client);
            }
            Err(e) => match delays.next() {
                Some(delay) => {
                    warn!(
                        service = %service_name,
                        attempt,
                        error = %e,
                        retry_in_ms = %delay.as_millis(),
                        "Connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        service = %service_name,
                        attempts = attempt,
                        error = %e,
                        "Connection failed, giving up"
                    );
                    return Err(e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use backon::ExponentialBuilder;

    use super::*;

    fn fast_backoff(times: usize) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
            .with_max_times(times)
    }

    #[tokio::test]
    async fn test_connect_with_retry_eventually_succeeds() {
        let attempts = AtomicUsize::new(0);
        let result: Result<&str, String> = connect_with_retry("test", fast_backoff(5), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("refused".to_string())
            } else {
                Ok("connected")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), String> = connect_with_retry("test", fast_backoff(2), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("refused".to_string())
        })
        .await;

        assert_eq!(result.unwrap_err(), "refused");
        // First attempt plus one per backoff step
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
