use anyhow::{anyhow, Result};
use rand::Rng;
use serde_json::json;
use std::future::Future;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::logging::{log, obj, v_str, Domain, Level};

/// Retry configuration
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            jitter_factor: 0.3,
        }
    }
}

impl From<&Config> for RetryConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.retry_max,
            base_delay_ms: cfg.retry_base_ms,
            ..Default::default()
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with ±jitter_factor jitter
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let jitter_range = clamped * self.jitter_factor;
        let jitter: f64 = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_delay = (clamped + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// Retry a fallible async operation with exponential backoff.
///
/// Errors for which `retryable` returns false are returned immediately.
pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    retryable: fn(&anyhow::Error) -> bool,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !retryable(&e) {
                    return Err(e);
                }
                if attempt < config.max_retries {
                    let delay = config.delay_for_attempt(attempt);
                    log(
                        Level::Warn,
                        Domain::Client,
                        "retry",
                        obj(&[
                            ("operation", v_str(operation_name)),
                            ("attempt", json!(attempt + 1)),
                            ("max_attempts", json!(config.max_retries + 1)),
                            ("error", v_str(&e.to_string())),
                            ("delay_ms", json!(delay.as_millis() as u64)),
                        ]),
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("retry_async exhausted without error")))
}

/// Timeouts, rate limiting and any 5xx from the training service or the
/// gateway in front of it.
pub fn is_retryable_http_error(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

pub fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn always(_: &anyhow::Error) -> bool {
        true
    }

    fn never(_: &anyhow::Error) -> bool {
        false
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(1000)); // clamped
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_http_error(503));
        assert!(is_retryable_http_error(429));
        assert!(is_retryable_http_error(599));
        assert!(!is_retryable_http_error(400));
        assert!(!is_retryable_http_error(404));
    }

    #[test]
    fn test_config_from_env_settings() {
        let cfg = Config {
            retry_max: 5,
            retry_base_ms: 50,
            ..Default::default()
        };
        let retry = RetryConfig::from(&cfg);
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.base_delay_ms, 50);
        assert_eq!(retry.max_delay_ms, RetryConfig::default().max_delay_ms);
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let config = RetryConfig::default();
        let result: Result<i32> = retry_async(&config, "test", always, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventual_success() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            ..Default::default()
        };

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<i32> = retry_async(&config, "test", always, || {
            let c = counter_clone.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("not yet"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let config = RetryConfig::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<i32> = retry_async(&config, "test", never, || {
            let c = counter_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("bad request"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
