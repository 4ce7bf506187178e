use std::time::Duration;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the API that fronts the training service.
    pub api_base: String,
    /// Time each workflow step stays on screen while playing.
    pub step_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub retry_max: u32,
    pub retry_base_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000".to_string(),
            step_interval_ms: 3000,
            http_timeout_secs: 60,
            retry_max: 3,
            retry_base_ms: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: std::env::var("TRAIN_API_BASE").unwrap_or(d.api_base),
            step_interval_ms: std::env::var("STEP_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.step_interval_ms),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.http_timeout_secs),
            retry_max: std::env::var("RETRY_MAX").ok().and_then(|v| v.parse().ok()).unwrap_or(d.retry_max),
            retry_base_ms: std::env::var("RETRY_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.retry_base_ms),
        }
    }

    pub fn step_interval(&self) -> Duration {
        // A zero interval would spin the timer task.
        Duration::from_millis(self.step_interval_ms.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_console() {
        let cfg = Config::default();
        assert_eq!(cfg.step_interval(), Duration::from_secs(3));
        assert_eq!(cfg.api_base, "http://localhost:5000");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let cfg = Config {
            step_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(cfg.step_interval(), Duration::from_millis(1));
    }
}
