//! Engine configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use playbymail_domain::ImageBounds;

/// Retry behaviour for background jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts before a job is dead-lettered (the first run included).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the exponential delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) applied around the delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1000,
            max_delay_ms: 300_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay_ms`, before jitter.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms)
    }

    /// Half-width of the jitter window for a delay.
    pub fn jitter_range_ms(&self, delay_ms: u64) -> i64 {
        (delay_ms as f64 * self.jitter_factor.clamp(0.0, 1.0)) as i64
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Postgres connection string. Absent means the in-memory store.
    pub database_url: Option<String>,
    /// SQLite file backing the job queue.
    pub queue_db: String,
    pub vision_url: String,
    pub renderer_url: String,
    pub directory_url: String,
    pub scan_timeout: Duration,
    pub render_timeout: Duration,
    pub directory_timeout: Duration,
    pub retry: RetryConfig,
    pub worker_poll: Duration,
    pub deadline_sweep: Duration,
    pub image_bounds: ImageBounds,
    pub cors_allowed_origins: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            database_url: None,
            queue_db: "queues.db".to_string(),
            vision_url: "http://localhost:8090".to_string(),
            renderer_url: "http://localhost:8091".to_string(),
            directory_url: "http://localhost:8092".to_string(),
            scan_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(60),
            directory_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            worker_poll: Duration::from_millis(500),
            deadline_sweep: Duration::from_secs(60),
            image_bounds: ImageBounds::default(),
            cors_allowed_origins: None,
        }
    }
}

impl EngineConfig {
    /// Read every setting from the process environment, falling back to
    /// defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let env = Env(lookup);

        let bounds = defaults.image_bounds;
        let image_bounds = ImageBounds {
            min_width: env.parsed("IMAGE_MIN_WIDTH", bounds.min_width),
            min_height: env.parsed("IMAGE_MIN_HEIGHT", bounds.min_height),
            max_width: env.parsed("IMAGE_MAX_WIDTH", bounds.max_width),
            max_height: env.parsed("IMAGE_MAX_HEIGHT", bounds.max_height),
            recommended_width: env.parsed("IMAGE_RECOMMENDED_WIDTH", bounds.recommended_width),
            recommended_height: env.parsed("IMAGE_RECOMMENDED_HEIGHT", bounds.recommended_height),
        };
        let image_bounds = match image_bounds.validate() {
            Ok(()) => image_bounds,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring inconsistent image bounds");
                bounds
            }
        };

        let retry = RetryConfig {
            max_attempts: env.parsed("JOB_MAX_ATTEMPTS", defaults.retry.max_attempts).max(1),
            base_delay_ms: env.parsed("JOB_BASE_DELAY_MS", defaults.retry.base_delay_ms),
            max_delay_ms: env.parsed("JOB_MAX_DELAY_MS", defaults.retry.max_delay_ms),
            jitter_factor: defaults.retry.jitter_factor,
        };

        let server_port = match env.get("SERVER_PORT") {
            Some(_) => env.parsed("SERVER_PORT", defaults.server_port),
            None => env.parsed("PORT", defaults.server_port),
        };

        Self {
            server_host: env.get("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port,
            database_url: env.get("DATABASE_URL"),
            queue_db: env.get("QUEUE_DB").unwrap_or(defaults.queue_db),
            vision_url: env.get("VISION_URL").unwrap_or(defaults.vision_url),
            renderer_url: env.get("RENDERER_URL").unwrap_or(defaults.renderer_url),
            directory_url: env.get("DIRECTORY_URL").unwrap_or(defaults.directory_url),
            scan_timeout: Duration::from_secs(env.parsed("SCAN_TIMEOUT_SECS", 30u64)),
            render_timeout: Duration::from_secs(env.parsed("RENDER_TIMEOUT_SECS", 60u64)),
            directory_timeout: Duration::from_secs(env.parsed("DIRECTORY_TIMEOUT_SECS", 10u64)),
            retry,
            worker_poll: Duration::from_millis(env.parsed("WORKER_POLL_MS", 500u64)),
            deadline_sweep: Duration::from_secs(env.parsed("DEADLINE_SWEEP_SECS", 60u64)),
            image_bounds,
            cors_allowed_origins: env.get("CORS_ALLOWED_ORIGINS"),
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Trimmed value; blank counts as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        parse_or(self.get(key), key, default)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Unparsable setting, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> EngineConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]);
        assert_eq!(config.server_port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.queue_db, "queues.db");
        assert_eq!(config.image_bounds, ImageBounds::default());
    }

    #[test]
    fn values_are_read_and_parsed() {
        let config = config_from(&[
            ("SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/pbm"),
            ("SCAN_TIMEOUT_SECS", "5"),
            ("JOB_MAX_ATTEMPTS", "3"),
            ("IMAGE_MIN_WIDTH", "600"),
        ]);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/pbm"));
        assert_eq!(config.scan_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.image_bounds.min_width, 600);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config_from(&[("SERVER_PORT", "eighty"), ("DATABASE_URL", "  ")]);
        assert_eq!(config.server_port, 3000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn inconsistent_bounds_are_ignored() {
        let config = config_from(&[("IMAGE_MIN_WIDTH", "9000")]);
        assert_eq!(config.image_bounds, ImageBounds::default());
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };
        assert_eq!(retry.backoff_ms(1), 100);
        assert_eq!(retry.backoff_ms(2), 200);
        assert_eq!(retry.backoff_ms(4), 800);
        assert_eq!(retry.backoff_ms(5), 1000);
        assert_eq!(retry.backoff_ms(60), 1000);
    }
}
