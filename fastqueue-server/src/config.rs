use std::env;

/// Clamp bounds for one of the numeric queue attributes, loaded from the environment.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    /// Smallest value accepted.
    pub min: i32,
    /// Largest value accepted.
    pub max: i32,
}

impl Range {
    /// `true` if `value` falls within `[min, max]` inclusive.
    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Process-wide configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind the HTTP server on.
    pub server_host:                 String,
    /// Port to bind the HTTP server on.
    pub server_port:                 u16,
    /// Number of tokio worker threads; defaults to the number of available CPUs.
    pub server_num_workers:          usize,
    /// Period between cleanup scheduler ticks.
    pub queue_cleanup_interval_seconds: u64,
    /// Valid range for `ack_deadline_seconds`.
    pub ack_deadline_range:          Range,
    /// Valid range for `message_retention_seconds`.
    pub message_retention_range:     Range,
    /// Valid range for `message_max_deliveries`.
    pub message_max_deliveries_range: Range,
    /// Valid range for `delivery_delay_seconds`.
    pub delivery_delay_range:        Range,
    /// Whether a (currently stubbed) Prometheus metrics endpoint should be exposed.
    pub enable_prometheus_metrics:   bool,
    /// Postgres connection string.
    pub database_url:                String,
    /// Minimum number of idle connections the pool keeps warm.
    pub min_pool_size:                u16,
    /// Maximum number of connections the pool will open.
    pub max_pool_size:                u16,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment, falling back to the documented defaults for
    /// everything except `DATABASE_URL`, which is required.
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let max_pool_size = env_parse_or("FASTQUEUE_MAX_POOL_SIZE", 10);
        let min_pool_size = env_parse_or("FASTQUEUE_MIN_POOL_SIZE", max_pool_size).min(max_pool_size);

        Self {
            server_host:                 env_or("FASTQUEUE_SERVER_HOST", "0.0.0.0"),
            server_port:                 env_parse_or("FASTQUEUE_SERVER_PORT", 7843),
            server_num_workers:          env_parse_or("FASTQUEUE_SERVER_NUM_WORKERS", num_cpus()),
            queue_cleanup_interval_seconds: env_parse_or("FASTQUEUE_QUEUE_CLEANUP_INTERVAL_SECONDS", 60),
            ack_deadline_range:          Range {
                min: env_parse_or("FASTQUEUE_MIN_ACK_DEADLINE_SECONDS", 1),
                max: env_parse_or("FASTQUEUE_MAX_ACK_DEADLINE_SECONDS", 600),
            },
            message_retention_range:     Range {
                min: env_parse_or("FASTQUEUE_MIN_MESSAGE_RETENTION_SECONDS", 600),
                max: env_parse_or("FASTQUEUE_MAX_MESSAGE_RETENTION_SECONDS", 1_209_600),
            },
            message_max_deliveries_range: Range {
                min: env_parse_or("FASTQUEUE_MIN_MESSAGE_MAX_DELIVERIES", 1),
                max: env_parse_or("FASTQUEUE_MAX_MESSAGE_MAX_DELIVERIES", 1000),
            },
            delivery_delay_range:        Range {
                min: env_parse_or("FASTQUEUE_MIN_DELIVERY_DELAY_SECONDS", 1),
                max: env_parse_or("FASTQUEUE_MAX_DELIVERY_DELAY_SECONDS", 900),
            },
            enable_prometheus_metrics:   env_parse_or("FASTQUEUE_ENABLE_PROMETHEUS_METRICS", false),
            database_url,
            min_pool_size,
            max_pool_size,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn range_contains() {
        let range = Range { min: 1, max: 10 };
        assert!(range.contains(1));
        assert!(range.contains(10));
        assert!(!range.contains(0));
        assert!(!range.contains(11));
    }

    #[test]
    fn defaults_without_overrides() {
        env::set_var("DATABASE_URL", "postgres://localhost/fastqueue_test_config");
        env::remove_var("FASTQUEUE_SERVER_PORT");
        let config = Config::from_env();
        assert_eq!(config.server_port, 7843);
        assert_eq!(config.ack_deadline_range.min, 1);
        assert_eq!(config.ack_deadline_range.max, 600);
    }
}
