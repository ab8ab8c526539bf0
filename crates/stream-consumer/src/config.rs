//! Consumer configuration loaded from environment variables.

use std::time::Duration;

/// Poll-loop and retry configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `REDIS_URL` — broker address (default: `"redis://127.0.0.1:6379"`)
/// - `STREAM_KEY` — source stream (default: `"order-status-events"`)
/// - `DLQ_STREAM_KEY` — dead-letter stream (default: `"order-status-dlq"`)
/// - `CONSUMER_GROUP` — group name (default: `"status-projector"`)
/// - `CONSUMER_NAME` — this instance's name within the group
/// - `READ_COUNT` — max records per batched read (default: 10)
/// - `BLOCK_MS` — blocking read bound (default: 5000)
/// - `POLL_INTERVAL_MS` — loop cadence (default: 10000)
/// - `MAX_ATTEMPTS` — pipeline retries per delivery (default: 3)
/// - `MAX_DELIVERIES` — redelivery cycles before exhaustion (default: 5)
/// - `ORIGIN_SERVICES` — comma-separated origin producers
///   (default: `"trade-capture"`)
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub redis_url: String,
    pub stream: String,
    pub dlq_stream: String,
    pub group: String,
    pub consumer_name: String,
    pub read_count: usize,
    pub block: Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub max_deliveries: u64,
    pub origin_services: Vec<String>,
}

impl ConsumerConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            stream: env_or("STREAM_KEY", defaults.stream),
            dlq_stream: env_or("DLQ_STREAM_KEY", defaults.dlq_stream),
            group: env_or("CONSUMER_GROUP", defaults.group),
            consumer_name: env_or("CONSUMER_NAME", defaults.consumer_name),
            read_count: env_parsed("READ_COUNT", defaults.read_count),
            block: Duration::from_millis(env_parsed(
                "BLOCK_MS",
                defaults.block.as_millis() as u64,
            )),
            poll_interval: Duration::from_millis(env_parsed(
                "POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            max_attempts: env_parsed("MAX_ATTEMPTS", defaults.max_attempts),
            max_deliveries: env_parsed("MAX_DELIVERIES", defaults.max_deliveries),
            origin_services: std::env::var("ORIGIN_SERVICES")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.origin_services),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "order-status-events".to_string(),
            dlq_stream: "order-status-dlq".to_string(),
            group: "status-projector".to_string(),
            consumer_name: format!("status-consumer-{}", std::process::id()),
            read_count: 10,
            block: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            max_attempts: 3,
            max_deliveries: 5,
            origin_services: vec!["trade-capture".to_string()],
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
