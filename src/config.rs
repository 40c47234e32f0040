/*!
 * Pipeline Configuration
 * Deployment-facing knobs for sampling, batching, and logging
 */

use crate::core::limits::{
    DEFAULT_BATCH_MAX_SIZE, DEFAULT_BATCH_TIMEOUT, DEFAULT_COLLECTION_INTERVAL,
    DEFAULT_MAILBOX_CAPACITY, DEV_SAMPLE_RATE, PROD_SAMPLE_RATE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deployment environment, selecting the sampler profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Head-sampling rate for this profile
    #[inline]
    pub fn sample_rate(&self) -> f64 {
        match self {
            Environment::Development => DEV_SAMPLE_RATE,
            Environment::Production => PROD_SAMPLE_RATE,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Minimum severity emitted by the logging sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service identity stamped on every exported batch
    pub service_name: String,
    pub service_version: String,
    pub environment: Environment,

    /// Collector the exporters deliver to
    pub collector_endpoint: String,

    /// Export pipeline tuning
    pub batch_max_size: usize,
    pub batch_timeout: Duration,
    pub mailbox_capacity: usize,

    /// Metric collection window length
    pub metric_collection_interval: Duration,

    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            service_version: "1.0.0".to_string(),
            environment: Environment::Development,
            collector_endpoint: "localhost:4318".to_string(),
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            metric_collection_interval: DEFAULT_COLLECTION_INTERVAL,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized variables: `SERVICE_NAME`, `ENVIRONMENT`, `OTEL_ENDPOINT`,
    /// `LOG_LEVEL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("SERVICE_NAME") {
            if !name.is_empty() {
                config.service_name = name;
            }
        }
        if let Ok(env) = std::env::var("ENVIRONMENT") {
            config.environment = Environment::parse(&env);
        }
        if let Ok(endpoint) = std::env::var("OTEL_ENDPOINT") {
            if !endpoint.is_empty() {
                config.collector_endpoint = endpoint;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = LogLevel::parse(&level);
        }
        config
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.environment.sample_rate()
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_batching(mut self, max_size: usize, timeout: Duration) -> Self {
        self.batch_max_size = max_size;
        self.batch_timeout = timeout;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_collection_interval(mut self, interval: Duration) -> Self {
        self.metric_collection_interval = interval;
        self
    }
}
