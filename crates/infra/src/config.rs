//! Write queue configuration.
//!
//! Every knob has a default; `from_env` overlays `SYNDICATE_QUEUE_*` variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Configuration rejected by [`WriteQueueConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Tuning for the write-serialization queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteQueueConfig {
    /// Most operations committed in one transaction.
    pub batch_size: usize,
    /// Scheduler tick period.
    pub processing_interval: Duration,
    /// Retry budget applied when a request does not carry its own.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on every further retry.
    pub base_backoff: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
    /// Hard cap on outstanding (pending + in-flight) operations.
    pub max_queue_size: usize,
    /// Scheduler cycles an operation may wait before it jumps the priority order.
    pub starvation_cycle_threshold: u64,
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            processing_interval: Duration::from_millis(100),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            max_queue_size: 10_000,
            starvation_cycle_threshold: 50,
        }
    }
}

impl WriteQueueConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_processing_interval(mut self, interval: Duration) -> Self {
        self.processing_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    pub fn with_starvation_cycle_threshold(mut self, cycles: u64) -> Self {
        self.starvation_cycle_threshold = cycles;
        self
    }

    /// Defaults overlaid with `SYNDICATE_QUEUE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            batch_size: parse_or(&lookup, "SYNDICATE_QUEUE_BATCH_SIZE", defaults.batch_size),
            processing_interval: Duration::from_millis(parse_or(
                &lookup,
                "SYNDICATE_QUEUE_INTERVAL_MS",
                millis(defaults.processing_interval),
            )),
            max_retries: parse_or(&lookup, "SYNDICATE_QUEUE_MAX_RETRIES", defaults.max_retries),
            base_backoff: Duration::from_millis(parse_or(
                &lookup,
                "SYNDICATE_QUEUE_BASE_BACKOFF_MS",
                millis(defaults.base_backoff),
            )),
            max_backoff: Duration::from_millis(parse_or(
                &lookup,
                "SYNDICATE_QUEUE_MAX_BACKOFF_MS",
                millis(defaults.max_backoff),
            )),
            max_queue_size: parse_or(
                &lookup,
                "SYNDICATE_QUEUE_MAX_SIZE",
                defaults.max_queue_size,
            ),
            starvation_cycle_threshold: parse_or(
                &lookup,
                "SYNDICATE_QUEUE_STARVATION_CYCLES",
                defaults.starvation_cycle_threshold,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::invalid("max_queue_size", "must be at least 1"));
        }
        if self.processing_interval.is_zero() {
            return Err(ConfigError::invalid("processing_interval", "must be non-zero"));
        }
        if self.base_backoff > self.max_backoff {
            return Err(ConfigError::invalid(
                "base_backoff",
                format!(
                    "{:?} exceeds max_backoff {:?}",
                    self.base_backoff, self.max_backoff
                ),
            ));
        }
        Ok(())
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    key,
                    value = %raw,
                    error = %err,
                    "ignoring unparsable setting; using default"
                );
                default
            }
        },
    }
}
