//! Service configuration: backends, retry, throttle, intake and recovery.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::WorkerPoolConfig;
use crate::core::{IntakeSettings, RetryPolicy, ThrottleSettings};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "DISPATCH_";

/// Work queue backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// In-memory queue for development/testing.
    InMemory,
    /// JSONL-journaled queue.
    File {
        /// Journal file.
        path: PathBuf,
    },
}

/// Message store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store.
    InMemory,
    /// Append-only JSONL log.
    File {
        /// Log file.
        path: PathBuf,
    },
}

/// Retry policy for failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff after the first failure.
    pub base_delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay_ms: cfg.base_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
        }
    }
}

/// Throttle timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Lifetime of an hourly counter beyond its hour.
    pub expiry_buffer_secs: u64,
    /// Spacing lease time-to-live.
    pub lease_ttl_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: 600,
            lease_ttl_ms: 30_000,
        }
    }
}

impl From<ThrottleConfig> for ThrottleSettings {
    fn from(cfg: ThrottleConfig) -> Self {
        Self {
            expiry_buffer: Duration::from_secs(cfg.expiry_buffer_secs),
            lease_ttl: Duration::from_millis(cfg.lease_ttl_ms),
        }
    }
}

/// Intake tuning and request defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Records per store write.
    pub chunk_size: usize,
    /// Hourly cap when a request omits one.
    pub default_hourly_limit: i64,
    /// Per-recipient delay when a request omits one.
    pub default_delay_seconds: i64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        let settings = IntakeSettings::default();
        Self {
            chunk_size: settings.chunk_size,
            default_hourly_limit: settings.default_hourly_limit,
            default_delay_seconds: settings.default_delay_seconds,
        }
    }
}

impl From<IntakeConfig> for IntakeSettings {
    fn from(cfg: IntakeConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            default_hourly_limit: cfg.default_hourly_limit,
            default_delay_seconds: cfg.default_delay_seconds,
        }
    }
}

/// Reconciliation sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Run the sweep when the service starts.
    pub on_startup: bool,
    /// Age after which a `PROCESSING` record with no queue entry is stuck.
    pub stale_after_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            on_startup: true,
            stale_after_ms: 300_000,
        }
    }
}

/// Root service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Worker pool.
    pub pool: WorkerPoolConfig,
    /// Work queue backend.
    pub queue: QueueBackendConfig,
    /// Message store backend.
    pub store: StoreBackendConfig,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Throttle timing.
    pub throttle: ThrottleConfig,
    /// Intake tuning.
    pub intake: IntakeConfig,
    /// Reconciliation.
    pub recovery: RecoveryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPoolConfig::default(),
            queue: QueueBackendConfig::InMemory,
            store: StoreBackendConfig::InMemory,
            retry: RetryConfig::default(),
            throttle: ThrottleConfig::default(),
            intake: IntakeConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        if let QueueBackendConfig::File { path } = &self.queue {
            if path.as_os_str().is_empty() {
                return Err("queue file path must not be empty".into());
            }
        }
        if let StoreBackendConfig::File { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err("store file path must not be empty".into());
            }
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be greater than 0".into());
        }
        if self.retry.base_delay_ms == 0 {
            return Err("retry.base_delay_ms must be greater than 0".into());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.base_delay_ms".into());
        }
        if self.throttle.lease_ttl_ms == 0 {
            return Err("throttle.lease_ttl_ms must be greater than 0".into());
        }
        if self.intake.chunk_size == 0 {
            return Err("intake.chunk_size must be greater than 0".into());
        }
        if self.intake.default_hourly_limit < 1 {
            return Err("intake.default_hourly_limit must be >= 1".into());
        }
        if self.intake.default_delay_seconds < 0 {
            return Err("intake.default_delay_seconds must be >= 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `DISPATCH_*` variables, after loading a `.env`
    /// file if one is present.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from `lookup`, which maps a full variable name
    /// (e.g. `DISPATCH_WORKER_COUNT`) to its value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_parsed(&get, "WORKER_COUNT", &mut self.pool.worker_count)?;
        override_parsed(&get, "THREAD_STACK_SIZE", &mut self.pool.thread_stack_size)?;
        override_parsed(&get, "SHUTDOWN_TIMEOUT_MS", &mut self.pool.shutdown_timeout_ms)?;

        if let Some(path) = get("QUEUE_PATH") {
            self.queue = QueueBackendConfig::File { path: path.into() };
        }
        if let Some(path) = get("STORE_PATH") {
            self.store = StoreBackendConfig::File { path: path.into() };
        }

        override_parsed(&get, "MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        override_parsed(&get, "BASE_DELAY_MS", &mut self.retry.base_delay_ms)?;
        override_parsed(&get, "MAX_DELAY_MS", &mut self.retry.max_delay_ms)?;

        override_parsed(&get, "EXPIRY_BUFFER_SECS", &mut self.throttle.expiry_buffer_secs)?;
        override_parsed(&get, "LEASE_TTL_MS", &mut self.throttle.lease_ttl_ms)?;

        override_parsed(&get, "CHUNK_SIZE", &mut self.intake.chunk_size)?;
        override_parsed(&get, "DEFAULT_HOURLY_LIMIT", &mut self.intake.default_hourly_limit)?;
        override_parsed(&get, "DEFAULT_DELAY_SECONDS", &mut self.intake.default_delay_seconds)?;

        override_parsed(&get, "RECOVER_ON_STARTUP", &mut self.recovery.on_startup)?;
        override_parsed(&get, "STALE_AFTER_MS", &mut self.recovery.stale_after_ms)?;
        Ok(())
    }
}

fn override_parsed<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = get(name) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))?;
    }
    Ok(())
}
