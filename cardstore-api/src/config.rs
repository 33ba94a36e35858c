//! Service Configuration Module
//!
//! Runtime settings for the HTTP service, the card cache, and the
//! idempotency store. Everything is read from `CARDSTORE_*` environment
//! variables with development-friendly defaults; a variable that is set but
//! unparsable is an error rather than a silent fallback.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use cardstore_core::ConfigError;
use cardstore_storage::{
    BatchConfig, CacheConfig, IdempotencyFailureMode, RetrievalConfig, DEFAULT_IDEMPOTENCY_TTL,
    DEFAULT_LEASE_TTL,
};

// ============================================================================
// ENV PARSING
// ============================================================================

/// Parse `key` through `lookup`, falling back to `default` when unset.
pub(crate) fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Maximum cached cards per process.
    pub cache_max_size: usize,
    /// Bound on every store call made by the services.
    pub store_timeout: Duration,
    /// How long a completed batch stays replayable.
    pub idempotency_ttl: Duration,
    /// How long an unfinished reservation blocks its key.
    pub idempotency_lease: Duration,
    pub idempotency_failure_mode: IdempotencyFailureMode,
    /// Interval of the expired-key sweep. `None` disables it.
    pub purge_interval: Option<Duration>,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cache_max_size: cardstore_storage::cache::DEFAULT_CACHE_MAX_SIZE,
            store_timeout: Duration::from_millis(5000),
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
            idempotency_lease: DEFAULT_LEASE_TTL,
            idempotency_failure_mode: IdempotencyFailureMode::FailClosed,
            purge_interval: Some(Duration::from_secs(300)),
            cors_origins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CARDSTORE_BIND_ADDR`: listen address (default: 0.0.0.0:8080)
    /// - `CARDSTORE_CACHE_MAX_SIZE`: cached cards per process (default: 1000)
    /// - `CARDSTORE_STORE_TIMEOUT_MS`: per-call store timeout (default: 5000)
    /// - `CARDSTORE_IDEMPOTENCY_TTL_SECS`: replay window (default: 86400)
    /// - `CARDSTORE_IDEMPOTENCY_LEASE_SECS`: reservation lease (default: 30)
    /// - `CARDSTORE_IDEMPOTENCY_FAILURE_MODE`: `fail_closed` or `treat_as_miss`
    /// - `CARDSTORE_PURGE_INTERVAL_SECS`: expired-key sweep, 0 disables (default: 300)
    /// - `CARDSTORE_CORS_ORIGINS`: comma-separated origins (default: any)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_timeout_ms: u64 = parse_var(&lookup, "CARDSTORE_STORE_TIMEOUT_MS", 5000)?;
        let idempotency_ttl_secs: u64 = parse_var(
            &lookup,
            "CARDSTORE_IDEMPOTENCY_TTL_SECS",
            defaults.idempotency_ttl.as_secs(),
        )?;
        let lease_secs: u64 = parse_var(
            &lookup,
            "CARDSTORE_IDEMPOTENCY_LEASE_SECS",
            defaults.idempotency_lease.as_secs(),
        )?;
        let purge_secs: u64 = parse_var(&lookup, "CARDSTORE_PURGE_INTERVAL_SECS", 300)?;

        let config = Self {
            bind_addr: parse_var(&lookup, "CARDSTORE_BIND_ADDR", defaults.bind_addr)?,
            cache_max_size: parse_var(&lookup, "CARDSTORE_CACHE_MAX_SIZE", defaults.cache_max_size)?,
            store_timeout: Duration::from_millis(store_timeout_ms),
            idempotency_ttl: Duration::from_secs(idempotency_ttl_secs),
            idempotency_lease: Duration::from_secs(lease_secs),
            idempotency_failure_mode: parse_var(
                &lookup,
                "CARDSTORE_IDEMPOTENCY_FAILURE_MODE",
                defaults.idempotency_failure_mode,
            )?,
            purge_interval: (purge_secs > 0).then(|| Duration::from_secs(purge_secs)),
            cors_origins: lookup("CARDSTORE_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CARDSTORE_CACHE_MAX_SIZE".to_string(),
                value: "0".to_string(),
                reason: "cache must hold at least one card".to_string(),
            });
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "CARDSTORE_STORE_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        if self.idempotency_lease.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "CARDSTORE_IDEMPOTENCY_LEASE_SECS".to_string(),
                value: "0".to_string(),
                reason: "lease must be positive".to_string(),
            });
        }
        if self.idempotency_lease <= self.store_timeout * 2 {
            return Err(ConfigError::InvalidValue {
                field: "CARDSTORE_IDEMPOTENCY_LEASE_SECS".to_string(),
                value: self.idempotency_lease.as_secs().to_string(),
                reason: format!(
                    "lease must exceed twice the store timeout ({} ms)",
                    self.store_timeout.as_millis()
                ),
            });
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default().with_max_size(self.cache_max_size)
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::default()
            .with_idempotency_ttl(self.idempotency_ttl)
            .with_lease_ttl(self.idempotency_lease)
            .with_store_timeout(self.store_timeout)
            .with_wait_timeout(self.store_timeout * 2)
            .with_failure_mode(self.idempotency_failure_mode)
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig::default().with_fetch_timeout(self.store_timeout)
    }
}
