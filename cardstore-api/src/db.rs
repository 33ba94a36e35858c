//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, plus the
//! tenant-scoped transaction every store operation runs in.
//!
//! Each unit of work opens a transaction and sets `app.current_tenant_id`
//! with `set_config(..., true)`, so row-level security applies for exactly
//! that transaction. Dropping an uncommitted transaction rolls it back.

use std::time::Duration;

use cardstore_core::{CardStoreError, ConfigError, StorageError, TenantId};
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
    Transaction,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;

use crate::config::parse_var;
use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "cardstore".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CARDSTORE_DB_HOST` (default: localhost)
    /// - `CARDSTORE_DB_PORT` (default: 5432)
    /// - `CARDSTORE_DB_NAME` (default: cardstore)
    /// - `CARDSTORE_DB_USER` (default: postgres)
    /// - `CARDSTORE_DB_PASSWORD` (default: empty)
    /// - `CARDSTORE_DB_POOL_SIZE` (default: 16)
    /// - `CARDSTORE_DB_TIMEOUT_MS` (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_ms: u64 = parse_var(&lookup, "CARDSTORE_DB_TIMEOUT_MS", 5000)?;
        let max_size: usize = parse_var(&lookup, "CARDSTORE_DB_POOL_SIZE", defaults.max_size)?;
        if max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CARDSTORE_DB_POOL_SIZE".to_string(),
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        Ok(Self {
            host: lookup("CARDSTORE_DB_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "CARDSTORE_DB_PORT", defaults.port)?,
            dbname: lookup("CARDSTORE_DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("CARDSTORE_DB_USER").unwrap_or(defaults.user),
            password: lookup("CARDSTORE_DB_PASSWORD").unwrap_or_default(),
            max_size,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.max_size);
        pool_config.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_config);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::internal_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
    timeout: Duration,
}

impl DbClient {
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool, config.timeout))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    pub(crate) async fn get_conn(&self) -> Result<deadpool_postgres::Object, CardStoreError> {
        self.pool.get().await.map_err(|e| pool_error(e, self.timeout))
    }

    /// Round-trip `SELECT 1`, returning the latency in milliseconds.
    pub async fn ping(&self) -> ApiResult<u64> {
        let start = std::time::Instant::now();
        let conn = self.pool.get().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX))
    }
}

// ============================================================================
// TENANT-SCOPED TRANSACTIONS
// ============================================================================

/// Open a transaction on `conn` with row-level security bound to `tenant_id`.
pub(crate) async fn tenant_transaction(
    conn: &mut deadpool_postgres::Object,
    tenant_id: TenantId,
) -> Result<Transaction<'_>, CardStoreError> {
    let tx = conn.transaction().await.map_err(db_error)?;
    tx.execute(
        "SELECT set_config('app.current_tenant_id', $1, true)",
        &[&tenant_id.to_string()],
    )
    .await
    .map_err(db_error)?;
    Ok(tx)
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// True when the error is a unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

/// Map a driver error onto the storage taxonomy.
pub(crate) fn db_error(err: tokio_postgres::Error) -> CardStoreError {
    // No SQLSTATE means the server never answered: I/O, TLS or a closed socket.
    let Some(db) = err.as_db_error() else {
        return StorageError::Connection {
            reason: err.to_string(),
        }
        .into();
    };
    tracing::debug!(code = ?db.code(), error = %db, "Database query failed");
    StorageError::Query {
        reason: format!("{}: {}", db.code().code(), db.message()),
    }
    .into()
}

fn pool_error(err: PoolError, timeout: Duration) -> CardStoreError {
    match err {
        PoolError::Timeout(_) => StorageError::Timeout {
            operation: "acquire_connection".to_string(),
            elapsed_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
        .into(),
        other => StorageError::Connection {
            reason: other.to_string(),
        }
        .into(),
    }
}
