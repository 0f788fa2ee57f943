//! PostgreSQL pool setup for the CLI and the pg-backed record store.

use std::env;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use juris_core::{Error, Result};

/// Batches are written one at a time.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long a batch waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// `JURIS_DB_MAX_CONNECTIONS` and `JURIS_DB_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unset, unparseable and zero values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|n| *n > 0)
        };
        let defaults = Self::default();
        Self {
            max_connections: read("JURIS_DB_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_connections),
            acquire_timeout: read("JURIS_DB_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
        }
    }
}

pub async fn create_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "store",
        component = "pool",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool connected"
    );
    Ok(pool)
}

/// Open and idle connection counts at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    pub open: u32,
    pub idle: usize,
}

impl PoolUsage {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            open: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn saturated(&self) -> bool {
        self.open > 0 && self.idle == 0
    }
}

/// Log pool usage after a unit of work. Warns when no connection is idle.
pub fn log_pool_usage(pool: &PgPool) {
    let usage = PoolUsage::of(pool);
    if usage.saturated() {
        warn!(
            subsystem = "store",
            component = "pool",
            pool_size = usage.open,
            "No idle connections left in pool"
        );
    } else {
        debug!(
            subsystem = "store",
            component = "pool",
            pool_size = usage.open,
            pool_idle = usage.idle,
            "Pool usage"
        );
    }
}
