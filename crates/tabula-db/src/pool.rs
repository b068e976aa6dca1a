//! Connection pool setup.
//!
//! One pool per process, shared by every repository through the `Database`
//! facade. Sizing comes from [`PoolConfig`]: code defaults, the `DB_POOL_*`
//! environment variables via [`PoolConfig::from_env`], or builder overrides.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use tabula_core::{defaults, Error, Result};

/// Pool sizing and timeout settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long an acquire waits for a free connection before erroring.
    pub acquire_timeout: Duration,
    /// Idle connections older than this are closed.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::POOL_MAX_CONNECTIONS,
            min_connections: defaults::POOL_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::POOL_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::POOL_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Read overrides from `DB_POOL_MAX_CONNECTIONS`,
    /// `DB_POOL_MIN_CONNECTIONS`, `DB_POOL_ACQUIRE_TIMEOUT_SECS`, and
    /// `DB_POOL_IDLE_TIMEOUT_SECS`. Unset or unparsable values keep the
    /// defaults.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            max_connections: env_parse("DB_POOL_MAX_CONNECTIONS")
                .unwrap_or(base.max_connections)
                .max(1),
            min_connections: env_parse("DB_POOL_MIN_CONNECTIONS")
                .unwrap_or(base.min_connections),
            acquire_timeout: env_parse("DB_POOL_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.acquire_timeout),
            idle_timeout: env_parse("DB_POOL_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.idle_timeout),
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Connect with default settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connect with explicit settings.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        pool_size = pool.size(),
        "Database pool ready"
    );

    Ok(pool)
}

/// Log pool occupancy; warns when no idle connections remain.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool occupancy"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_overrides() {
        let config = PoolConfig::default()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(5));

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_env_overrides_and_ignores_garbage() {
        std::env::set_var("DB_POOL_MAX_CONNECTIONS", "3");
        std::env::set_var("DB_POOL_IDLE_TIMEOUT_SECS", "not a number");
        let config = PoolConfig::from_env();
        std::env::remove_var("DB_POOL_MAX_CONNECTIONS");
        std::env::remove_var("DB_POOL_IDLE_TIMEOUT_SECS");

        assert_eq!(config.max_connections, 3);
        assert_eq!(
            config.idle_timeout,
            Duration::from_secs(defaults::POOL_IDLE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_default_matches_shared_constants() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, defaults::POOL_MAX_CONNECTIONS);
        assert_eq!(
            config.idle_timeout,
            Duration::from_secs(defaults::POOL_IDLE_TIMEOUT_SECS)
        );
    }
}
