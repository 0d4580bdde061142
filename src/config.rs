//! Runtime configuration for the pool and the database manager.
//!
//! Configuration is plain data handed to the composition root; nothing in the crate
//! reads it from globals. The `load` helper fills a `Config` from the environment
//! (prefix `POOLDB_`, with `__` separating sections, so `POOLDB_POOL__MAX_CONNECTIONS`
//! sets `pool.max_connections`) over built-in defaults.

use std::time::Duration;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "POOLDB_";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] figment::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db: DbConfig,
    pub pool: PoolConfig,
}

/// Where the manager itself connects. A `pool:` URL routes through the connection
/// pool; a driver URL (for example `sqlite:/var/lib/app/app.db`) opens direct
/// unpooled connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// The real driver URL the pool opens physical connections against.
    pub url: String,
    /// Upper bound on physical connections.
    pub max_connections: usize,
    /// How long an acquirer sleeps between scans of a full pool.
    pub retry_wait_ms: u64,
    /// How many failed scans before acquisition gives up.
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db: DbConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            url: String::from("pool:"),
            username: None,
            password: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            url: String::from("sqlite::memory:"),
            max_connections: 15,
            retry_wait_ms: 1000,
            max_attempts: 5,
        }
    }
}

impl PoolConfig {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

/// Reads configuration from the process environment over the defaults.
pub fn load() -> Result<Config, Error> {
    Ok(Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.pool.max_connections, 15);
        assert_eq!(cfg.pool.retry_wait(), Duration::from_millis(1000));
        assert_eq!(cfg.pool.max_attempts, 5);
        assert_eq!(cfg.db.url, "pool:");
    }

    #[test]
    fn environment_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("POOLDB_POOL__MAX_CONNECTIONS", "3");
            jail.set_env("POOLDB_DB__URL", "sqlite:/tmp/override.db");
            let cfg = load().expect("config should load");
            assert_eq!(cfg.pool.max_connections, 3);
            assert_eq!(cfg.db.url, "sqlite:/tmp/override.db");
            Ok(())
        });
    }
}
