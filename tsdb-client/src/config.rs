//! # Client Configuration
//!
//! Purpose: Collect the connection and pool parameters in one explicit value
//! instead of process-wide defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tsdb_common::DEFAULT_MAX_FRAME_LEN;

use crate::error::{ClientError, ClientResult};

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default server port.
pub const DEFAULT_PORT: u16 = 9001;
/// Default number of links held by a pool.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Environment variable overriding the host.
pub const ENV_HOSTNAME: &str = "TSDB_HOSTNAME";
/// Environment variable overriding the port.
pub const ENV_PORT: &str = "TSDB_PORT";
/// Environment variable overriding the pool size.
pub const ENV_POOL_SIZE: &str = "TSDB_POOL_SIZE";

/// Configuration shared by single connections and pools.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Number of links in a pool (clamped to at least 1).
    pub pool_size: usize,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Pause after a failed connect before the link reports itself dead.
    pub reconnect_delay: Duration,
    /// Largest payload accepted in a single response frame.
    pub max_frame_len: u64,
    /// Disable Nagle on each link.
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: None,
            reconnect_delay: Duration::from_millis(100),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        }
    }

    /// Defaults overlaid with `TSDB_HOSTNAME`, `TSDB_PORT` and `TSDB_POOL_SIZE`.
    pub fn from_env() -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        if let Ok(host) = env::var(ENV_HOSTNAME) {
            config.host = host;
        }
        if let Some(port) = parse_var(ENV_PORT)? {
            config.port = port;
        }
        if let Some(size) = parse_var(ENV_POOL_SIZE)? {
            config.pool_size = size;
        }
        Ok(config)
    }

    /// Sets the pool width.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// `host:port` as passed to the resolver.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn effective_pool_size(&self) -> usize {
        self.pool_size.max(1)
    }
}

fn parse_var<T: FromStr>(key: &str) -> ClientResult<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ClientError::Config(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.addr(), "localhost:9001");
        assert_eq!(config.pool_size, 20);
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        let config = ClientConfig::default().with_pool_size(0);
        assert_eq!(config.effective_pool_size(), 1);
    }

    // Only test that touches the process environment.
    #[test]
    fn env_overrides_and_rejects_garbage() {
        env::set_var(ENV_HOSTNAME, "db.internal");
        env::set_var(ENV_PORT, "9100");
        env::set_var(ENV_POOL_SIZE, "4");
        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.addr(), "db.internal:9100");
        assert_eq!(config.pool_size, 4);

        env::set_var(ENV_PORT, "ninety");
        assert!(matches!(ClientConfig::from_env(), Err(ClientError::Config(_))));

        env::remove_var(ENV_HOSTNAME);
        env::remove_var(ENV_PORT);
        env::remove_var(ENV_POOL_SIZE);
    }
}
