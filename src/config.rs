use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "dashlink")]
#[command(about = "dashlink - one warehouse session for dashboards, locally or inside the host platform", long_about = None)]
pub struct Config {
    // Session resolution
    #[arg(short = 'c', long, default_value = "default", env = "DASHLINK_CONNECTION_NAME", help = "Local connection profile used when no host session is present")]
    pub connection_name: String,

    #[arg(long, env = "DASHLINK_CONNECTIONS_FILE", help = "Connection profile store (default: ~/.dashlink/connections.toml)")]
    pub connections_file: Option<PathBuf>,

    #[arg(long, default_value = "DASHLINK_HOST_SESSION", env = "DASHLINK_AMBIENT_ENV", help = "Environment variable through which the host platform exports its session")]
    pub ambient_env: String,

    #[arg(long, default_value = "info", env = "DASHLINK_LOG_LEVEL")]
    pub log_level: String,

    // Cache configuration
    #[arg(long, default_value = "1000", env = "DASHLINK_QUERY_CACHE_SIZE", help = "Maximum number of query results to cache")]
    pub query_cache_size: usize,

    #[arg(long, default_value = "600", env = "DASHLINK_QUERY_CACHE_TTL", help = "TTL for cached query results in seconds (0 = never expire)")]
    pub query_cache_ttl: u64,

    // Async dispatch
    #[arg(long, default_value = "60", env = "DASHLINK_AWAIT_TIMEOUT", help = "Seconds to wait for an async query before giving up the wait")]
    pub await_timeout: u64,

    #[arg(long, default_value = "250", env = "DASHLINK_POLL_INTERVAL_MS", help = "Status polling interval for async queries in milliseconds")]
    pub poll_interval_ms: u64,

    // One-shot actions
    #[arg(long, help = "SQL to run against the resolved session")]
    pub sql: Option<String>,

    #[arg(long = "async-query", help = "Submit --sql without blocking and poll for its status")]
    pub async_query: bool,

    #[arg(long, help = "Bypass the query result cache")]
    pub no_cache: bool,
}

impl Config {
    /// Get a configuration instance with all values resolved from CLI args and environment variables
    pub fn load() -> Self {
        Config::parse()
    }

    /// Profile store location, falling back to ~/.dashlink/connections.toml
    pub fn connections_path(&self) -> PathBuf {
        if let Some(path) = &self.connections_file {
            return path.clone();
        }
        env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir)
            .join(".dashlink")
            .join("connections.toml")
    }

    /// Get the query cache TTL; `None` when entries never expire
    pub fn query_cache_ttl_duration(&self) -> Option<Duration> {
        match self.query_cache_ttl {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn await_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.await_timeout)
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["dashlink", "--connections-file", "/tmp/c.toml"]).unwrap();
        assert_eq!(config.query_cache_size, 1000);
        assert_eq!(config.query_cache_ttl_duration(), Some(Duration::from_secs(600)));
        assert_eq!(config.await_timeout_duration(), Duration::from_secs(60));
        assert_eq!(config.connections_path(), PathBuf::from("/tmp/c.toml"));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let config = Config::try_parse_from(["dashlink", "--query-cache-ttl", "0"]).unwrap();
        assert_eq!(config.query_cache_ttl_duration(), None);
    }

    #[test]
    fn test_connection_name_flag() {
        let config = Config::try_parse_from(["dashlink", "-c", "demo_conn", "--sql", "SELECT 1", "--async-query"]).unwrap();
        assert_eq!(config.connection_name, "demo_conn");
        assert_eq!(config.sql.as_deref(), Some("SELECT 1"));
        assert!(config.async_query);
    }
}
