//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::cache::MemoryCache;
use crate::query::CachePolicy;
use crate::transport::HttpTransportConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote store connection
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Shared application secret
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            secret: None,
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl RemoteConfig {
    /// Settings for the HTTP transport
    pub fn http_transport(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            base_url: self.base_url.clone(),
            secret: self.secret.clone(),
            request_timeout_ms: self.request_timeout_ms,
            max_retries: self.max_retries,
        }
    }
}

/// Defaults applied to queries built by the CLI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub cache_policy: CachePolicy,

    /// Result limit when none is given (0 = backend default)
    #[serde(default)]
    pub default_limit: u32,
}

/// Local result cache
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Entries older than this are ignored (unset = never expire)
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CacheConfig {
    /// Build the in-memory cache described by this config
    pub fn build(&self) -> MemoryCache {
        match self.max_age_secs {
            Some(secs) => {
                let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
                MemoryCache::with_max_age(chrono::Duration::seconds(secs))
            }
            None => MemoryCache::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let (config, discovery) = Self::discover();
        discovery.log();
        config
    }

    /// Load from default locations without logging
    ///
    /// Callers that set up logging from the loaded config report the search
    /// through [`ConfigDiscovery::log`] once a subscriber is installed.
    pub fn discover() -> (Self, ConfigDiscovery) {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("datakit").join("config.toml")),
            Some(PathBuf::from("/etc/datakit/config.toml")),
            Some(PathBuf::from("./datakit.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::discover_in(&config_paths)
    }

    fn discover_in(paths: &[PathBuf]) -> (Self, ConfigDiscovery) {
        let mut discovery = ConfigDiscovery::default();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    discovery.loaded_from = Some(path.clone());
                    return (config, discovery);
                }
                Err(e) => discovery.failures.push(e),
            }
        }

        (Self::from_env(), discovery)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Remote overrides
        if let Some(url) = var("DATAKIT_BASE_URL") {
            self.remote.base_url = url;
        }
        if let Some(secret) = var("DATAKIT_SECRET") {
            self.remote.secret = Some(secret);
        }
        if let Some(timeout) = var("DATAKIT_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.remote.request_timeout_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid DATAKIT_TIMEOUT_MS: {}", timeout),
            }
        }

        // Query overrides
        if let Some(policy) = var("DATAKIT_CACHE_POLICY") {
            match CachePolicy::from_str(&policy) {
                Some(p) => self.query.cache_policy = p,
                None => tracing::warn!("Ignoring unknown DATAKIT_CACHE_POLICY: {}", policy),
            }
        }

        // Logging overrides
        if let Some(level) = var("DATAKIT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("DATAKIT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Outcome of searching the default config locations
#[derive(Debug, Default)]
pub struct ConfigDiscovery {
    /// File the config was loaded from (none = defaults plus environment)
    pub loaded_from: Option<PathBuf>,
    /// Files that existed but could not be loaded
    pub failures: Vec<ConfigError>,
}

impl ConfigDiscovery {
    /// Report the search through `tracing`
    pub fn log(&self) {
        for error in &self.failures {
            tracing::warn!("Skipping config: {}", error);
        }
        match &self.loaded_from {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# DataKit Configuration
#
# Environment variables override these settings:
# - DATAKIT_BASE_URL
# - DATAKIT_SECRET
# - DATAKIT_TIMEOUT_MS
# - DATAKIT_CACHE_POLICY
# - DATAKIT_LOG_LEVEL
# - DATAKIT_LOG_FORMAT

[remote]
# DataKit server URL
base_url = "http://localhost:3000"

# Shared application secret
# secret = ""

# Request timeout (ms)
request_timeout_ms = 10000

# Attempts for unreachable servers and rate limiting
max_retries = 3

[query]
# ignore_cache, cache_only, cache_else_network or network_then_cache
cache_policy = "ignore_cache"

# Result limit when none is given (0 = server default)
default_limit = 0

[cache]
# Maximum age of cached results (seconds); unset keeps them forever
# max_age_secs = 300

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.remote.base_url, "http://localhost:3000");
        assert_eq!(config.remote.request_timeout_ms, 10_000);
        assert_eq!(config.query.cache_policy, CachePolicy::IgnoreCache);
        assert!(config.cache.max_age_secs.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.remote.base_url, "http://localhost:3000");
        assert_eq!(config.remote.max_retries, 3);
        assert_eq!(config.query.cache_policy, CachePolicy::IgnoreCache);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[remote]
base_url = "https://data.example.com"
secret = "s3cret"

[query]
cache_policy = "network_then_cache"

[cache]
max_age_secs = 60
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.remote.base_url, "https://data.example.com");
        assert_eq!(config.remote.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.remote.request_timeout_ms, 10_000);
        assert_eq!(config.query.cache_policy, CachePolicy::NetworkThenCache);
        assert_eq!(config.cache.max_age_secs, Some(60));
        assert_eq!(config.logging.level, "info");

        let http = config.remote.http_transport();
        assert_eq!(http.base_url, "https://data.example.com");
        assert_eq!(http.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_load_errors() {
        let err = Config::load(Path::new("/nonexistent/datakit.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[remote\nbase_url = 1").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_discover_records_broken_files() {
        let mut broken = NamedTempFile::new().unwrap();
        writeln!(broken, "[remote\nbase_url = 1").unwrap();
        let mut valid = NamedTempFile::new().unwrap();
        writeln!(valid, "[query]\ndefault_limit = 25").unwrap();

        let paths = vec![
            PathBuf::from("/nonexistent/datakit.toml"),
            broken.path().to_path_buf(),
            valid.path().to_path_buf(),
        ];
        let (config, discovery) = Config::discover_in(&paths);

        assert_eq!(config.query.default_limit, 25);
        assert_eq!(discovery.loaded_from.as_deref(), Some(valid.path()));
        assert_eq!(discovery.failures.len(), 1);
        assert!(matches!(
            &discovery.failures[0],
            ConfigError::Parse { path, .. } if path == broken.path()
        ));
    }

    #[test]
    fn test_discover_without_files_uses_defaults() {
        let (config, discovery) = Config::discover_in(&[PathBuf::from("/nonexistent/a.toml")]);
        assert!(discovery.loaded_from.is_none());
        assert!(discovery.failures.is_empty());
        assert_eq!(config.query.default_limit, 0);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DATAKIT_BASE_URL", "http://override:4000"),
            ("DATAKIT_SECRET", "env-secret"),
            ("DATAKIT_TIMEOUT_MS", "2500"),
            ("DATAKIT_CACHE_POLICY", "cache-else-network"),
            ("DATAKIT_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.remote.base_url, "http://override:4000");
        assert_eq!(config.remote.secret.as_deref(), Some("env-secret"));
        assert_eq!(config.remote.request_timeout_ms, 2500);
        assert_eq!(config.query.cache_policy, CachePolicy::CacheElseNetwork);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "DATAKIT_TIMEOUT_MS" => Some("soon".to_string()),
            "DATAKIT_CACHE_POLICY" => Some("sometimes".to_string()),
            _ => None,
        });

        assert_eq!(config.remote.request_timeout_ms, 10_000);
        assert_eq!(config.query.cache_policy, CachePolicy::IgnoreCache);
    }
}
