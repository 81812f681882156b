//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub socket: SocketConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL every stream/alert path is appended to
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Prefix under the base URL for the login/signin endpoints
    #[serde(default = "default_auth_path")]
    pub auth_path: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_api_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

fn default_auth_path() -> String {
    "/v1.0".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            auth_path: default_auth_path(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Push channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Server URL; http(s) is mapped to ws(s)
    #[serde(default = "default_socket_url")]
    pub url: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Reconnect delay is this times the attempt number
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_socket_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_namespace() -> String {
    "/video".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay() -> u64 {
    2000
}

fn default_connect_timeout() -> u64 {
    20_000
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            namespace: default_namespace(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl SocketConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Session configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Where the credential is persisted (platform data dir by default)
    pub credentials_path: Option<String>,
}

impl SessionConfig {
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(crate::session::default_credentials_path)
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

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
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
    ///
    /// A config file that fails to load is logged and replaced by defaults.
    /// Use [`Config::try_load_default`] to surface the error instead.
    pub fn load_default() -> Self {
        match Self::try_load_default() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::from_env()
            }
        }
    }

    /// Load from the first default location that exists, or the environment
    pub fn try_load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("realtime-monitor").join("config.toml")),
            Some(PathBuf::from("/etc/realtime-monitor/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    fn load_first(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => {
                let config = Self::load_with_env(path)?;
                tracing::info!("Loaded config from {:?}", path);
                Ok(config)
            }
            None => {
                tracing::debug!("Using default config with environment overrides");
                Ok(Self::from_env())
            }
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(url) = lookup("MONITOR_API_URL") {
            self.api.base_url = url;
        }

        // Socket overrides
        if let Some(url) = lookup("MONITOR_SOCKET_URL") {
            self.socket.url = url;
        }
        if let Some(attempts) = lookup("MONITOR_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.socket.max_reconnect_attempts = n;
            }
        }

        // Session overrides
        if let Some(path) = lookup("MONITOR_CREDENTIALS_PATH") {
            self.session.credentials_path = Some(path);
        }

        // Logging overrides
        if let Some(level) = lookup("MONITOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("MONITOR_LOG_FORMAT") {
            self.logging.format = format;
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
    r#"# Realtime Monitor Configuration
#
# Environment variables override these settings:
# - MONITOR_API_URL
# - MONITOR_SOCKET_URL
# - MONITOR_MAX_RECONNECT_ATTEMPTS
# - MONITOR_CREDENTIALS_PATH
# - MONITOR_LOG_LEVEL
# - MONITOR_LOG_FORMAT

[api]
# Base URL of the control API
base_url = "http://127.0.0.1:5000/api"

# Prefix for the login/signin endpoints
auth_path = "/v1.0"

# Request timeout in milliseconds
request_timeout_ms = 10000

[socket]
# Push channel server URL
url = "http://localhost:5000"

# Socket.IO namespace for stream events
namespace = "/video"

# Reconnect attempts before giving up
max_reconnect_attempts = 5

# Reconnect delay = base delay x attempt number (ms)
reconnect_base_delay_ms = 2000

# Connect + handshake timeout (ms)
connect_timeout_ms = 20000

[session]
# Where the access token is stored
# credentials_path = "~/.local/share/realtime-monitor/credentials.json"

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

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:5000/api");
        assert_eq!(config.socket.namespace, "/video");
        assert_eq!(config.socket.max_reconnect_attempts, 5);
        assert_eq!(config.socket.reconnect_base_delay(), Duration::from_secs(2));
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.api.auth_path, "/v1.0");
        assert_eq!(config.socket.connect_timeout_ms, 20_000);
        assert!(config.session.credentials_path.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::parse("[socket]\nmax_reconnect_attempts = 2\n").unwrap();
        assert_eq!(config.socket.max_reconnect_attempts, 2);
        assert_eq!(config.socket.reconnect_base_delay_ms, 2000);
        assert_eq!(config.api.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("MONITOR_API_URL", "http://monitor.local/api"),
            ("MONITOR_MAX_RECONNECT_ATTEMPTS", "not-a-number"),
            ("MONITOR_CREDENTIALS_PATH", "/tmp/creds.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "http://monitor.local/api");
        assert_eq!(config.socket.max_reconnect_attempts, 5);
        assert_eq!(
            config.session.credentials_path(),
            PathBuf::from("/tmp/creds.json")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/monitor.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_default_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("config.toml");
        std::fs::write(&broken, "[api\nbase_url = ").unwrap();

        let paths = vec![dir.path().join("missing.toml"), broken.clone()];
        let err = Config::load_first(&paths).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if *path == broken));
    }

    #[test]
    fn test_first_existing_default_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.toml");
        let second = dir.path().join("second.toml");
        std::fs::write(&first, "[socket]\nmax_reconnect_attempts = 2\n").unwrap();
        std::fs::write(&second, "not toml at all [").unwrap();

        let config = Config::load_first(&[dir.path().join("missing.toml"), first, second]).unwrap();
        assert_eq!(config.socket.max_reconnect_attempts, 2);
    }
}
