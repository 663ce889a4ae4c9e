//! Service configuration.
//!
//! This covers how the bridge itself runs (listen address, database path,
//! upload timeouts). The user's upload settings live in the database and are
//! edited through the configuration UI, see [`crate::settings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Published configuration page.
pub const DEFAULT_CONFIG_UI_URL: &str = "https://cdn.rawgit.com/faelys/life-log/v1.0/config.html";

/// Minimum upload timeout in seconds.
pub const MIN_UPLOAD_TIMEOUT: u64 = 1;
/// Maximum upload timeout in seconds (10 minutes).
pub const MAX_UPLOAD_TIMEOUT: u64 = 600;

/// Minimum API key length when authentication is enabled.
pub const MIN_API_KEY_LENGTH: usize = 16;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub config_ui: ConfigUiConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration, collecting every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use lifelog_bridge::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.upload.validate());
        errors.extend(self.config_ui.validate());
        errors.extend(self.security.validate());
        errors.extend(self.logging.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Write the default configuration to `path`.
    ///
    /// An existing file is only replaced when `force` is set.
    pub fn init<P: AsRef<Path>>(path: P, force: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8484").
    pub bind: String,
    /// Capacity of the outbound device message channel.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8484".to_string(),
            broadcast_buffer: 32,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "buffer size must be at least 1",
            ));
        }

        errors
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: lifelog_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }
        errors
    }
}

/// Outbound upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Per-request timeout in seconds. A timed-out upload counts as failed.
    pub timeout_secs: u64,
    /// User-Agent header sent with uploads.
    pub user_agent: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("lifelog-bridge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(MIN_UPLOAD_TIMEOUT..=MAX_UPLOAD_TIMEOUT).contains(&self.timeout_secs) {
            errors.push(ValidationError::new(
                "upload.timeout_secs",
                format!(
                    "timeout {} is out of range ({}-{} seconds)",
                    self.timeout_secs, MIN_UPLOAD_TIMEOUT, MAX_UPLOAD_TIMEOUT
                ),
            ));
        }

        if self.user_agent.trim().is_empty() {
            errors.push(ValidationError::new(
                "upload.user_agent",
                "user agent cannot be empty",
            ));
        }

        errors
    }
}

/// Configuration page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUiConfig {
    /// Page opened to edit upload settings; the current values are appended
    /// as a query string.
    pub base_url: String,
}

impl Default for ConfigUiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONFIG_UI_URL.to_string(),
        }
    }
}

impl ConfigUiConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "config_ui.base_url",
                format!("'{}' must be an http(s) URL", self.base_url),
            ));
        } else if self.base_url.contains('?') {
            errors.push(ValidationError::new(
                "config_ui.base_url",
                "base URL cannot contain a query string",
            ));
        }
        errors
    }
}

/// API access control.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Require an API key for every endpoint except `/api/health`.
    pub api_key_enabled: bool,
    /// Expected key, sent in `X-API-Key` or as a `token` query parameter.
    pub api_key: Option<String>,
}

impl SecurityConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.api_key_enabled {
            match &self.api_key {
                None => errors.push(ValidationError::new(
                    "security.api_key",
                    "api_key is required when api_key_enabled is true",
                )),
                Some(key) if key.len() < MIN_API_KEY_LENGTH => {
                    errors.push(ValidationError::new(
                        "security.api_key",
                        format!(
                            "api_key is too short (minimum {} characters)",
                            MIN_API_KEY_LENGTH
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
        errors
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, used in addition to `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lifelog_bridge=info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.level.trim().is_empty() {
            errors.push(ValidationError::new(
                "logging.level",
                "log level cannot be empty",
            ));
        } else if self.level.parse::<tracing_subscriber::filter::Directive>().is_err() {
            errors.push(ValidationError::new(
                "logging.level",
                format!("invalid filter directive '{}'", self.level),
            ));
        }
        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config file {0} already exists")]
    AlreadyExists(PathBuf),
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lifelog")
        .join("bridge.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_fields(config: &Config) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Ok(()) => Vec::new(),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8484");
        assert_eq!(config.server.broadcast_buffer, 32);
        assert_eq!(config.upload.timeout_secs, 30);
        assert_eq!(config.config_ui.base_url, DEFAULT_CONFIG_UI_URL);
        assert!(!config.security.api_key_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, lifelog_store::default_db_path());
    }

    #[test]
    fn test_user_agent_default_has_version() {
        let config = UploadConfig::default();
        assert!(config.user_agent.starts_with("lifelog-bridge/"));
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [upload]
            timeout_secs = 5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.upload.timeout_secs, 5);
        assert_eq!(config.server.bind, "127.0.0.1:8484");
        assert!(config.upload.user_agent.starts_with("lifelog-bridge/"));
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9000"
            broadcast_buffer = 8

            [storage]
            path = "/data/bridge.db"

            [upload]
            timeout_secs = 60
            user_agent = "custom/1.0"

            [config_ui]
            base_url = "https://example.org/config.html"

            [security]
            api_key_enabled = true
            api_key = "0123456789abcdef"

            [logging]
            level = "lifelog_bridge=debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.broadcast_buffer, 8);
        assert_eq!(config.storage.path, PathBuf::from("/data/bridge.db"));
        assert_eq!(config.upload.user_agent, "custom/1.0");
        assert_eq!(config.config_ui.base_url, "https://example.org/config.html");
        assert_eq!(config.security.api_key.as_deref(), Some("0123456789abcdef"));
        assert_eq!(config.logging.level, "lifelog_bridge=debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("bridge.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.upload.timeout_secs = 90;

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(loaded.upload.timeout_secs, 90);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/bridge.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_loaded_config_fails_validation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("bridge.toml");
        std::fs::write(&config_path, "[upload]\ntimeout_secs = 0\n").unwrap();

        let config = Config::load(&config_path).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_init_writes_default_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("lifelog").join("bridge.toml");

        Config::init(&config_path, false).unwrap();
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.server.bind, "127.0.0.1:8484");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_init_keeps_existing_file_unless_forced() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("bridge.toml");
        std::fs::write(&config_path, "[server]\nbind = \"0.0.0.0:9000\"\n").unwrap();

        let result = Config::init(&config_path, false);
        assert!(matches!(result, Err(ConfigError::AlreadyExists(_))));
        assert_eq!(Config::load(&config_path).unwrap().server.bind, "0.0.0.0:9000");

        Config::init(&config_path, true).unwrap();
        assert_eq!(Config::load(&config_path).unwrap().server.bind, "127.0.0.1:8484");
    }

    #[test]
    fn test_validate_bind_address() {
        let mut config = Config::default();
        for bind in ["", "localhost", "127.0.0.1:0", "127.0.0.1:http"] {
            config.server.bind = bind.to_string();
            assert_eq!(validation_fields(&config), vec!["server.bind"], "{bind}");
        }
        config.server.bind = "[::1]:8484".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_broadcast_buffer() {
        let mut config = Config::default();
        config.server.broadcast_buffer = 0;
        assert_eq!(validation_fields(&config), vec!["server.broadcast_buffer"]);
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let mut config = Config::default();
        config.upload.timeout_secs = 0;
        assert_eq!(validation_fields(&config), vec!["upload.timeout_secs"]);
        config.upload.timeout_secs = 601;
        assert_eq!(validation_fields(&config), vec!["upload.timeout_secs"]);
        config.upload.timeout_secs = 600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_config_ui_url() {
        let mut config = Config::default();
        config.config_ui.base_url = "ftp://example.org".to_string();
        assert_eq!(validation_fields(&config), vec!["config_ui.base_url"]);
        config.config_ui.base_url = "https://example.org/c.html?x=1".to_string();
        assert_eq!(validation_fields(&config), vec!["config_ui.base_url"]);
    }

    #[test]
    fn test_validate_api_key() {
        let mut config = Config::default();
        config.security.api_key_enabled = true;
        assert_eq!(validation_fields(&config), vec!["security.api_key"]);

        config.security.api_key = Some("short".to_string());
        assert_eq!(validation_fields(&config), vec!["security.api_key"]);

        config.security.api_key = Some("a".repeat(MIN_API_KEY_LENGTH));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_logging_level() {
        let mut config = Config::default();
        config.logging.level = " ".to_string();
        assert_eq!(validation_fields(&config), vec!["logging.level"]);
        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors_are_aggregated() {
        let mut config = Config::default();
        config.server.bind = String::new();
        config.upload.timeout_secs = 0;
        config.storage.path = PathBuf::new();

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("server.bind"));
        assert!(message.contains("upload.timeout_secs"));
        assert!(message.contains("storage.path"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("lifelog/bridge.toml"));
    }
}
