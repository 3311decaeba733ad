//! Configuration management for api-tester
//!
//! Handles the ~/.api_tester/ directory structure, config.toml and logging setup

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the home directory
pub const HOME_ENV: &str = "API_TESTER_HOME";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub verify_ssl: bool,
    pub max_redirects: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verify_ssl: true,
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub auto_format_json: bool,
    pub sort_keys: bool,
    pub indent: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            auto_format_json: true,
            sort_keys: false,
            indent: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Keys accepted by `get` and `set`
    pub const KEYS: [&'static str; 7] = [
        "network.timeout_secs",
        "network.verify_ssl",
        "network.max_redirects",
        "editor.auto_format_json",
        "editor.sort_keys",
        "editor.indent",
        "logging.level",
    ];

    /// Read a value by dotted key
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "network.timeout_secs" => self.network.timeout_secs.to_string(),
            "network.verify_ssl" => self.network.verify_ssl.to_string(),
            "network.max_redirects" => self.network.max_redirects.to_string(),
            "editor.auto_format_json" => self.editor.auto_format_json.to_string(),
            "editor.sort_keys" => self.editor.sort_keys.to_string(),
            "editor.indent" => self.editor.indent.to_string(),
            "logging.level" => self.logging.level.clone(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Set a value by dotted key, parsing it to the field's type
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "network.timeout_secs" => self.network.timeout_secs = parse_value(key, value)?,
            "network.verify_ssl" => self.network.verify_ssl = parse_bool(key, value)?,
            "network.max_redirects" => self.network.max_redirects = parse_value(key, value)?,
            "editor.auto_format_json" => self.editor.auto_format_json = parse_bool(key, value)?,
            "editor.sort_keys" => self.editor.sort_keys = parse_bool(key, value)?,
            "editor.indent" => self.editor.indent = parse_value(key, value)?,
            "logging.level" => {
                EnvFilter::try_new(value).map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
                self.logging.level = value.to_string();
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Returns the path to the api-tester home directory (~/.api_tester)
pub fn app_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".api_tester"))
}

/// Returns paths to all api-tester directories
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub data: PathBuf,
    pub db_file: PathBuf,
    pub exports: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self> {
        Ok(Self::at(app_home()?))
    }

    /// Lay out the directory structure under an explicit root
    pub fn at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            config: root.join("config.toml"),
            data: root.join("data"),
            db_file: root.join("data/api_tester.db"),
            exports: root.join("exports"),
            root,
        }
    }

    /// Create all directories if they don't exist
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root).context("Failed to create api-tester root")?;
        fs::create_dir_all(&self.data).context("Failed to create data directory")?;
        fs::create_dir_all(&self.exports).context("Failed to create exports directory")?;
        Ok(())
    }

    /// Check if api-tester has been initialized
    pub fn is_initialized(&self) -> bool {
        self.config.exists() && self.db_file.exists()
    }
}

/// Load configuration from disk, falling back to defaults when absent
pub fn load_config(paths: &AppPaths) -> Result<Config> {
    if !paths.config.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(&paths.config).context("Failed to read config.toml")?;
    toml::from_str(&content).context("Failed to parse config.toml")
}

/// Save configuration to disk
pub fn save_config(paths: &AppPaths, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&paths.config, content).context("Failed to write config.toml")?;
    Ok(())
}

/// Initialize logging on stderr; RUST_LOG takes precedence over the configured level
pub fn init_logging(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .compact(),
        )
        .try_init()?;

    tracing::debug!("Logging initialized");
    Ok(())
}

/// Initialize logging for tests; repeated calls are ignored
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("api_tester=debug"))
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}
