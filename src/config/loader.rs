// src/config/loader.rs
//! Layered configuration loading: defaults, TOML files, then environment

use crate::config::TelemetryConfig;
use crate::error::{ErrorContext, TelemetryError};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable prefix, e.g. `BIOSIGNAL_CONNECTION__DWELL_MS=5000`
pub const ENV_PREFIX: &str = "BIOSIGNAL";
/// Explicit config file location
pub const ENV_CONFIG_PATH: &str = "BIOSIGNAL_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "biosignal.toml";
const LOCAL_CONFIG_FILE: &str = "config/biosignal.toml";
const USER_CONFIG_DIR: &str = ".config/biosignal";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Configuration validation errors: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for TelemetryError {
    fn from(err: ConfigError) -> Self {
        let context = ErrorContext::new("config_loader", "load");
        match err {
            ConfigError::IoError(reason) => TelemetryError::Io {
                path: "configuration".to_string(),
                reason,
                context,
            },
            ConfigError::FileNotFound(path) => TelemetryError::Io {
                path,
                reason: "file not found".to_string(),
                context,
            },
            other => TelemetryError::configuration("config_loader", other.to_string(), context),
        }
    }
}

/// Loads [`TelemetryConfig`] from layered sources
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a loader that searches the standard locations
    pub fn new() -> Self {
        Self {
            config_paths: Self::discover_config_paths(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Create loader with custom paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Load, merge and validate the configuration
    pub fn load(&self) -> Result<TelemetryConfig, ConfigError> {
        let defaults = Config::try_from(&TelemetryConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        for path in &self.config_paths {
            if path.exists() {
                debug!(path = %path.display(), "Merging configuration file");
            }
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: TelemetryConfig = builder.build()?.try_deserialize()?;
        config
            .validate_consistency()
            .map_err(ConfigError::ValidationError)?;

        info!(
            mode = %config.connection.mode,
            sources = self.config_paths.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load a single file on top of defaults, without environment overrides
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<TelemetryConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: TelemetryConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config
            .validate_consistency()
            .map_err(ConfigError::ValidationError)?;
        Ok(config)
    }

    /// Export a configuration to a TOML file
    pub fn export_config<P: AsRef<Path>>(config: &TelemetryConfig, path: P) -> Result<(), ConfigError> {
        let toml_content =
            toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, toml_content)?;
        Ok(())
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(home_dir) = home_dir() {
            paths.push(home_dir.join(USER_CONFIG_DIR).join("config.toml"));
        }

        // Later entries take precedence
        paths.push(PathBuf::from(DEFAULT_CONFIG_FILE));
        paths.push(PathBuf::from(LOCAL_CONFIG_FILE));

        if let Some(explicit) = std::env::var_os(ENV_CONFIG_PATH) {
            paths.push(PathBuf::from(explicit));
        }

        paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}
