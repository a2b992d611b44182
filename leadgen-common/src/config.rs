//! Configuration loading and root folder resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: the service logs a warning and starts
//! with defaults. A TOML file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LEADGEN_ROOT_FOLDER";

/// Environment variables for MoEngage Data API credentials
pub const MOENGAGE_WORKSPACE_ID_ENV: &str = "LEADGEN_MOENGAGE_WORKSPACE_ID";
pub const MOENGAGE_DATA_API_KEY_ENV: &str = "LEADGEN_MOENGAGE_DATA_API_KEY";

/// Default MoEngage API host
pub const DEFAULT_MOENGAGE_BASE_URL: &str = "https://api-01.moengage.com";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "leadgen.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port (optional, service default applies)
    #[serde(default)]
    pub port: Option<u16>,

    /// HTTP bind address (optional, defaults to loopback)
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub moengage: MoEngageConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// MoEngage Data API settings used for campaign triggering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoEngageConfig {
    #[serde(default)]
    pub workspace_id: Option<String>,

    #[serde(default)]
    pub data_api_key: Option<String>,

    #[serde(default = "default_moengage_base_url")]
    pub base_url: String,
}

impl Default for MoEngageConfig {
    fn default() -> Self {
        Self {
            workspace_id: None,
            data_api_key: None,
            base_url: default_moengage_base_url(),
        }
    }
}

fn default_moengage_base_url() -> String {
    DEFAULT_MOENGAGE_BASE_URL.to_string()
}

impl MoEngageConfig {
    /// Apply environment overrides on top of TOML values
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(id) = std::env::var(MOENGAGE_WORKSPACE_ID_ENV).ok().filter(|v| is_valid_key(v)) {
            self.workspace_id = Some(id);
        }
        if let Some(key) = std::env::var(MOENGAGE_DATA_API_KEY_ENV).ok().filter(|v| is_valid_key(v)) {
            self.data_api_key = Some(key);
        }
        self
    }

    /// Workspace id and data API key, if both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.workspace_id, &self.data_api_key) {
            (Some(id), Some(key)) if is_valid_key(id) && is_valid_key(key) => {
                Some((id.as_str(), key.as_str()))
            }
            _ => None,
        }
    }
}

/// Validate a credential value (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

impl TomlConfig {
    /// Load TOML config from `path`
    ///
    /// Missing file yields defaults; unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Default config file path for a module: `<config_dir>/leadgen/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("leadgen").join(format!("{}.toml", module_name)))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("leadgen"))
        .unwrap_or_else(|| PathBuf::from("./leadgen_data"))
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_value: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("{}: root folder from command line", self.module_name);
            return path.clone();
        }

        if let Some(path) = std::env::var(ROOT_FOLDER_ENV).ok().filter(|v| !v.trim().is_empty()) {
            info!("{}: root folder from {}", self.module_name, ROOT_FOLDER_ENV);
            return PathBuf::from(path);
        }

        if let Some(path) = &self.toml_value {
            info!("{}: root folder from TOML config", self.module_name);
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates the root folder and locates files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
