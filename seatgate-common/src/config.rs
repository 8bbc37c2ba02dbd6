//! Configuration loading and root folder resolution
//!
//! Root folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SEATGATE_ROOT_FOLDER`, then `SEATGATE_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the SQLite database file inside the root folder
pub const DATABASE_FILE_NAME: &str = "seatgate.db";

/// Default session token lifetime (7 days)
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 168;

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// On-disk TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data directory holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// HMAC secret for session tokens; generated and stored in the
    /// database when absent
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in hours
    #[serde(default)]
    pub token_ttl_hours: Option<i64>,
}

impl TomlConfig {
    /// Token lifetime with the compiled default applied
    pub fn token_ttl_hours(&self) -> i64 {
        self.token_ttl_hours
            .filter(|hours| *hours > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_HOURS)
    }
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/seatgate (or /var/lib/seatgate for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("seatgate"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/seatgate"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("seatgate"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/seatgate"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("seatgate"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\seatgate"))
    } else {
        PathBuf::from("./seatgate_data")
    }
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("seatgate").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/seatgate/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load a TOML config file, falling back to defaults on any failure
pub fn load_toml_config_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        debug!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Config file {} not usable ({}), using defaults", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolves the data directory following the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml: None,
        }
    }

    /// Command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Already-loaded TOML config to consult
    pub fn with_toml(mut self, toml: TomlConfig) -> Self {
        self.toml = Some(toml);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("[{}] root folder from command line", self.module_name);
            return path.clone();
        }

        for var in ["SEATGATE_ROOT_FOLDER", "SEATGATE_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    debug!("[{}] root folder from {}", self.module_name, var);
                    return PathBuf::from(path);
                }
            }
        }

        let from_toml = match &self.toml {
            Some(toml) => toml.root_folder.clone(),
            None => load_toml_config_or_default(None).root_folder,
        };
        if let Some(path) = from_toml {
            debug!("[{}] root folder from config file", self.module_name);
            return path;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the resolved root folder and locates files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}
