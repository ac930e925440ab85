//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the data directory
pub const ROOT_FOLDER_ENV: &str = "LIBRIS_ROOT_FOLDER";

/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "LIBRIS_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "libris.db";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibrisConfig {
    /// Data directory holding libris.db
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub activation: ActivationConfig,
    pub duplicates: DuplicateConfig,
    pub sweeps: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Activation link settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivationConfig {
    /// Base URL activation links are built on
    pub base_url: String,
    /// Login link lifetime in seconds
    pub login_ttl_secs: u64,
    /// Creation-confirmation link lifetime in seconds
    pub confirm_ttl_secs: u64,
    /// Base64 signing secret; generated and persisted in settings when absent
    pub secret: Option<String>,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5780".to_string(),
            login_ttl_secs: 5 * 60,
            confirm_ttl_secs: 24 * 60 * 60,
            secret: None,
        }
    }
}

/// Fuzzy duplicate search settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Minimum relevance score for a fuzzy hit (index scale)
    pub fuzzy_threshold: f64,
    /// Number of search results considered
    pub fuzzy_limit: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            fuzzy_limit: 3,
        }
    }
}

/// Scheduled sweep settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

impl LibrisConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LibrisConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration following the file lookup order:
    /// 1. Explicit path (command-line argument)
    /// 2. LIBRIS_CONFIG environment variable
    /// 3. Platform config locations
    ///
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn discover(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            return Self::load(Path::new(&path));
        }

        match find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.duplicates.fuzzy_threshold) {
            return Err(Error::Config(format!(
                "duplicates.fuzzy_threshold must be within 0.0..=1.0 (got {})",
                self.duplicates.fuzzy_threshold
            )));
        }
        if self.duplicates.fuzzy_limit == 0 {
            return Err(Error::Config("duplicates.fuzzy_limit must be at least 1".to_string()));
        }
        if self.activation.login_ttl_secs == 0 || self.activation.confirm_ttl_secs == 0 {
            return Err(Error::Config("activation TTLs must be non-zero".to_string()));
        }
        if self.sweeps.interval_secs == 0 {
            return Err(Error::Config("sweeps.interval_secs must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Database path under the resolved root folder
    pub fn database_path(&self, cli_root: Option<&str>) -> PathBuf {
        resolve_root_folder(cli_root, ROOT_FOLDER_ENV, self.root_folder.as_deref())
            .join(DATABASE_FILE)
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config
    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Locate the config file for the platform
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("libris").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/libris/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("libris"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/libris"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("libris"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/libris"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("libris"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\libris"))
    } else {
        PathBuf::from("./libris_data")
    }
}
