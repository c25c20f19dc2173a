use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkyfallConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Where playbooks, runs, schedules and the technique catalog live.
///
/// Empty paths are resolved relative to `data_dir` by [`StorageConfig::resolved`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub playbooks_dir: PathBuf,

    #[serde(default)]
    pub runs_dir: PathBuf,

    #[serde(default)]
    pub schedules_file: PathBuf,

    #[serde(default)]
    pub catalog_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a single technique invocation. `None` waits forever.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// When false, the inter-step `wait` of every playbook step is skipped.
    #[serde(default = "default_true")]
    pub honor_waits: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_data_dir() -> PathBuf {
    get_data_dir().unwrap_or_else(|| PathBuf::from(".skyfall"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    30
}

fn default_history_limit() -> usize {
    100
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            playbooks_dir: PathBuf::new(),
            runs_dir: PathBuf::new(),
            schedules_file: PathBuf::new(),
            catalog_file: PathBuf::new(),
        }
    }
}

impl StorageConfig {
    /// Rooted at `data_dir`, with every unset path filled in.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
        .resolved()
    }

    pub fn resolved(mut self) -> Self {
        if self.playbooks_dir.as_os_str().is_empty() {
            self.playbooks_dir = self.data_dir.join("playbooks");
        }
        if self.runs_dir.as_os_str().is_empty() {
            self.runs_dir = self.data_dir.join("runs");
        }
        if self.schedules_file.as_os_str().is_empty() {
            self.schedules_file = self.data_dir.join("schedules.yml");
        }
        if self.catalog_file.as_os_str().is_empty() {
            self.catalog_file = self.data_dir.join("techniques.yml");
        }
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: None,
            honor_waits: true,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            history_limit: default_history_limit(),
        }
    }
}

impl SkyfallConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SKYFALL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut skyfall_config: SkyfallConfig = builder.build()?.try_deserialize()?;

        if let Ok(level) = std::env::var("SKYFALL_LOG_LEVEL") {
            skyfall_config.logging.level = level;
        }

        skyfall_config.storage = skyfall_config.storage.resolved();
        skyfall_config.validate()?;

        Ok(skyfall_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigLoadError::MissingRequired("storage.data_dir".to_string()));
        }

        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "scheduler.tick_interval_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.engine.step_timeout_secs == Some(0) {
            return Err(ConfigLoadError::InvalidValue {
                key: "engine.step_timeout_secs".to_string(),
                message: "Must be greater than 0 when set".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("skyfall.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("skyfall").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".skyfall").join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let mut env_paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        env_paths.push(cwd.join(".env"));
        env_paths.push(cwd.join(".env.local"));
    }

    if let Some(home) = dirs::home_dir() {
        env_paths.push(home.join(".skyfall").join(".env"));
    }

    for path in env_paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("skyfall"))
}

pub fn get_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("skyfall"))
}
