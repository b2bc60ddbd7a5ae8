//! Configuration manager - main API for config operations

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult, LogLevel};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::str::FromStr;

/// Prefix shared by every environment override
const ENV_PREFIX: &str = "FITSYNC";

/// Main configuration manager
///
/// Handles file paths, defaults, validation and environment overrides.
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a new config manager using the default config directory
    ///
    /// - Linux: `~/.config/fitsync/`
    /// - macOS: `~/Library/Application Support/fitsync/`
    /// - Windows: `%APPDATA%\fitsync\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let config_path = config_dir.join("config.toml");
        let persistence = ConfigPersistence::new(config_path);

        Ok(Self {
            persistence,
            config_dir,
        })
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "fitsync")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    /// Returns the config directory path
    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    /// Returns the full config file path
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Resolves `app.database_path` against the config directory when relative
    pub fn database_path(&self, config: &Config) -> PathBuf {
        if config.app.database_path.is_absolute() {
            config.app.database_path.clone()
        } else {
            self.config_dir.join(&config.app.database_path)
        }
    }

    /// Loads the configuration from file
    ///
    /// Missing file yields defaults; a corrupted file is an error.
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Saves the configuration to file
    ///
    /// Validates first and writes atomically.
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Loads, applies `update_fn`, and saves the result
    ///
    /// ```rust,no_run
    /// # use fitsync_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.sync.auto_sync_interval_secs = 600;
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Writes a default config file if one doesn't exist
    ///
    /// Returns Ok(true) if a new file was created.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.persistence.save(&Config::default())?;
        log::info!(
            "Generated default config at {}",
            self.config_path().display()
        );
        Ok(true)
    }

    /// Overwrites the config file with default values
    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Validates the current configuration file
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Loads the file config and applies `FITSYNC_<SECTION>_<FIELD>` variables
    ///
    /// Example: `FITSYNC_REMOTE_MAX_ATTEMPTS=5`
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

        if let Err(errors) = config.validate() {
            let error_msg = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigError::ValidationError(error_msg));
        }

        Ok(config)
    }
}

/// Applies environment-style overrides using `lookup` to read variables
///
/// Unset variables leave the config untouched. A value that fails to parse
/// is reported as `ConfigError::InvalidOverride`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |section: &str, field: &str| {
        let name = format!("{}_{}_{}", ENV_PREFIX, section, field);
        lookup(&name).map(|value| (name, value))
    };

    if let Some((_, value)) = var("APP", "DATABASE_PATH") {
        config.app.database_path = PathBuf::from(value);
    }
    if let Some((name, value)) = var("APP", "LOG_LEVEL") {
        config.app.log_level = parse_override::<LogLevel>(&name, &value)?;
    }

    if let Some((_, value)) = var("REMOTE", "BASE_URL") {
        config.remote.base_url = value;
    }
    if let Some((name, value)) = var("REMOTE", "REQUEST_TIMEOUT_SECS") {
        config.remote.request_timeout_secs = parse_override(&name, &value)?;
    }
    if let Some((name, value)) = var("REMOTE", "MAX_ATTEMPTS") {
        config.remote.max_attempts = parse_override(&name, &value)?;
    }
    if let Some((name, value)) = var("REMOTE", "INITIAL_BACKOFF_MS") {
        config.remote.initial_backoff_ms = parse_override(&name, &value)?;
    }
    if let Some((name, value)) = var("REMOTE", "MAX_BACKOFF_MS") {
        config.remote.max_backoff_ms = parse_override(&name, &value)?;
    }
    if let Some((_, value)) = var("REMOTE", "AUTH_TOKEN") {
        config.remote.auth_token = Some(value);
    }

    if let Some((name, value)) = var("SYNC", "AUTO_SYNC_INTERVAL_SECS") {
        config.sync.auto_sync_interval_secs = parse_override(&name, &value)?;
    }
    if let Some((name, value)) = var("SYNC", "EVENT_BUFFER") {
        config.sync.event_buffer = parse_override(&name, &value)?;
    }

    Ok(())
}

fn parse_override<T>(variable: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    log::debug!("Applying override {}={}", variable, value);
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidOverride {
            variable: variable.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}
