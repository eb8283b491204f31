//! # PMORenderers Configuration Module
//!
//! This module provides the configuration of the renderer identification
//! engine:
//! - Loading configuration from a `config.yaml` file
//! - Merging with the embedded default configuration
//! - Environment variable overrides (`PMORENDERERS_CONFIG__SECTION__KEY`)
//! - Typed getters and setters with defaults
//!
//! There is no global instance: the application builds one [`Config`] and
//! hands it to whatever needs it.
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//!
//! let config = Config::load_config(None)?;
//! let dirs = config.get_renderers_dirs()?;
//! let force_default = config.get_force_default();
//!
//! config.set_force_default(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde_yaml::{Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{info, warn};

mod yaml;

use yaml::{get_path, lower_keys, merge_yaml, parse_env_value, set_path};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmorenderers.yaml");

pub const ENV_CONFIG_DIR: &str = "PMORENDERERS_CONFIG";
pub const ENV_PREFIX: &str = "PMORENDERERS_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmorenderers";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the selection entry enabling every profile.
pub const ALL_RENDERERS: &str = "All renderers";

const DEFAULT_PROFILE_DIR: &str = "renderers";
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_RELOAD_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_GHOST_GRACE_DELAY_MS: u64 = 5000;
const DEFAULT_FORCE_DEFAULT: bool = false;
const DEFAULT_AUDIO_RESAMPLE: bool = true;

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            let path: &[&str] = $path;
            match self.get_value(path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
                    warn!(path = %path.join("."), value = %n, "Not a positive integer, using default");
                    $default
                }),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                    warn!(path = %path.join("."), value = %s, "Not an integer, using default");
                    $default
                }),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                Ok(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for the renderer engine
///
/// # Examples
///
/// ```
/// use pmoconfig::Config;
///
/// let config = Config::defaults();
/// assert!(!config.get_force_default());
/// assert_eq!(config.get_selected_renderers(), vec!["All renderers".to_string()]);
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    /// `None` for a configuration that is never persisted.
    path: Option<PathBuf>,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.lock().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: Option<&Path>) -> PathBuf {
        if let Some(dir) = directory {
            return dir.to_path_buf();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        let local = Path::new(CONFIG_DIR_NAME);
        if local.exists() {
            return local.to_path_buf();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        local.to_path_buf()
    }

    /// Creates the directory if needed and checks that it is readable and writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Cannot create config directory {}", path.display()))?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")
            .with_context(|| format!("Config directory {} is not writable", path.display()))?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory`
    /// 2. The `PMORENDERERS_CONFIG` environment variable
    /// 3. `.pmorenderers` in the current directory
    /// 4. `.pmorenderers` in the user's home directory
    pub fn config_dir(directory: Option<&Path>) -> Result<PathBuf> {
        let dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&dir)?;
        Ok(dir)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: Option<&Path>) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join(CONFIG_FILE_NAME);
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)
                    .with_context(|| format!("Invalid YAML in {}", path.display()))?;
                merge_yaml(&mut value, &lower_keys(external));
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
            }
        }

        let mut value = lower_keys(value);
        Self::apply_env_overrides(&mut value);

        let config = Config {
            config_dir,
            path: Some(path),
            data: Mutex::new(value),
        };
        config.save()?;
        Ok(config)
    }

    /// In-memory configuration built from the embedded defaults only.
    ///
    /// Nothing is read from or written to disk; relative directories are
    /// resolved against the current directory.
    pub fn defaults() -> Self {
        let value = serde_yaml::from_str::<Value>(DEFAULT_CONFIG)
            .map(lower_keys)
            .unwrap_or(Value::Null);
        Config {
            config_dir: PathBuf::from("."),
            path: None,
            data: Mutex::new(value),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.lock())?;
        fs::write(path, yaml).with_context(|| format!("Cannot write {}", path.display()))?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["renderers", "default"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock();
            set_path(&mut data, path, value)?;
        }
        self.save()
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock();
        get_path(&data, path).cloned()
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key_path: Vec<&str> = suffix.split("__").collect();
            if let Err(err) = set_path(config, &key_path, parse_env_value(&value)) {
                warn!(env_var = %key, error = %err, "Ignoring environment override");
            }
        }
    }

    /// Résout un chemin relatif au répertoire de configuration
    fn resolve_dir(&self, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Répertoire des profils utilisateur, créé s'il n'existe pas.
    ///
    /// Les profils générés pour les appareils inconnus y sont écrits.
    pub fn get_profile_dir(&self) -> Result<PathBuf> {
        let dir = match self.get_value(&["renderers", "profile_dir"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => DEFAULT_PROFILE_DIR.to_string(),
        };
        let path = self.resolve_dir(&dir);
        if !path.exists() {
            fs::create_dir_all(&path)
                .with_context(|| format!("Cannot create profile directory {}", path.display()))?;
            info!(directory = %path.display(), "Created profile directory");
        }
        Ok(path)
    }

    pub fn set_profile_dir(&self, directory: &str) -> Result<()> {
        self.set_value(&["renderers", "profile_dir"], Value::String(directory.to_string()))
    }

    /// Répertoire des profils livrés avec l'application, s'il est configuré.
    pub fn get_builtin_dir(&self) -> Option<PathBuf> {
        match self.get_value(&["renderers", "builtin_dir"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(self.resolve_dir(s.trim())),
            _ => None,
        }
    }

    pub fn set_builtin_dir(&self, directory: &str) -> Result<()> {
        self.set_value(&["renderers", "builtin_dir"], Value::String(directory.to_string()))
    }

    /// Profile directories in scan order: user profiles first, then the
    /// builtin ones.
    pub fn get_renderers_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = vec![self.get_profile_dir()?];
        if let Some(builtin) = self.get_builtin_dir() {
            dirs.push(builtin);
        }
        Ok(dirs)
    }

    /// Names (or groups) of the enabled profiles.
    ///
    /// Accepts a YAML list or a comma separated string.
    pub fn get_selected_renderers(&self) -> Vec<String> {
        let selected: Vec<String> = match self.get_value(&["renderers", "selected"]) {
            Ok(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .collect(),
            Ok(Value::String(s)) => s.split(',').map(|s| s.trim().to_string()).collect(),
            _ => Vec::new(),
        };
        let selected: Vec<String> = selected.into_iter().filter(|s| !s.is_empty()).collect();
        if selected.is_empty() {
            vec![ALL_RENDERERS.to_string()]
        } else {
            selected
        }
    }

    pub fn set_selected_renderers(&self, names: &[&str]) -> Result<()> {
        let seq = names.iter().map(|n| Value::String(n.to_string())).collect();
        self.set_value(&["renderers", "selected"], Value::Sequence(seq))
    }

    /// Name of the profile used for unrecognized devices, if any.
    pub fn get_default_renderer(&self) -> Option<String> {
        match self.get_value(&["renderers", "default"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn set_default_renderer(&self, name: &str) -> Result<()> {
        self.set_value(&["renderers", "default"], Value::String(name.to_string()))
    }

    impl_bool_config!(
        get_force_default,
        set_force_default,
        &["renderers", "force_default"],
        DEFAULT_FORCE_DEFAULT
    );

    impl_u64_config!(
        get_reload_poll_interval_ms,
        set_reload_poll_interval_ms,
        &["renderers", "reload", "poll_interval_ms"],
        DEFAULT_RELOAD_POLL_INTERVAL_MS
    );

    impl_u64_config!(
        get_ghost_grace_delay_ms,
        set_ghost_grace_delay_ms,
        &["renderers", "ghost", "grace_delay_ms"],
        DEFAULT_GHOST_GRACE_DELAY_MS
    );

    impl_bool_config!(
        get_audio_resample,
        set_audio_resample,
        &["transcode", "audio_resample"],
        DEFAULT_AUDIO_RESAMPLE
    );

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> String {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => DEFAULT_LOG_MIN_LEVEL.to_string(),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: &str) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level.to_string()))
    }
}
