//! TOML-based configuration for rowmap.
//!
//! Supports a config file (rowmap.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [database]
//! path = "${DATA_DIR}/results.db"   # used when --db is not given
//! busy_timeout_ms = 5000
//! foreign_keys = false
//!
//! [input]
//! delimiter = ","
//! infer_types = true
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! timestamps = false
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::input::InputOptions;
use crate::logging::LogFormat;
use crate::session::SessionOptions;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ROWMAP_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub input: InputSettings,
    pub logging: LoggingSettings,
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Default database path (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// How long to wait on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Enforce foreign keys on the connection.
    pub foreign_keys: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5000,
            foreign_keys: false,
        }
    }
}

impl DatabaseSettings {
    /// The configured path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            foreign_keys: self.foreign_keys,
        }
    }
}

/// Input file settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InputSettings {
    /// Single-character field delimiter.
    pub delimiter: String,

    /// Type numeric columns instead of keeping every cell as text.
    pub infer_types: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            infer_types: true,
        }
    }
}

impl InputSettings {
    pub fn input_options(&self) -> Result<InputOptions, SettingsError> {
        let delimiter = match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => *b,
            _ => {
                return Err(SettingsError::InvalidConfig(format!(
                    "input.delimiter must be a single ASCII character, got '{}'",
                    self.delimiter
                )))
            }
        };
        Ok(InputOptions {
            delimiter,
            infer_types: self.infer_types,
        })
    }
}

/// Logging settings. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// error, warn, info, debug or trace.
    pub level: String,

    /// pretty, compact or json.
    pub format: String,

    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            timestamps: false,
        }
    }
}

impl LoggingSettings {
    pub fn level(&self) -> Result<tracing::Level, SettingsError> {
        self.level.parse().map_err(|_| {
            SettingsError::InvalidConfig(format!("unknown logging.level '{}'", self.level))
        })
    }

    pub fn format(&self) -> Result<LogFormat, SettingsError> {
        self.format.parse().map_err(|_| {
            SettingsError::InvalidConfig(format!("unknown logging.format '{}'", self.format))
        })
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from an explicit path or the default locations.
    ///
    /// Searches in order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. Environment variable `ROWMAP_CONFIG`
    /// 3. `./rowmap.toml`
    /// 4. `~/.config/rowmap/config.toml`
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        // Check environment variable first
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        // Check local directory
        let local_config = PathBuf::from("rowmap.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rowmap").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            // ${VAR}: everything up to the closing brace
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            // $VAR (ends at non-alphanumeric/underscore)
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
