//! Configuration module for rowmap.
//!
//! Handles the optional TOML settings file and environment variables.

mod settings;

pub use settings::{
    expand_env_vars, DatabaseSettings, InputSettings, LoggingSettings, Settings, SettingsError,
    CONFIG_ENV_VAR,
};
