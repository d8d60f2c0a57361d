//! Configuration module for ObjectQL.
//!
//! Handles the settings file, environment variables, and operator overrides.

mod settings;

pub use settings::{expand_env_vars, Settings, SettingsError};
