//! TOML-based configuration for ObjectQL.
//!
//! Supports a config file (objectql.toml) with environment variable expansion
//! in every string value.
//!
//! Example configuration:
//! ```toml
//! [validation]
//! max_subquery_depth = 3
//! max_filter_depth = 16
//!
//! [rest]
//! filter_style = "rsql"
//! sort_style = "pipe"
//! cursor_header = "X-Page-Token"
//!
//! [graphql]
//! filter_style = "nested"
//! pagination_style = "relay"
//! default_page_size = 50
//!
//! [odata]
//! version = "v4"
//! include_count = true
//! allowed_functions = ["contains", "startswith", "endswith"]
//!
//! [odata.expand]
//! max_depth = 2
//!
//! [[operators]]
//! operator = "regex"
//! rest = "${REST_REGEX_TOKEN}"
//! graphql = "_regex"
//! odata = "matchesPattern({field},{value})"
//! ```

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::adapter::{AdapterConfig, GraphQLConfig, ODataConfig, RestConfig};
use crate::registry::{OperatorMapping, OperatorRegistry};
use crate::validation::ValidationOptions;

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
    /// Recursion bounds for the validator.
    pub validation: ValidationOptions,

    /// REST encoding options.
    pub rest: RestConfig,

    /// GraphQL encoding options.
    pub graphql: GraphQLConfig,

    /// OData encoding options.
    pub odata: ODataConfig,

    /// Operator mappings added to, or replacing, the canonical set.
    pub operators: Vec<OperatorMapping>,
}

static GLOBAL: OnceCell<Settings> = OnceCell::new();

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Parse TOML text, expanding `${VAR}` references in string values.
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let mut table: toml::Table = toml::from_str(content)?;
        for value in table.iter_mut().map(|(_, v)| v) {
            expand_value(value)?;
        }
        let settings: Settings = toml::Value::Table(table).try_into()?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `OBJECTQL_CONFIG`
    /// 2. `./objectql.toml`
    /// 3. `~/.config/objectql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        // Check environment variable first
        if let Ok(path) = env::var("OBJECTQL_CONFIG") {
            return Self::from_file(&path);
        }

        // Check local directory
        let local_config = PathBuf::from("objectql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("objectql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Process-wide settings, loaded from the default locations on first use.
    pub fn global() -> Result<&'static Settings, SettingsError> {
        GLOBAL.get_or_try_init(Settings::load)
    }

    /// Install process-wide settings. Fails if they were already initialized.
    pub fn init_global(settings: Settings) -> Result<(), SettingsError> {
        GLOBAL
            .set(settings)
            .map_err(|_| SettingsError::InvalidConfig("settings are already initialized".to_string()))
    }

    /// Adapter options for the protocol encoders.
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            rest: self.rest.clone(),
            graphql: self.graphql.clone(),
            odata: self.odata.clone(),
        }
    }

    /// Canonical operators with the configured overrides applied.
    pub fn operator_registry(&self) -> OperatorRegistry {
        self.operators
            .iter()
            .cloned()
            .fold(OperatorRegistry::builder().with_defaults(), |builder, mapping| {
                builder.override_mapping(mapping)
            })
            .build()
    }

    fn check(&self) -> Result<(), SettingsError> {
        if self.validation.max_filter_depth == 0 {
            return Err(SettingsError::InvalidConfig(
                "validation.max_filter_depth must be at least 1".to_string(),
            ));
        }
        for mapping in &self.operators {
            if mapping.operator.trim().is_empty() {
                return Err(SettingsError::InvalidConfig(
                    "operator mappings need a non-empty 'operator'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn expand_value(value: &mut toml::Value) -> Result<(), SettingsError> {
    match value {
        toml::Value::String(s) => *s = expand_env_vars(s)?,
        toml::Value::Array(items) => {
            for item in items {
                expand_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for item in table.iter_mut().map(|(_, v)| v) {
                expand_value(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. OData system options such as `$top`
/// are not valid variable names in config values, so keep them out of
/// expanded strings or write `$$`.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    var_name.push(ch);
                }
                if !closed {
                    return Err(SettingsError::InvalidConfig(format!(
                        "unterminated '${{{}' in '{}'",
                        var_name, s
                    )));
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            }
            _ => {
                // $VAR (ends at non-alphanumeric/underscore)
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    // Just a lone $, keep it
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        }
    }

    Ok(result)
}
