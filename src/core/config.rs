//! TOML configuration loading
//!
//! Settings come from an optional TOML file, discovered at the platform
//! config directory when not given explicitly, and are then overridden by
//! command-line flags. Keys are addressed by dotted path (`queue.provider`),
//! whether the file spells them as nested tables, dotted keys or quoted keys.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consumer::OrchestratorSettings;
use crate::core::error_handling::ContextualError;
use crate::producer::BrokerSettings;

/// Provider used when `queue.provider` is not configured
pub const DEFAULT_PROVIDER: &str = "memory";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The specified configuration file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Error reading configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error parsing configuration {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ConfigError::Read { .. })
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Logging options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<PathBuf>,
}

/// SQS client overrides; credentials always come from the AWS chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqsSettings {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Fully resolved application settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Transport provider name (`queue.provider`), case-sensitive
    pub provider: String,
    pub broker: BrokerSettings,
    pub listeners: OrchestratorSettings,
    pub log: LogSettings,
    pub sqs: SqsSettings,
    properties: toml::Table,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            broker: BrokerSettings::default(),
            listeners: OrchestratorSettings::default(),
            log: LogSettings::default(),
            sqs: SqsSettings::default(),
            properties: toml::Table::new(),
        }
    }
}

impl Settings {
    /// Default configuration file location, if the platform has one
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Qrelay").join("qrelay.toml"))
    }

    /// Load settings from `config_file`, or from the default location if present
    ///
    /// An explicitly named file must exist; a missing default file simply
    /// yields default settings.
    pub async fn load(config_file: Option<&Path>) -> ConfigResult<Self> {
        let path = match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                Some(path.to_path_buf())
            }
            None => Self::default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                let table = contents
                    .parse::<toml::Table>()
                    .map_err(|source| ConfigError::Parse {
                        origin: path.display().to_string(),
                        source,
                    })?;
                Self::from_table(table)
            }
            None => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let table = contents
            .parse::<toml::Table>()
            .map_err(|source| ConfigError::Parse {
                origin: "<inline>".to_string(),
                source,
            })?;
        Self::from_table(table)
    }

    /// Build settings from a parsed TOML table
    pub fn from_table(table: toml::Table) -> ConfigResult<Self> {
        let mut settings = Self {
            properties: table,
            ..Self::default()
        };
        settings.apply_toml_values()?;
        Ok(settings)
    }

    fn apply_toml_values(&mut self) -> ConfigResult<()> {
        if let Some(provider) = self.string_value("queue.provider")? {
            if provider.trim().is_empty() {
                return Err(invalid("queue.provider", "must not be empty"));
            }
            self.provider = provider;
        }
        if let Some(name) = self.string_value("application.name")? {
            self.broker.application_name = name;
        }

        if let Some(secs) = self.integer_value("broker.reply_timeout_secs")? {
            self.broker.reply_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.integer_value("broker.queue_url_wait_secs")? {
            self.broker.queue_url_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.integer_value("broker.orphan_ttl_secs")? {
            self.broker.orphan_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.integer_value("broker.long_poll_secs")? {
            self.broker.long_poll_seconds = secs;
        }
        if let Some(attempts) = self.integer_value("broker.create_attempts")? {
            if attempts == 0 {
                return Err(invalid("broker.create_attempts", "must be at least 1"));
            }
            self.broker.create_attempts = attempts as usize;
        }

        if let Some(secs) = self.integer_value("listeners.failure_suspension_secs")? {
            self.listeners.failure_suspension = Duration::from_secs(secs);
        }
        if let Some(ms) = self.integer_value("listeners.idle_yield_ms")? {
            self.listeners.idle_yield = Duration::from_millis(ms);
        }
        if let Some(secs) = self.integer_value("listeners.long_poll_secs")? {
            self.listeners.long_poll_seconds = secs;
        }

        self.log.level = self.string_value("log.level")?;
        self.log.format = self.string_value("log.format")?;
        self.log.file = self.string_value("log.file")?.map(PathBuf::from);

        self.sqs.region = self.string_value("sqs.region")?;
        self.sqs.endpoint_url = self.string_value("sqs.endpoint_url")?;
        Ok(())
    }

    /// Apply command-line overrides on top of file values
    pub fn apply_overrides(&mut self, provider: Option<&str>, application_name: Option<&str>) {
        if let Some(provider) = provider {
            self.provider = provider.to_string();
        }
        if let Some(name) = application_name {
            self.broker.application_name = name.to_string();
        }
    }

    /// Look up a raw configuration value by dotted path
    pub fn property_value(&self, key: &str) -> Option<&toml::Value> {
        lookup(&self.properties, key)
    }

    /// Look up a string property by dotted path, e.g. `twoways.queue.url`
    pub fn property(&self, key: &str) -> Option<&str> {
        self.property_value(key).and_then(|v| v.as_str())
    }

    /// Set a string property, shadowing any nested value at the same path
    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties
            .insert(key.to_string(), toml::Value::String(value.into()));
    }

    fn string_value(&self, key: &str) -> ConfigResult<Option<String>> {
        match self.property_value(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(invalid(
                key,
                &format!("expected a string, found {}", other.type_str()),
            )),
        }
    }

    fn integer_value(&self, key: &str) -> ConfigResult<Option<u64>> {
        match self.property_value(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) if *i >= 0 => Ok(Some(*i as u64)),
            Some(toml::Value::Integer(i)) => Err(invalid(
                key,
                &format!("expected a non-negative integer, found {}", i),
            )),
            Some(other) => Err(invalid(
                key,
                &format!("expected an integer, found {}", other.type_str()),
            )),
        }
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Resolve a dotted key, preferring a literal (quoted) top-level key
fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    if let Some(value) = table.get(key) {
        return Some(value);
    }
    let mut segments = key.split('.');
    let mut current = table.get(segments.next()?)?;
    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }
    Some(current)
}
