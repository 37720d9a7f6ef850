//! # Configuration
//!
//! The backend is configured from a TOML file. Every field has a default, so an
//! empty file is a valid configuration:
//!
//! ```toml
//! files_class = "files"
//! allowed_paths = ["/users", "/users/{id}"]
//!
//! [keys]
//! master_key = "change-me"
//! master_key_header = "Master-Key"
//!
//! [actor_tree]
//! enabled = true
//! mailbox_size = 64
//! idle_timeout_ms = 30000
//!
//! [filtered_fields]
//! users = ["password"]
//! ```
//!
//! When `master_key` is omitted a random key is generated at startup.

use crate::actors::TreeSettings;
use crate::executor::DEFAULT_FILES_CLASS;
use crate::providers::keys::DEFAULT_MASTER_KEY_HEADER;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Class whose collection stores raw file bodies.
    pub files_class: String,
    pub keys: KeysConfig,
    pub actor_tree: ActorTreeConfig,
    /// Templates accepted by the path validator. Empty disables path validation.
    pub allowed_paths: Vec<String>,
    /// Fields stripped from responses, per class.
    pub filtered_fields: HashMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            files_class: DEFAULT_FILES_CLASS.to_string(),
            keys: KeysConfig::default(),
            actor_tree: ActorTreeConfig::default(),
            allowed_paths: Vec::new(),
            filtered_fields: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub master_key: Option<String>,
    pub master_key_header: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            master_key_header: DEFAULT_MASTER_KEY_HEADER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActorTreeConfig {
    pub enabled: bool,
    pub mailbox_size: usize,
    pub idle_timeout_ms: u64,
}

impl Default for ActorTreeConfig {
    fn default() -> Self {
        let settings = TreeSettings::default();
        Self {
            enabled: false,
            mailbox_size: settings.mailbox_size,
            idle_timeout_ms: settings.idle_timeout.as_millis() as u64,
        }
    }
}

impl ActorTreeConfig {
    pub fn settings(&self) -> TreeSettings {
        TreeSettings {
            mailbox_size: self.mailbox_size,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.files_class.trim().is_empty() {
            errors.push("files_class must not be empty".to_string());
        }
        if self.keys.master_key_header.trim().is_empty() {
            errors.push("keys.master_key_header must not be empty".to_string());
        }
        if matches!(self.keys.master_key.as_deref(), Some(key) if key.is_empty()) {
            errors.push("keys.master_key must not be empty when set".to_string());
        }
        if self.actor_tree.mailbox_size == 0 {
            errors.push("actor_tree.mailbox_size must be greater than 0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Config::from_toml(&content)
}
