//! Configuration for imreview
//!
//! Server address, storage location, lock behavior, validation limits, and
//! the identities accepted by the static token provider.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::id::UserId;
use crate::principal::Role;
use crate::user::User;

/// Service-wide configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Database settings
    pub storage: StorageConfig,
    /// Per-manuscript lock settings
    pub concurrency: ConcurrencyConfig,
    /// Input limits
    pub validation: ValidationLimits,
    /// Users and their bearer tokens
    pub identities: Vec<IdentityConfig>,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; state is kept in memory only when absent
    pub database_path: Option<String>,
}

/// Per-manuscript lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// How long one acquisition attempt may wait
    pub lock_timeout_ms: u64,
    /// Attempts after the first timeout before giving up
    pub lock_retries: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            lock_retries: 1,
        }
    }
}

impl ConcurrencyConfig {
    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Length limits for manuscript metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_title_len: usize,
    pub max_abstract_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_title_len: 200,
            max_abstract_len: 3000,
        }
    }
}

/// A seeded user with its bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// User UUID
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    pub token: String,
}

impl IdentityConfig {
    /// Directory entry for this identity
    pub fn user(&self) -> Result<User, ConfigError> {
        let id = UserId::parse(&self.id)
            .map_err(|_| ConfigError::InvalidValue(format!("identity id '{}'", self.id)))?;
        Ok(User {
            id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        })
    }
}

impl ReviewConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load and validate a config file; `.json` files are read as JSON,
    /// anything else as TOML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents)?,
            _ => Self::from_toml(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency.lock_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }

        if self.validation.max_title_len == 0 || self.validation.max_abstract_len == 0 {
            return Err(ConfigError::OutOfRange(
                "validation limits must be positive".to_string(),
            ));
        }

        let mut tokens = HashSet::new();
        let mut ids = HashSet::new();
        for identity in &self.identities {
            if identity.token.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "token for identity '{}'",
                    identity.name
                )));
            }
            if !tokens.insert(identity.token.as_str()) {
                return Err(ConfigError::Duplicate(format!(
                    "token for identity '{}'",
                    identity.name
                )));
            }
            let user = identity.user()?;
            if !ids.insert(user.id) {
                return Err(ConfigError::Duplicate(format!("identity id '{}'", identity.id)));
            }
        }

        Ok(())
    }
}

/// Configuration loading or validation error
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// File could not be read
    Io(String),
    /// File is not valid TOML/JSON for this schema
    Parse(String),
    /// Value is out of valid range
    OutOfRange(String),
    /// Value is malformed
    InvalidValue(String),
    /// Value must be unique
    Duplicate(String),
    /// Required field is missing
    MissingField(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Cannot read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Cannot parse config: {}", msg),
            ConfigError::OutOfRange(msg) => write!(f, "Value out of range: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            ConfigError::Duplicate(msg) => write!(f, "Duplicate value: {}", msg),
            ConfigError::MissingField(msg) => write!(f, "Missing field: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
