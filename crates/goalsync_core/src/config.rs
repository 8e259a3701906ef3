//! Engine configuration.
//!
//! # Responsibility
//! - Parse the JSON configuration shared by the CLI and FFI hosts.
//! - Validate bucket names, log level and fetch order before use.
//!
//! # Invariants
//! - A loaded config is always validated; invalid values never reach the engine.
//! - Missing keys fall back to defaults.

use crate::bucket::{BucketPredicate, DONE, KNOWN_BUCKETS, OVERDUE, TODAY};
use crate::logging::{default_log_level, parse_level};
use crate::model::document::CREATED_AT_FIELD;
use crate::pipeline::ViewOptions;
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "GOALSYNC_CONFIG";

/// Configuration load/validation error.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    InvalidLogLevel(String),
    UnknownBucket(String),
    EmptyOrderField,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
            Self::UnknownBucket(name) => write!(
                f,
                "unknown bucket `{name}`; expected one of {}",
                KNOWN_BUCKETS.join("|")
            ),
            Self::EmptyOrderField => write!(f, "order_field must not be empty"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings for one engine host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub log_level: String,
    /// Absolute directory for rolling logs; logging stays off when absent.
    pub log_dir: Option<String>,
    /// Field every change feed is ordered by.
    pub order_field: String,
    pub default_view: ViewOptions,
    /// Buckets computed by live views, in display order.
    pub bucket_names: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            order_field: CREATED_AT_FIELD.to_string(),
            default_view: ViewOptions::default(),
            bucket_names: [TODAY, OVERDUE, DONE].map(str::to_string).to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        info!("event=config_load module=config status=ok source=file");
        Ok(config)
    }

    /// Loads the file named by `GOALSYNC_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => {
                info!("event=config_load module=config status=ok source=defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_level(&self.log_level).map_err(ConfigError::InvalidLogLevel)?;
        if self.order_field.trim().is_empty() {
            return Err(ConfigError::EmptyOrderField);
        }
        if let Some(name) = self
            .bucket_names
            .iter()
            .find(|name| BucketPredicate::named(name).is_none())
        {
            return Err(ConfigError::UnknownBucket(name.clone()));
        }
        Ok(())
    }

    /// Predicates for `bucket_names`, skipping any that do not resolve.
    pub fn predicates(&self) -> Vec<BucketPredicate> {
        self.bucket_names
            .iter()
            .filter_map(|name| BucketPredicate::named(name))
            .collect()
    }
}
