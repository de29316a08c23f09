//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
///
/// Also raised by the resilience components when they are constructed with
/// values they cannot honour; such errors are fatal and never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid environment variable {var}: {message}")]
    Env { var: String, message: String },

    /// A value outside what a component accepts
    #[error("Invalid {domain} configuration: {message}")]
    Invalid { domain: String, message: String },
}

impl ConfigError {
    /// Domain the invalid value belongs to, if any
    pub fn domain(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { domain, .. } => Some(domain),
            _ => None,
        }
    }

    /// Environment variable that failed to parse, if any
    pub fn env_var(&self) -> Option<&str> {
        match self {
            ConfigError::Env { var, .. } => Some(var),
            _ => None,
        }
    }
}
