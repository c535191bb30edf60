//! Layered configuration for the facegate workspace.
//!
//! Settings load from `config/default.*`, an optional `config/{env}.*`
//! overlay, then `FACEGATE__<SECTION>__<FIELD>` environment variables
//! (highest priority).

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AuditConfig, BiometricConfig, KeystoreConfig, ObservabilityConfig,
    OrchestratorConfig, PathsConfig, RuntimeEnvironment, ServerConfig, Settings, VoiceConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
