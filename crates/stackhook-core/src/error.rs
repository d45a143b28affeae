//! Error types for stackhook

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid type key '{0}': expected Kind.group/version")]
    InvalidTypeKey(String),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("unrecognized engine '{0}'")]
    UnrecognizedEngine(String),

    #[error("engine configuration error: {engine} - {message}")]
    EngineConfig { engine: String, message: String },

    #[error("no artifact source configured for {0}")]
    MissingArtifactSource(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("registration failed for {type_key}: {message}")]
    Registration { type_key: String, message: String },

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn engine_config(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EngineConfig {
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn registration(type_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registration {
            type_key: type_key.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Object-store and deadline failures. The substrate may redeliver the event.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Cluster(_) | Self::DeadlineExceeded(_) | Self::Io(_) | Self::Registration { .. }
        )
    }

    /// Author mistakes in the catalog. Retrying cannot fix these.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidTypeKey(_)
                | Self::UnrecognizedEngine(_)
                | Self::EngineConfig { .. }
                | Self::MissingArtifactSource(_)
                | Self::Config(_)
        )
    }
}
