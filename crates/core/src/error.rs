// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading configuration or resolving a profile/remote.
///
/// These are configuration-time errors: they surface synchronously to the
/// caller and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown remote: {0}")]
    UnknownRemote(String),

    #[error("No remotes configured")]
    NoRemotes,

    #[error("Unknown agent method: {0}")]
    UnknownMethod(String),

    #[error("Duplicate remote name: {0}")]
    DuplicateRemote(String),

    #[error("Duplicate agent profile: {0}")]
    DuplicateProfile(String),

    #[error("Agent profile {profile} has batch 0; batch must be at least 1")]
    InvalidBatch { profile: String },

    #[error("Invalid polling setting {field}: {reason}")]
    InvalidPolling { field: &'static str, reason: String },

    #[error("Environment variable {var} referenced by {field} is not set")]
    MissingEnv { field: String, var: String },

    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed YAML in config {path}: {source}")]
    MalformedYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by a name the caller typed (remote, method),
    /// as opposed to a broken config file.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::UnknownRemote(_) | Self::UnknownMethod(_) | Self::NoRemotes
        )
    }
}
