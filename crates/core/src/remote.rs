//! Remote endpoint registry.
//!
//! Built once from configuration and read-only afterwards, so it can be
//! shared across tasks behind an `Arc` without locking.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A remote agent execution server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    pub name: String,
    /// Host name or IP. The original config format calls this `ip`.
    #[serde(alias = "ip")]
    pub address: String,
    pub port: u16,
}

impl RemoteEndpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    /// Base URL for HTTP requests against this remote, without trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Name-indexed set of configured remotes, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RemoteRegistry {
    remotes: Vec<RemoteEndpoint>,
}

impl RemoteRegistry {
    /// Build the registry, rejecting duplicate names.
    pub fn new(remotes: Vec<RemoteEndpoint>) -> Result<Self, ConfigError> {
        for (i, remote) in remotes.iter().enumerate() {
            if remotes[..i].iter().any(|r| r.name == remote.name) {
                return Err(ConfigError::DuplicateRemote(remote.name.clone()));
            }
        }
        Ok(Self { remotes })
    }

    pub fn resolve(&self, name: &str) -> Result<&RemoteEndpoint, ConfigError> {
        self.remotes
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ConfigError::UnknownRemote(name.to_string()))
    }

    pub fn list(&self) -> &[RemoteEndpoint] {
        &self.remotes
    }

    /// The first configured remote; what a fresh session targets.
    pub fn default_remote(&self) -> Option<&RemoteEndpoint> {
        self.remotes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }
}
