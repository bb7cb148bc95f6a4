//! Job requests and the submissions they are resolved from.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::{AgentProfile, ProfileOverrides, ProfileResolver};
use crate::remote::{RemoteEndpoint, RemoteRegistry};

/// Git branch metadata forwarded to the remote agent untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub source_branch: String,
    pub target_branch: String,
    pub branch_prefix: String,
}

impl Default for BranchInfo {
    fn default() -> Self {
        Self {
            source_branch: "main".into(),
            target_branch: "main".into(),
            branch_prefix: "agent_router".into(),
        }
    }
}

/// Most job replicas a single submission may create.
pub const MAX_REPLICATION: u32 = 64;

/// What the caller asks for: names, not yet resolved against config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub prompt: String,
    /// Profile (method) name.
    pub profile: String,
    pub overrides: ProfileOverrides,
    /// Target remote; `None` means the first configured remote.
    pub remote: Option<String>,
    /// Number of parallel job instances to create for this prompt.
    pub replication: u32,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<BranchInfo>,
}

impl Submission {
    pub fn new(prompt: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            profile: profile.into(),
            overrides: ProfileOverrides::default(),
            remote: None,
            replication: 1,
            org: None,
            repo: None,
            branch: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn with_replication(mut self, replication: u32) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_overrides(mut self, overrides: ProfileOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve profile and remote into a [`JobRequest`].
    pub fn resolve(
        &self,
        resolver: &ProfileResolver,
        registry: &RemoteRegistry,
    ) -> Result<JobRequest, ConfigError> {
        let profile = resolver.resolve(&self.profile, &self.overrides)?;
        let remote = match &self.remote {
            Some(name) => registry.resolve(name)?,
            None => registry.default_remote().ok_or(ConfigError::NoRemotes)?,
        };
        Ok(JobRequest {
            prompt: self.prompt.clone(),
            profile: Arc::new(profile),
            target_remote: Arc::new(remote.clone()),
            org: self.org.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone(),
        })
    }
}

/// A resolved request for one job. Cheap to clone: profile and remote are shared.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub prompt: String,
    pub profile: Arc<AgentProfile>,
    pub target_remote: Arc<RemoteEndpoint>,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<BranchInfo>,
}
