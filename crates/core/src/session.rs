//! Per-shell session configuration.
//!
//! The shell owns one `SessionConfig` and mutates it in response to
//! `/method`, `/model`, `/remote`, ... commands. Each prompt turns it into a
//! [`Submission`], so nothing about "the current profile" is global.

use serde::Serialize;

use crate::profile::{ProfileOverrides, ProfileResolver};
use crate::remote::RemoteRegistry;
use crate::request::{BranchInfo, Submission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub method: String,
    pub overrides: ProfileOverrides,
    pub remote: Option<String>,
    pub replication: u32,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<BranchInfo>,
}

impl SessionConfig {
    /// Fresh session seeded from the config defaults.
    pub fn new(resolver: &ProfileResolver, registry: &RemoteRegistry) -> Self {
        let defaults = resolver.defaults();
        Self {
            method: resolver.default_method().to_string(),
            overrides: ProfileOverrides::default(),
            remote: defaults
                .remote
                .clone()
                .or_else(|| registry.default_remote().map(|r| r.name.clone())),
            replication: 1,
            org: Some(defaults.org()),
            repo: Some(defaults.repo()),
            branch: Some(defaults.branch()),
        }
    }

    pub fn submission(&self, prompt: impl Into<String>) -> Submission {
        Submission {
            prompt: prompt.into(),
            profile: self.method.clone(),
            overrides: self.overrides.clone(),
            remote: self.remote.clone(),
            replication: self.replication,
            org: self.org.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone(),
        }
    }

    /// Key/value view for `/config`. Secrets are masked.
    pub fn settings(&self) -> Vec<SessionSetting> {
        let mut rows = vec![
            SessionSetting::new("method", &self.method),
            SessionSetting::new("remote", self.remote.as_deref().unwrap_or("-")),
            SessionSetting::new("replicas", self.replication.to_string()),
            SessionSetting::new("org", self.org.as_deref().unwrap_or("-")),
            SessionSetting::new("repo", self.repo.as_deref().unwrap_or("-")),
        ];
        if let Some(branch) = &self.branch {
            rows.push(SessionSetting::new("source_branch", &branch.source_branch));
            rows.push(SessionSetting::new("target_branch", &branch.target_branch));
            rows.push(SessionSetting::new("branch_prefix", &branch.branch_prefix));
        }
        if let Some(model) = &self.overrides.model {
            rows.push(SessionSetting::new("model (override)", model));
        }
        if let Some(batch) = self.overrides.batch {
            rows.push(SessionSetting::new("batch (override)", batch.to_string()));
        }
        if let Some(url) = &self.overrides.llm_base_url {
            rows.push(SessionSetting::new("llm_base_url (override)", url));
        }
        if self.overrides.llm_api_key.is_some() {
            rows.push(SessionSetting::new("llm_api_key (override)", "***"));
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSetting {
    pub key: String,
    pub value: String,
}

impl SessionSetting {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
