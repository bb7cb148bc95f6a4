//! Agent profiles and the resolver that layers overrides over them.
//!
//! Precedence for every field is: per-call override, then the named profile
//! from the `agents` list, then `defaults`, then a built-in fallback.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Defaults;
use crate::error::ConfigError;

/// Model used when neither a profile nor the defaults name one.
pub const FALLBACK_MODEL: &str = "gpt-4";
/// Concurrency cap used when neither a profile nor the defaults set one.
pub const FALLBACK_BATCH: u32 = 1;

/// Remote agent implementation a job runs under.
///
/// Unrecognised names round-trip through `Custom` so a remote can offer new
/// agent types without a client release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentMethod {
    OpenHands,
    Aider,
    SweAgentAnth,
    SweAgentDefault,
    Custom(String),
}

impl AgentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenHands => "open_hands",
            Self::Aider => "aider",
            Self::SweAgentAnth => "swe_agent_anth",
            Self::SweAgentDefault => "swe_agent_default",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for AgentMethod {
    fn from(s: &str) -> Self {
        match s {
            "open_hands" => Self::OpenHands,
            "aider" => Self::Aider,
            "swe_agent_anth" => Self::SweAgentAnth,
            "swe_agent_default" => Self::SweAgentDefault,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for AgentMethod {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<AgentMethod> for String {
    fn from(m: AgentMethod) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for AgentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An LLM API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// One entry of the `agents` config list. Unset fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub method: AgentMethod,
    #[serde(default)]
    pub batch: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub llm_api_key: Option<ApiKey>,
}

impl ProfileConfig {
    pub fn new(method: AgentMethod) -> Self {
        Self {
            method,
            batch: None,
            model: None,
            llm_base_url: None,
            llm_api_key: None,
        }
    }
}

/// Per-call overrides from the shell (`/model`, `/batch`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOverrides {
    pub model: Option<String>,
    pub batch: Option<u32>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<ApiKey>,
}

impl ProfileOverrides {
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.batch.is_none()
            && self.llm_base_url.is_none()
            && self.llm_api_key.is_none()
    }
}

/// A fully resolved, immutable agent profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub method: AgentMethod,
    /// Concurrency cap: maximum jobs of this profile in flight at once.
    pub batch: u32,
    pub model: String,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<ApiKey>,
}

impl AgentProfile {
    /// Profiles are keyed by method name for slot accounting.
    pub fn name(&self) -> &str {
        self.method.as_str()
    }
}

/// Resolves method names to [`AgentProfile`]s. Pure: holds only config.
#[derive(Debug, Clone, Default)]
pub struct ProfileResolver {
    defaults: Defaults,
    profiles: Vec<ProfileConfig>,
}

impl ProfileResolver {
    pub fn new(defaults: Defaults, profiles: Vec<ProfileConfig>) -> Result<Self, ConfigError> {
        let mut seen: Vec<&AgentMethod> = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            let method = &profile.method;
            if seen.contains(&method) {
                return Err(ConfigError::DuplicateProfile(method.to_string()));
            }
            if profile.batch == Some(0) {
                return Err(ConfigError::InvalidBatch {
                    profile: method.to_string(),
                });
            }
            seen.push(method);
        }
        if defaults.batch == Some(0) {
            return Err(ConfigError::InvalidBatch {
                profile: "defaults".into(),
            });
        }
        Ok(Self { defaults, profiles })
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Method a fresh session uses.
    pub fn default_method(&self) -> AgentMethod {
        self.defaults.method()
    }

    /// Names of the configured profiles, in config order.
    pub fn profiles(&self) -> impl Iterator<Item = &AgentMethod> {
        self.profiles.iter().map(|p| &p.method)
    }

    pub fn resolve(
        &self,
        method_name: &str,
        overrides: &ProfileOverrides,
    ) -> Result<AgentProfile, ConfigError> {
        let method = AgentMethod::from(method_name);
        let named = self.profiles.iter().find(|p| p.method == method);

        if named.is_none() && method != self.defaults.method() {
            return Err(ConfigError::UnknownMethod(method_name.to_string()));
        }
        let d = &self.defaults;

        let batch = overrides
            .batch
            .or_else(|| named.and_then(|p| p.batch))
            .or(d.batch)
            .unwrap_or(FALLBACK_BATCH);
        if batch == 0 {
            return Err(ConfigError::InvalidBatch {
                profile: method_name.to_string(),
            });
        }

        Ok(AgentProfile {
            batch,
            model: overrides
                .model
                .clone()
                .or_else(|| named.and_then(|p| p.model.clone()))
                .or_else(|| d.model.clone())
                .unwrap_or_else(|| FALLBACK_MODEL.to_string()),
            llm_base_url: overrides
                .llm_base_url
                .clone()
                .or_else(|| named.and_then(|p| p.llm_base_url.clone()))
                .or_else(|| d.llm_base_url.clone()),
            llm_api_key: overrides
                .llm_api_key
                .clone()
                .or_else(|| named.and_then(|p| p.llm_api_key.clone()))
                .or_else(|| d.llm_api_key.clone()),
            method,
        })
    }
}
