// crates/core/src/config.rs
//! Configuration file model and loader.
//!
//! ```yaml
//! defaults:
//!   method: swe_agent_default
//!   model: gpt-4
//!   org: interactive
//!   repo: cli
//! agents:
//!   - method: open_hands
//!     batch: 3
//!     model: claude-sonnet
//!     llm_api_key: "${OPENHANDS_KEY}"
//! remotes:
//!   - name: gpu-box
//!     ip: 10.0.0.5
//!     port: 8000
//! polling:
//!   interval_secs: 3
//! ```
//!
//! Unknown keys are ignored. A missing file loads as an empty config; a
//! present but unreadable or malformed file is an error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::{AgentMethod, ApiKey, ProfileConfig, ProfileResolver};
use crate::remote::{RemoteEndpoint, RemoteRegistry};
use crate::request::BranchInfo;

pub const DEFAULT_CONFIG_FILE: &str = "agent_config.yaml";

/// The `defaults` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub method: Option<AgentMethod>,
    pub model: Option<String>,
    pub batch: Option<u32>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<ApiKey>,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    pub branch_prefix: Option<String>,
    /// Remote a fresh session targets; first configured remote if unset.
    pub remote: Option<String>,
}

impl Defaults {
    pub fn method(&self) -> AgentMethod {
        self.method.clone().unwrap_or(AgentMethod::SweAgentDefault)
    }

    pub fn org(&self) -> String {
        self.org.clone().unwrap_or_else(|| "interactive".into())
    }

    pub fn repo(&self) -> String {
        self.repo.clone().unwrap_or_else(|| "cli".into())
    }

    pub fn branch(&self) -> BranchInfo {
        let fallback = BranchInfo::default();
        BranchInfo {
            source_branch: self.source_branch.clone().unwrap_or(fallback.source_branch),
            target_branch: self.target_branch.clone().unwrap_or(fallback.target_branch),
            branch_prefix: self.branch_prefix.clone().unwrap_or(fallback.branch_prefix),
        }
    }
}

/// The `polling` section. All durations in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// Consecutive failed polls tolerated before a job fails.
    pub max_poll_failures: u32,
    pub max_backoff_secs: u64,
    pub job_timeout_secs: u64,
    /// Bound on each individual submit/status/cancel request.
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            max_poll_failures: 5,
            max_backoff_secs: 30,
            job_timeout_secs: 3600,
            request_timeout_secs: 10,
        }
    }
}

impl PollingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("interval_secs", self.interval_secs),
            ("max_poll_failures", u64::from(self.max_poll_failures)),
            ("job_timeout_secs", self.job_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::InvalidPolling {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.max_backoff_secs < self.interval_secs {
            return Err(ConfigError::InvalidPolling {
                field: "max_backoff_secs",
                reason: format!(
                    "{} is below interval_secs {}",
                    self.max_backoff_secs, self.interval_secs
                ),
            });
        }
        Ok(())
    }
}

/// The whole config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub defaults: Defaults,
    pub agents: Vec<ProfileConfig>,
    pub remotes: Vec<RemoteEndpoint>,
    pub polling: PollingConfig,
}

impl AppConfig {
    /// Load and validate a config file. A missing file is an empty config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::io(path, e)),
        };
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::MalformedYaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        let config = config.expand_env()?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            agents = config.agents.len(),
            remotes = config.remotes.len(),
            "config loaded"
        );
        Ok(config)
    }

    /// Check everything the registry/resolver would reject, up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry()?;
        self.resolver()?;
        self.polling.validate()?;
        if let Some(remote) = &self.defaults.remote {
            self.registry()?.resolve(remote)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<RemoteRegistry, ConfigError> {
        RemoteRegistry::new(self.remotes.clone())
    }

    pub fn resolver(&self) -> Result<ProfileResolver, ConfigError> {
        ProfileResolver::new(self.defaults.clone(), self.agents.clone())
    }

    /// Replace `${VAR}` API keys with the environment variable's value.
    fn expand_env(mut self) -> Result<Self, ConfigError> {
        if let Some(key) = &self.defaults.llm_api_key {
            self.defaults.llm_api_key = Some(expand_key("defaults.llm_api_key", key)?);
        }
        for agent in &mut self.agents {
            if let Some(key) = &agent.llm_api_key {
                let field = format!("agents.{}.llm_api_key", agent.method);
                agent.llm_api_key = Some(expand_key(&field, key)?);
            }
        }
        Ok(self)
    }
}

fn expand_key(field: &str, key: &ApiKey) -> Result<ApiKey, ConfigError> {
    let raw = key.expose();
    let Some(var) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) else {
        return Ok(key.clone());
    };
    std::env::var(var)
        .map(ApiKey::new)
        .map_err(|_| ConfigError::MissingEnv {
            field: field.to_string(),
            var: var.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
defaults:
  method: aider
  model: gpt-4o
  org: acme
  source_branch: develop
agents:
  - method: aider
    batch: 2
  - method: open_hands
    batch: 3
    model: claude-sonnet
    llm_base_url: https://llm.example
remotes:
  - name: gpu-box
    ip: 10.0.0.5
    port: 8000
  - name: local
    address: 127.0.0.1
    port: 9000
polling:
  interval_secs: 1
  max_poll_failures: 2
extra_key_from_newer_version: true
"#;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_sample() {
        let file = write_config(SAMPLE);
        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.defaults.method(), AgentMethod::Aider);
        assert_eq!(config.defaults.org(), "acme");
        assert_eq!(config.defaults.repo(), "cli");
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.remotes[0].address, "10.0.0.5");
        assert_eq!(config.remotes[1].address, "127.0.0.1");
        assert_eq!(config.polling.interval_secs, 1);
        assert_eq!(config.polling.max_poll_failures, 2);
        // Unset polling fields keep their defaults.
        assert_eq!(config.polling.job_timeout_secs, 3600);

        let branch = config.defaults.branch();
        assert_eq!(branch.source_branch, "develop");
        assert_eq!(branch.target_branch, "main");
        assert_eq!(branch.branch_prefix, "agent_router");
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("nope.yaml")).unwrap();
        assert!(config.agents.is_empty());
        assert!(config.remotes.is_empty());
        assert_eq!(config.polling, PollingConfig::default());
    }

    #[test]
    fn test_empty_file_is_empty_config() {
        let file = write_config("   \n");
        let config = AppConfig::load(file.path()).unwrap();
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let file = write_config("agents: [unterminated");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedYaml { .. }));
    }

    #[test]
    fn test_duplicate_remote_is_error() {
        let file = write_config(
            "remotes:\n  - {name: a, ip: h1, port: 1}\n  - {name: a, ip: h2, port: 2}\n",
        );
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRemote(_)));
    }

    #[test]
    fn test_zero_batch_is_error() {
        let file = write_config("agents:\n  - method: aider\n    batch: 0\n");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBatch { .. }));
    }

    #[test]
    fn test_zero_interval_is_error() {
        let file = write_config("polling:\n  interval_secs: 0\n");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPolling {
                field: "interval_secs",
                ..
            }
        ));
    }

    #[test]
    fn test_default_remote_must_exist() {
        let file = write_config(
            "defaults:\n  remote: missing\nremotes:\n  - {name: a, ip: h1, port: 1}\n",
        );
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRemote(name) if name == "missing"));
    }

    #[test]
    fn test_api_key_env_expansion() {
        std::env::set_var("AGENT_CLI_TEST_KEY_EXPAND", "sk-from-env");
        let file = write_config(
            "agents:\n  - method: aider\n    llm_api_key: \"${AGENT_CLI_TEST_KEY_EXPAND}\"\n",
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(
            config.agents[0].llm_api_key.as_ref().unwrap().expose(),
            "sk-from-env"
        );
    }

    #[test]
    fn test_api_key_missing_env_is_error() {
        let file = write_config(
            "defaults:\n  llm_api_key: \"${AGENT_CLI_TEST_KEY_DEFINITELY_UNSET}\"\n",
        );
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnv { var, .. } if var == "AGENT_CLI_TEST_KEY_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn test_literal_api_key_untouched() {
        let file = write_config("defaults:\n  llm_api_key: sk-literal\n");
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(
            config.defaults.llm_api_key.as_ref().unwrap().expose(),
            "sk-literal"
        );
    }
}
