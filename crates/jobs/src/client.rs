//! `RemoteClient` trait defining the outbound protocol to agent servers.

use std::future::Future;
use std::time::Duration;

use agent_cli_core::{JobRequest, RemoteEndpoint};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Body of `POST /submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitPayload {
    pub prompt: String,
    pub method: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_prefix: Option<String>,
}

impl From<&JobRequest> for SubmitPayload {
    fn from(request: &JobRequest) -> Self {
        let profile = &request.profile;
        let branch = request.branch.as_ref();
        Self {
            prompt: request.prompt.clone(),
            method: profile.method.to_string(),
            model: profile.model.clone(),
            llm_base_url: profile.llm_base_url.clone(),
            llm_api_key: profile.llm_api_key.as_ref().map(|k| k.expose().to_string()),
            org: request.org.clone(),
            repo: request.repo.clone(),
            source_branch: branch.map(|b| b.source_branch.clone()),
            target_branch: branch.map(|b| b.target_branch.clone()),
            branch_prefix: branch.map(|b| b.branch_prefix.clone()),
        }
    }
}

/// What a remote says about a job it accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Running,
    Succeeded { result: Option<String> },
    Failed { error: Option<String> },
}

/// Errors talking to a remote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Connection to {remote} failed: {message}")]
    Transport { remote: String, message: String },

    #[error("Request to {remote} timed out after {}s", .timeout.as_secs())]
    Timeout { remote: String, timeout: Duration },

    #[error("{remote} returned HTTP {status}: {body}")]
    Http {
        remote: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {remote}: {message}")]
    Decode { remote: String, message: String },
}

/// Outbound transport to remote agent servers.
///
/// Implementations:
/// - `HttpRemoteClient`: JSON over HTTP via reqwest
/// - in-memory scripted remotes in tests
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Submit a job. Returns the remote's external job token.
    async fn submit(
        &self,
        remote: &RemoteEndpoint,
        payload: &SubmitPayload,
    ) -> Result<String, RemoteError>;

    async fn status(&self, remote: &RemoteEndpoint, token: &str)
        -> Result<RemoteStatus, RemoteError>;

    /// Ask the remote to abandon a job. Best-effort.
    async fn cancel(&self, remote: &RemoteEndpoint, token: &str) -> Result<(), RemoteError>;

    /// The remote's own request ledger, as raw JSON records.
    async fn list_requests(
        &self,
        remote: &RemoteEndpoint,
    ) -> Result<Vec<serde_json::Value>, RemoteError>;
}

/// Run a remote call with an upper bound on how long it may take.
pub async fn bounded<T>(
    timeout: Duration,
    remote: &RemoteEndpoint,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout {
            remote: remote.name.clone(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_cli_core::{AgentMethod, AgentProfile, ApiKey, BranchInfo};
    use std::sync::Arc;

    fn request() -> JobRequest {
        JobRequest {
            prompt: "add tests".into(),
            profile: Arc::new(AgentProfile {
                method: AgentMethod::SweAgentAnth,
                batch: 2,
                model: "claude-sonnet".into(),
                llm_base_url: None,
                llm_api_key: Some(ApiKey::new("sk-1")),
            }),
            target_remote: Arc::new(RemoteEndpoint::new("box", "127.0.0.1", 8000)),
            org: Some("acme".into()),
            repo: None,
            branch: Some(BranchInfo::default()),
        }
    }

    #[test]
    fn test_payload_from_request() {
        let payload = SubmitPayload::from(&request());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["method"], "swe_agent_anth");
        assert_eq!(json["model"], "claude-sonnet");
        assert_eq!(json["llm_api_key"], "sk-1");
        assert_eq!(json["org"], "acme");
        assert_eq!(json["branch_prefix"], "agent_router");
        assert!(json.get("repo").is_none());
        assert!(json.get("llm_base_url").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let remote = RemoteEndpoint::new("slow", "127.0.0.1", 1);
        let err = bounded(
            Duration::from_secs(2),
            &remote,
            std::future::pending::<Result<(), RemoteError>>(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Timeout {
                remote: "slow".into(),
                timeout: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let remote = RemoteEndpoint::new("fast", "127.0.0.1", 1);
        let value = bounded(Duration::from_secs(2), &remote, async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
