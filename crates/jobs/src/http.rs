// crates/jobs/src/http.rs
//! HTTP remote client speaking JSON against `http://{address}:{port}`.
//!
//! Endpoints:
//! - `POST /submit` → `{"external_job_token": ...}` (older servers: `request_id`)
//! - `GET /status/{token}` → `{"state": "running" | "succeeded" | "failed", ...}`
//! - `POST /cancel/{token}`
//! - `GET /status/requests` → `[ {...}, ... ]`
//!
//! A submit response carrying the token `requests` is rejected, since its
//! status URL would be the request ledger.

use std::time::Duration;

use agent_cli_core::RemoteEndpoint;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::client::{RemoteClient, RemoteError, RemoteStatus, SubmitPayload};

/// Remote client backed by a shared `reqwest::Client`.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRemoteClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    fn transport_error(&self, remote: &RemoteEndpoint, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                remote: remote.name.clone(),
                timeout: self.timeout,
            }
        } else {
            RemoteError::Transport {
                remote: remote.name.clone(),
                message: e.to_string(),
            }
        }
    }

    /// Read the body, failing on non-2xx, and parse it as JSON.
    async fn read_json(
        &self,
        remote: &RemoteEndpoint,
        response: reqwest::Response,
    ) -> Result<Value, RemoteError> {
        let body = self.read_body(remote, response).await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode {
            remote: remote.name.clone(),
            message: e.to_string(),
        })
    }

    async fn read_body(
        &self,
        remote: &RemoteEndpoint,
        response: reqwest::Response,
    ) -> Result<String, RemoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(remote, e))?;
        if !status.is_success() {
            return Err(RemoteError::Http {
                remote: remote.name.clone(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn submit(
        &self,
        remote: &RemoteEndpoint,
        payload: &SubmitPayload,
    ) -> Result<String, RemoteError> {
        let url = format!("{}/submit", remote.base_url());
        tracing::debug!(remote = %remote.name, %url, method = %payload.method, "submitting job");
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(remote, e))?;
        let body = self.read_json(remote, response).await?;
        parse_token(remote, &body)
    }

    async fn status(
        &self,
        remote: &RemoteEndpoint,
        token: &str,
    ) -> Result<RemoteStatus, RemoteError> {
        let url = format!("{}/status/{}", remote.base_url(), urlencoding::encode(token));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(remote, e))?;
        let body = self.read_json(remote, response).await?;
        parse_status(remote, body)
    }

    async fn cancel(&self, remote: &RemoteEndpoint, token: &str) -> Result<(), RemoteError> {
        let url = format!("{}/cancel/{}", remote.base_url(), urlencoding::encode(token));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(remote, e))?;
        self.read_body(remote, response).await.map(|_| ())
    }

    async fn list_requests(&self, remote: &RemoteEndpoint) -> Result<Vec<Value>, RemoteError> {
        let url = format!("{}/status/requests", remote.base_url());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(remote, e))?;
        match self.read_json(remote, response).await? {
            Value::Array(records) => Ok(records),
            other => Err(RemoteError::Decode {
                remote: remote.name.clone(),
                message: format!("expected a JSON array, got {other}"),
            }),
        }
    }
}

/// Token that would make `GET /status/{token}` hit the request ledger.
const RESERVED_TOKEN: &str = "requests";

/// Pull the job token out of a submit response. Numeric ids are stringified.
fn parse_token(remote: &RemoteEndpoint, body: &Value) -> Result<String, RemoteError> {
    let token = body
        .get("external_job_token")
        .or_else(|| body.get("request_id"));
    match token {
        Some(Value::String(s)) if s == RESERVED_TOKEN => Err(RemoteError::Decode {
            remote: remote.name.clone(),
            message: format!("job token '{s}' collides with /status/{RESERVED_TOKEN}"),
        }),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RemoteError::Decode {
            remote: remote.name.clone(),
            message: format!("no job token in submit response: {body}"),
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireState {
    Running,
    #[serde(alias = "completed")]
    Succeeded,
    Failed,
    /// `pending`, `queued` and anything else not final.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(alias = "status")]
    state: WireState,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

fn parse_status(remote: &RemoteEndpoint, body: Value) -> Result<RemoteStatus, RemoteError> {
    let parsed: StatusBody =
        serde_json::from_value(body.clone()).map_err(|e| RemoteError::Decode {
            remote: remote.name.clone(),
            message: e.to_string(),
        })?;
    Ok(match parsed.state {
        WireState::Running | WireState::Other => RemoteStatus::Running,
        WireState::Succeeded => RemoteStatus::Succeeded {
            // Without an explicit result the whole payload is the result.
            result: Some(parsed.result.map(value_text).unwrap_or_else(|| body.to_string())),
        },
        WireState::Failed => RemoteStatus::Failed {
            error: parsed.error.map(value_text),
        },
    })
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Write;

    fn endpoint(server: &mockito::ServerGuard) -> RemoteEndpoint {
        let host_port = server.host_with_port();
        let (host, port) = host_port.rsplit_once(':').unwrap();
        RemoteEndpoint::new("mock", host, port.parse().unwrap())
    }

    fn client() -> HttpRemoteClient {
        HttpRemoteClient::new(Duration::from_secs(5)).unwrap()
    }

    fn payload() -> SubmitPayload {
        SubmitPayload {
            prompt: "fix flaky test".into(),
            method: "aider".into(),
            model: "gpt-4o".into(),
            llm_base_url: None,
            llm_api_key: None,
            org: Some("acme".into()),
            repo: Some("widgets".into()),
            source_branch: None,
            target_branch: None,
            branch_prefix: None,
        }
    }

    #[tokio::test]
    async fn test_submit_returns_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/submit")
            .match_body(Matcher::PartialJson(json!({
                "prompt": "fix flaky test",
                "method": "aider",
                "org": "acme",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"external_job_token":"tok-1"}"#)
            .create_async()
            .await;

        let token = client().submit(&endpoint(&server), &payload()).await.unwrap();
        assert_eq!(token, "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_accepts_numeric_request_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/submit")
            .with_status(200)
            .with_body(r#"{"request_id": 42, "message": "accepted"}"#)
            .create_async()
            .await;

        let token = client().submit(&endpoint(&server), &payload()).await.unwrap();
        assert_eq!(token, "42");
    }

    #[tokio::test]
    async fn test_submit_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/submit")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = client()
            .submit(&endpoint(&server), &payload())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Http {
                remote: "mock".into(),
                status: 503,
                body: "overloaded".into()
            }
        );
    }

    #[tokio::test]
    async fn test_submit_malformed_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/submit")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let err = client()
            .submit(&endpoint(&server), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_submit_rejects_ledger_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/submit")
            .with_status(200)
            .with_body(r#"{"external_job_token":"requests"}"#)
            .create_async()
            .await;

        let err = client()
            .submit(&endpoint(&server), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/tok-1")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(1));
                w.write_all(br#"{"state":"running"}"#)
            })
            .create_async()
            .await;

        let client = HttpRemoteClient::new(Duration::from_millis(100)).unwrap();
        let err = client
            .status(&endpoint(&server), "tok-1")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Timeout {
                remote: "mock".into(),
                timeout: Duration::from_millis(100),
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let closed = RemoteEndpoint::new("closed", "127.0.0.1", port);

        let err = client().status(&closed, "tok-1").await.unwrap_err();
        assert!(
            matches!(&err, RemoteError::Transport { remote, .. } if remote == "closed"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_status_running() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/tok-1")
            .with_status(200)
            .with_body(r#"{"state":"running"}"#)
            .create_async()
            .await;

        let status = client().status(&endpoint(&server), "tok-1").await.unwrap();
        assert_eq!(status, RemoteStatus::Running);
    }

    #[tokio::test]
    async fn test_status_completed_alias_keeps_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/7")
            .with_status(200)
            .with_body(r#"{"status":"completed","pr_url":"https://example/pr/1"}"#)
            .create_async()
            .await;

        let status = client().status(&endpoint(&server), "7").await.unwrap();
        match status {
            RemoteStatus::Succeeded { result: Some(result) } => {
                assert!(result.contains("pr_url"));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_succeeded_with_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/tok-2")
            .with_status(200)
            .with_body(r#"{"state":"succeeded","result":"merged"}"#)
            .create_async()
            .await;

        let status = client().status(&endpoint(&server), "tok-2").await.unwrap();
        assert_eq!(
            status,
            RemoteStatus::Succeeded {
                result: Some("merged".into())
            }
        );
    }

    #[tokio::test]
    async fn test_status_failed_with_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/tok-3")
            .with_status(200)
            .with_body(r#"{"state":"failed","error":"agent crashed"}"#)
            .create_async()
            .await;

        let status = client().status(&endpoint(&server), "tok-3").await.unwrap();
        assert_eq!(
            status,
            RemoteStatus::Failed {
                error: Some("agent crashed".into())
            }
        );
    }

    #[tokio::test]
    async fn test_status_unknown_state_is_running() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/tok-4")
            .with_status(200)
            .with_body(r#"{"state":"pending"}"#)
            .create_async()
            .await;

        let status = client().status(&endpoint(&server), "tok-4").await.unwrap();
        assert_eq!(status, RemoteStatus::Running);
    }

    #[tokio::test]
    async fn test_cancel_posts_to_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/cancel/tok-5")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        client().cancel(&endpoint(&server), "tok-5").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_requests() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/requests")
            .with_status(200)
            .with_body(r#"[{"id":1,"status":"completed"},{"id":2,"status":"running"}]"#)
            .create_async()
            .await;

        let records = client().list_requests(&endpoint(&server)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["status"], "running");
    }

    #[tokio::test]
    async fn test_list_requests_rejects_non_array() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/requests")
            .with_status(200)
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let err = client().list_requests(&endpoint(&server)).await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode { .. }));
    }
}
