// crates/jobs/src/poller.rs
//! Status polling for a job the remote has accepted.

use std::time::Duration;

use agent_cli_core::{PollingConfig, RemoteEndpoint};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{bounded, RemoteClient, RemoteStatus};
use crate::tracker::{JobTracker, Outcome};
use crate::types::{ErrorInfo, ErrorKind, JobId};

/// Timing knobs for submission and polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between polls while the remote reports the job running.
    pub interval: Duration,
    /// Consecutive failed polls before the job is failed.
    pub max_poll_failures: u32,
    /// Upper bound for the delay after failed polls.
    pub max_backoff: Duration,
    /// Overall budget for a job, counted from when it takes a slot.
    pub job_timeout: Duration,
    /// Bound on any single remote call.
    pub request_timeout: Duration,
}

impl PollSettings {
    /// Delay before the next poll after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures);
        self.interval.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            max_poll_failures: config.max_poll_failures,
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Polls one job until it reaches a terminal remote state, the deadline
/// passes, polling is exhausted, or the job is cancelled.
pub struct StatusPoller<'a> {
    pub tracker: &'a JobTracker,
    pub client: &'a dyn RemoteClient,
    pub settings: &'a PollSettings,
}

impl StatusPoller<'_> {
    /// Returns `None` when the job was cancelled or finished elsewhere.
    pub async fn run(
        &self,
        id: JobId,
        remote: &RemoteEndpoint,
        token: &str,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Option<Outcome> {
        let settings = self.settings;
        let mut failures = 0u32;
        let mut delay = Duration::ZERO;

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(job_id = id, remote = %remote.name, "job timed out");
                    return Some(Outcome::TimedOut(settings.job_timeout));
                }
                polled = async {
                    tokio::time::sleep(delay).await;
                    let status = self.client.status(remote, token);
                    bounded(settings.request_timeout, remote, status).await
                } => polled,
            };

            match polled {
                Ok(RemoteStatus::Running) => {
                    failures = 0;
                    self.tracker.record_poll(id, 0).ok()?;
                    delay = settings.interval;
                }
                Ok(RemoteStatus::Succeeded { result }) => {
                    self.tracker.record_poll(id, 0).ok()?;
                    return Some(Outcome::Succeeded { result });
                }
                Ok(RemoteStatus::Failed { error }) => {
                    self.tracker.record_poll(id, 0).ok()?;
                    let message = error.unwrap_or_else(|| "remote reported failure".into());
                    return Some(Outcome::Failed(ErrorInfo::new(
                        ErrorKind::RemoteFailure,
                        message,
                    )));
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        job_id = id,
                        remote = %remote.name,
                        failures,
                        error = %e,
                        "status poll failed"
                    );
                    self.tracker.record_poll(id, failures).ok()?;
                    if failures >= settings.max_poll_failures {
                        return Some(Outcome::Failed(ErrorInfo::new(
                            ErrorKind::PollExhausted,
                            format!("{failures} consecutive status polls failed, last: {e}"),
                        )));
                    }
                    delay = settings.backoff(failures);
                }
            }
        }
    }
}
