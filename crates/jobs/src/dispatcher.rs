// crates/jobs/src/dispatcher.rs
//! Front door of the engine: turns submissions into tracked jobs and runs
//! each admitted job on its own task.

use std::sync::Arc;

use agent_cli_core::{
    AppConfig, ConfigError, ProfileResolver, RemoteEndpoint, RemoteRegistry, Submission,
    MAX_REPLICATION,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::client::{bounded, RemoteClient, SubmitPayload};
use crate::error::{AdmissionError, CancelError, QueryError};
use crate::poller::{PollSettings, StatusPoller};
use crate::tracker::{JobTracker, Launch, Outcome};
use crate::types::{ErrorInfo, ErrorKind, Job, JobEvent, JobId, JobState};

struct DispatchContext {
    tracker: JobTracker,
    client: Arc<dyn RemoteClient>,
    settings: PollSettings,
    registry: RemoteRegistry,
    resolver: ProfileResolver,
}

/// Cheap to clone; clones share one job table.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<DispatchContext>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        registry: RemoteRegistry,
        resolver: ProfileResolver,
        settings: PollSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(DispatchContext {
                tracker: JobTracker::new(),
                client,
                settings,
                registry,
                resolver,
            }),
        }
    }

    /// Build from a loaded config file.
    pub fn from_config(
        config: &AppConfig,
        client: Arc<dyn RemoteClient>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            client,
            config.registry()?,
            config.resolver()?,
            PollSettings::from(&config.polling),
        ))
    }

    /// Validate, resolve and admit a submission. Returns the ids of every
    /// job created, whether it started or queued.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, submission: &Submission) -> Result<Vec<JobId>, AdmissionError> {
        if submission.prompt.trim().is_empty() {
            return Err(AdmissionError::EmptyPrompt);
        }
        match submission.replication {
            0 => return Err(AdmissionError::ZeroReplication),
            n if n > MAX_REPLICATION => {
                return Err(AdmissionError::TooManyReplicas {
                    requested: n,
                    max: MAX_REPLICATION,
                });
            }
            _ => {}
        }
        let request = submission.resolve(&self.ctx.resolver, &self.ctx.registry)?;
        let admission = self.ctx.tracker.admit(&request, submission.replication);
        spawn_launches(&self.ctx, admission.launches);
        Ok(admission.ids)
    }

    /// Cancel a job. If the remote already holds it, a cancel request is
    /// sent in the background.
    pub fn cancel(&self, id: JobId) -> Result<(), CancelError> {
        let cancelled = self.ctx.tracker.cancel(id)?;
        if let Some(token) = cancelled.external_token {
            let ctx = Arc::clone(&self.ctx);
            let remote = cancelled.remote;
            tokio::spawn(async move {
                ctx.cancel_remote(id, &remote, &token).await;
            });
        }
        spawn_launches(&self.ctx, cancelled.launches);
        Ok(())
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.ctx.tracker.get_job(id)
    }

    pub fn list_jobs(&self, state: Option<JobState>) -> Vec<Job> {
        self.ctx.tracker.list_jobs(state)
    }

    pub fn prune_finished(&self) -> usize {
        self.ctx.tracker.prune_finished()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.tracker.subscribe()
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.ctx.tracker
    }

    pub fn registry(&self) -> &RemoteRegistry {
        &self.ctx.registry
    }

    pub fn resolver(&self) -> &ProfileResolver {
        &self.ctx.resolver
    }

    pub fn settings(&self) -> &PollSettings {
        &self.ctx.settings
    }

    /// Wait until every job in `ids` is terminal (or pruned) and return
    /// their final snapshots.
    pub async fn wait_for(&self, ids: &[JobId]) -> Vec<Job> {
        let mut events = self.subscribe();
        loop {
            let jobs: Vec<Job> = ids.iter().filter_map(|id| self.get_job(*id)).collect();
            if jobs.iter().all(|job| job.state.is_terminal()) {
                return jobs;
            }
            match events.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return jobs,
            }
        }
    }

    /// Ask a remote (default: the first configured) for its request ledger.
    pub async fn remote_requests(&self, remote: Option<&str>) -> Result<Vec<Value>, QueryError> {
        let registry = &self.ctx.registry;
        let remote = match remote {
            Some(name) => registry.resolve(name)?,
            None => registry.default_remote().ok_or(ConfigError::NoRemotes)?,
        };
        let records = bounded(
            self.ctx.settings.request_timeout,
            remote,
            self.ctx.client.list_requests(remote),
        )
        .await?;
        Ok(records)
    }
}

fn spawn_launches(ctx: &Arc<DispatchContext>, launches: Vec<Launch>) {
    for launch in launches {
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move { ctx.run_job(launch).await });
    }
}

impl DispatchContext {
    /// Submit one job, then poll it to completion.
    async fn run_job(self: Arc<Self>, launch: Launch) {
        let Launch {
            id,
            request,
            cancel,
        } = launch;
        let remote = Arc::clone(&request.target_remote);
        let deadline = Instant::now() + self.settings.job_timeout;
        let payload = SubmitPayload::from(&request);

        // Not raced against `cancel`: a token that arrives after a cancel
        // still needs a remote cancel.
        let submitted = bounded(
            self.settings.request_timeout,
            &remote,
            self.client.submit(&remote, &payload),
        )
        .await;
        let token = match submitted {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(job_id = id, remote = %remote.name, error = %e, "submission failed");
                let info = ErrorInfo::new(ErrorKind::SubmissionFailure, e.to_string());
                self.finish(id, Outcome::Failed(info));
                return;
            }
        };

        if let Err(e) = self.tracker.mark_running(id, &token) {
            tracing::info!(job_id = id, error = %e, "job ended during submission");
            self.cancel_remote(id, &remote, &token).await;
            return;
        }
        tracing::info!(job_id = id, remote = %remote.name, token = %token, "job accepted");

        let poller = StatusPoller {
            tracker: &self.tracker,
            client: self.client.as_ref(),
            settings: &self.settings,
        };
        if let Some(outcome) = poller.run(id, &remote, &token, &cancel, deadline).await {
            self.finish(id, outcome);
        }
    }

    fn finish(self: &Arc<Self>, id: JobId, outcome: Outcome) {
        match self.tracker.finish(id, outcome) {
            Ok(launches) => {
                if let Some(job) = self.tracker.get_job(id) {
                    tracing::info!(job_id = id, state = %job.state, "job finished");
                }
                spawn_launches(self, launches);
            }
            // Lost a race with cancel; the job already has its final state.
            Err(e) => tracing::debug!(job_id = id, error = %e, "outcome discarded"),
        }
    }

    async fn cancel_remote(&self, id: JobId, remote: &RemoteEndpoint, token: &str) {
        let result = bounded(
            self.settings.request_timeout,
            remote,
            self.client.cancel(remote, token),
        )
        .await;
        match result {
            Ok(()) => tracing::info!(job_id = id, remote = %remote.name, "remote cancel sent"),
            Err(e) => tracing::warn!(
                job_id = id,
                remote = %remote.name,
                error = %e,
                "remote cancel failed"
            ),
        }
    }
}
