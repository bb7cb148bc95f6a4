// crates/jobs/src/tracker.rs
//! Job table and per-profile slot accounting.
//!
//! Every state change goes through one mutex, so admission, slot release,
//! queue draining and cancellation are each a single critical section.
//! Callers get back [`Launch`]es describing jobs that just took a slot and
//! must now be submitted; the tracker never spawns anything itself.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agent_cli_core::{JobRequest, RemoteEndpoint};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{CancelError, TransitionError};
use crate::types::{ErrorInfo, ErrorKind, Job, JobEvent, JobId, JobState, RequestSummary};

const EVENT_CAPACITY: usize = 256;

/// A job that holds a slot and must be submitted now.
#[derive(Debug)]
pub struct Launch {
    pub id: JobId,
    pub request: JobRequest,
    pub cancel: CancellationToken,
}

/// Result of admitting one submission.
#[derive(Debug)]
pub struct Admission {
    /// Every job created, in replica order.
    pub ids: Vec<JobId>,
    /// The subset that got a slot immediately.
    pub launches: Vec<Launch>,
}

/// How a job that reached the remote ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { result: Option<String> },
    Failed(ErrorInfo),
    TimedOut(Duration),
}

impl Outcome {
    fn state(&self) -> JobState {
        match self {
            Self::Succeeded { .. } => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
            Self::TimedOut(_) => JobState::TimedOut,
        }
    }
}

/// What a successful cancel leaves for the caller to do.
#[derive(Debug)]
pub struct CancelledJob {
    /// Present when the remote already accepted the job.
    pub external_token: Option<String>,
    pub remote: RemoteEndpoint,
    /// Queued jobs promoted into the freed slot.
    pub launches: Vec<Launch>,
}

struct JobRecord {
    job: Job,
    cap: u32,
    /// Held only while queued; handed to the launch on promotion.
    request: Option<JobRequest>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct ProfileSlots {
    in_flight: u32,
    queue: VecDeque<JobId>,
}

#[derive(Default)]
struct TrackerInner {
    jobs: BTreeMap<JobId, JobRecord>,
    slots: HashMap<String, ProfileSlots>,
}

/// Owns every job the process has created.
pub struct JobTracker {
    next_id: AtomicU64,
    inner: Mutex<TrackerInner>,
    events: broadcast::Sender<JobEvent>,
}

impl JobTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(TrackerInner::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!("job table mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Create `replication` jobs for `request`.
    ///
    /// A job takes a slot only if nobody is waiting ahead of it and the
    /// profile is under its cap; otherwise it joins the back of the queue.
    pub fn admit(&self, request: &JobRequest, replication: u32) -> Admission {
        let key = request.profile.name().to_string();
        let cap = request.profile.batch;
        let mut guard = self.lock();
        let inner = &mut *guard;
        let slots = inner.slots.entry(key.clone()).or_default();

        let mut admission = Admission {
            ids: Vec::new(),
            launches: Vec::new(),
        };
        for replica in 1..=replication {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let now = Utc::now();
            let mut record = JobRecord {
                job: Job {
                    id,
                    request_summary: RequestSummary::new(request, replica, replication),
                    remote: request.target_remote.as_ref().clone(),
                    state: JobState::Queued,
                    created_at: now,
                    started_at: None,
                    last_polled_at: None,
                    finished_at: None,
                    external_token: None,
                    result: None,
                    error: None,
                    retry_count: 0,
                },
                cap,
                request: None,
                cancel: CancellationToken::new(),
            };

            if slots.queue.is_empty() && slots.in_flight < cap {
                slots.in_flight += 1;
                self.transition(&mut record, JobState::Submitting);
                admission.launches.push(Launch {
                    id,
                    request: request.clone(),
                    cancel: record.cancel.clone(),
                });
            } else {
                record.request = Some(request.clone());
                slots.queue.push_back(id);
                self.emit(id, JobState::Queued);
            }
            inner.jobs.insert(id, record);
            admission.ids.push(id);
        }

        tracing::info!(
            profile = %key,
            cap,
            created = replication,
            launched = admission.launches.len(),
            in_flight = slots.in_flight,
            queued = slots.queue.len(),
            "admitted submission"
        );
        admission
    }

    /// The remote accepted the job and returned `token`.
    pub fn mark_running(&self, id: JobId, token: &str) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        let record = inner.jobs.get_mut(&id).ok_or(TransitionError::NotFound(id))?;
        check(record, JobState::Running)?;
        record.job.external_token = Some(token.to_string());
        self.transition(record, JobState::Running);
        Ok(())
    }

    /// Record a status poll. `consecutive_failures` is 0 after a good poll.
    pub fn record_poll(
        &self,
        id: JobId,
        consecutive_failures: u32,
    ) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        let record = inner.jobs.get_mut(&id).ok_or(TransitionError::NotFound(id))?;
        if record.job.state != JobState::Running {
            return Err(TransitionError::Illegal {
                id,
                from: record.job.state,
                to: JobState::Running,
            });
        }
        record.job.last_polled_at = Some(Utc::now());
        record.job.retry_count = consecutive_failures;
        Ok(())
    }

    /// Move an in-flight job to a terminal state, release its slot and
    /// promote whatever the queue now allows.
    pub fn finish(&self, id: JobId, outcome: Outcome) -> Result<Vec<Launch>, TransitionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let record = inner.jobs.get_mut(&id).ok_or(TransitionError::NotFound(id))?;
        let next = outcome.state();
        check(record, next)?;

        match outcome {
            Outcome::Succeeded { result } => record.job.result = result,
            Outcome::Failed(info) => record.job.error = Some(info),
            Outcome::TimedOut(limit) => {
                record.job.error = Some(ErrorInfo::new(
                    ErrorKind::TimedOut,
                    format!("no terminal status within {}s", limit.as_secs()),
                ));
            }
        }
        record.cancel.cancel();
        self.transition(record, next);
        let key = record.job.request_summary.profile.clone();

        if let Some(slots) = inner.slots.get_mut(&key) {
            slots.in_flight = slots.in_flight.saturating_sub(1);
        }
        Ok(self.drain(inner, &key))
    }

    /// Cancel a job that has not finished yet.
    pub fn cancel(&self, id: JobId) -> Result<CancelledJob, CancelError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let record = inner.jobs.get_mut(&id).ok_or(CancelError::NotFound(id))?;
        let from = record.job.state;
        if from.is_terminal() {
            return Err(CancelError::AlreadyTerminal { id, state: from });
        }

        record.cancel.cancel();
        record.request = None;
        record.job.error = Some(ErrorInfo::new(ErrorKind::Cancelled, "cancelled by user"));
        self.transition(record, JobState::Cancelled);
        let key = record.job.request_summary.profile.clone();
        let external_token = record.job.external_token.clone();
        let remote = record.job.remote.clone();

        if let Some(slots) = inner.slots.get_mut(&key) {
            if from == JobState::Queued {
                slots.queue.retain(|queued| *queued != id);
            } else {
                slots.in_flight = slots.in_flight.saturating_sub(1);
            }
        }
        tracing::info!(job_id = id, from = %from, "job cancelled");

        Ok(CancelledJob {
            external_token,
            remote,
            launches: self.drain(inner, &key),
        })
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.lock().jobs.get(&id).map(|r| r.job.clone())
    }

    /// Snapshot of all jobs in id order, optionally filtered by state.
    pub fn list_jobs(&self, state: Option<JobState>) -> Vec<Job> {
        self.lock()
            .jobs
            .values()
            .filter(|r| state.map_or(true, |s| r.job.state == s))
            .map(|r| r.job.clone())
            .collect()
    }

    /// Jobs holding a slot for `profile`.
    pub fn in_flight(&self, profile: &str) -> u32 {
        self.lock().slots.get(profile).map_or(0, |s| s.in_flight)
    }

    /// Jobs waiting for a slot for `profile`.
    pub fn queued(&self, profile: &str) -> usize {
        self.lock().slots.get(profile).map_or(0, |s| s.queue.len())
    }

    /// Forget every terminal job. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, r| !r.job.state.is_terminal());
        before - inner.jobs.len()
    }

    /// Subscribe to state transitions of every job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Promote queued jobs, oldest first, while the head fits under its cap.
    fn drain(&self, inner: &mut TrackerInner, key: &str) -> Vec<Launch> {
        let mut launches = Vec::new();
        let Some(slots) = inner.slots.get_mut(key) else {
            return launches;
        };
        while let Some(&head) = slots.queue.front() {
            let Some(record) = inner.jobs.get_mut(&head) else {
                slots.queue.pop_front();
                continue;
            };
            if slots.in_flight >= record.cap {
                break;
            }
            slots.queue.pop_front();
            let Some(request) = record.request.take() else {
                continue;
            };
            slots.in_flight += 1;
            self.transition(record, JobState::Submitting);
            launches.push(Launch {
                id: head,
                request,
                cancel: record.cancel.clone(),
            });
        }
        if !launches.is_empty() {
            tracing::debug!(profile = %key, promoted = launches.len(), "drained queue");
        }
        launches
    }

    fn transition(&self, record: &mut JobRecord, next: JobState) {
        let now = Utc::now();
        match next {
            JobState::Submitting => record.job.started_at = Some(now),
            s if s.is_terminal() => record.job.finished_at = Some(now),
            _ => {}
        }
        tracing::debug!(
            job_id = record.job.id,
            from = %record.job.state,
            to = %next,
            "job transition"
        );
        record.job.state = next;
        self.emit(record.job.id, next);
    }

    fn emit(&self, job_id: JobId, state: JobState) {
        // No receivers is fine.
        let _ = self.events.send(JobEvent {
            job_id,
            state,
            at: Utc::now(),
        });
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn check(record: &JobRecord, next: JobState) -> Result<(), TransitionError> {
    let from = record.job.state;
    if from.can_transition_to(next) {
        Ok(())
    } else {
        Err(TransitionError::Illegal {
            id: record.job.id,
            from,
            to: next,
        })
    }
}
