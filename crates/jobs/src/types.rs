// crates/jobs/src/types.rs
//! Types for the job dispatch engine.

use std::fmt;
use std::str::FromStr;

use agent_cli_core::{JobRequest, RemoteEndpoint};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Unique identifier for a job, never reused within a process.
pub type JobId = u64;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Submitting,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        Self::Queued,
        Self::Submitting,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::TimedOut,
        Self::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Counts against the profile's concurrency cap.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Running)
    }

    /// Edges of the job state machine.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Submitting)
                | (Queued, Cancelled)
                | (Submitting, Running)
                | (Submitting, Failed)
                | (Submitting, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Submitting => "submitting",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown job state '{s}' (expected one of {})", names.join(", "))
            })
    }
}

/// Why a job ended without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The submit call failed; never retried.
    SubmissionFailure,
    /// The remote accepted the job and later reported it failed.
    RemoteFailure,
    /// Too many consecutive status polls failed.
    PollExhausted,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// The parts of a [`JobRequest`] a job keeps for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    /// Profile (method) name; the key for slot accounting.
    pub profile: String,
    pub model: String,
    pub prompt: String,
    pub org: Option<String>,
    pub repo: Option<String>,
    /// 1-based index of this job within its submission.
    pub replica: u32,
    pub replication: u32,
}

impl RequestSummary {
    pub fn new(request: &JobRequest, replica: u32, replication: u32) -> Self {
        Self {
            profile: request.profile.name().to_string(),
            model: request.profile.model.clone(),
            prompt: request.prompt.clone(),
            org: request.org.clone(),
            repo: request.repo.clone(),
            replica,
            replication,
        }
    }
}

/// Point-in-time snapshot of a job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub request_summary: RequestSummary,
    pub remote: RemoteEndpoint,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub external_token: Option<String>,
    pub result: Option<String>,
    pub error: Option<ErrorInfo>,
    /// Consecutive failed polls.
    pub retry_count: u32,
}

/// Broadcast on every state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub state: JobState,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in JobState::ALL.iter().filter(|s| s.is_terminal()) {
            for to in JobState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn test_every_transient_state_can_be_cancelled() {
        for from in JobState::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(JobState::Cancelled));
        }
    }

    #[test]
    fn test_timeout_only_from_running() {
        let sources: Vec<_> = JobState::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(JobState::TimedOut))
            .collect();
        assert_eq!(sources, vec![JobState::Running]);
    }

    #[test]
    fn test_in_flight_states() {
        let in_flight: Vec<_> = JobState::ALL
            .into_iter()
            .filter(|s| s.is_in_flight())
            .collect();
        assert_eq!(in_flight, vec![JobState::Submitting, JobState::Running]);
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("running".parse::<JobState>().unwrap(), JobState::Running);
        assert_eq!("Timed-Out".parse::<JobState>().unwrap(), JobState::TimedOut);
        assert!("bogus".parse::<JobState>().unwrap_err().contains("queued"));
    }

    #[test]
    fn test_job_event_serialize() {
        let event = JobEvent {
            job_id: 7,
            state: JobState::TimedOut,
            at: "2026-02-05T12:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"job_id\":7"));
        assert!(json.contains("\"state\":\"timed_out\""));
    }

    #[test]
    fn test_error_info_display() {
        let info = ErrorInfo::new(ErrorKind::PollExhausted, "5 consecutive failures");
        assert_eq!(info.to_string(), "PollExhausted: 5 consecutive failures");
    }
}
