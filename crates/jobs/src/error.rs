use agent_cli_core::ConfigError;
use thiserror::Error;

use crate::client::RemoteError;
use crate::types::{JobId, JobState};

/// A submission rejected before any job was created.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    #[error("Replication must be at least 1")]
    ZeroReplication,

    #[error("Replication {requested} exceeds the limit of {max}")]
    TooManyReplicas { requested: u32, max: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} already finished ({state})")]
    AlreadyTerminal { id: JobId, state: JobState },
}

/// A state change the tracker refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} cannot move from {from} to {to}")]
    Illegal {
        id: JobId,
        from: JobState,
        to: JobState,
    },
}

/// Failure of a direct query against a remote (not tied to a job).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
