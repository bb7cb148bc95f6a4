// crates/jobs/src/lib.rs
//! Job dispatch and polling engine.
//!
//! Provides:
//! - `Dispatcher`: admits submissions, runs and cancels jobs
//! - `JobTracker`: job table, per-profile slots and FIFO queues
//! - `StatusPoller`: bounded, backed-off status polling
//! - `RemoteClient`: outbound protocol, with `HttpRemoteClient` over reqwest

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod poller;
pub mod tracker;
pub mod types;

pub use client::{RemoteClient, RemoteError, RemoteStatus, SubmitPayload};
pub use dispatcher::Dispatcher;
pub use error::{AdmissionError, CancelError, QueryError, TransitionError};
pub use http::HttpRemoteClient;
pub use poller::{PollSettings, StatusPoller};
pub use tracker::{Admission, CancelledJob, JobTracker, Launch, Outcome};
pub use types::{ErrorInfo, ErrorKind, Job, JobEvent, JobId, JobState, RequestSummary};
