// crates/core/src/lib.rs
pub mod config;
pub mod error;
pub mod profile;
pub mod remote;
pub mod request;
pub mod session;

pub use config::{AppConfig, Defaults, PollingConfig, DEFAULT_CONFIG_FILE};
pub use error::*;
pub use profile::{
    AgentMethod, AgentProfile, ApiKey, ProfileConfig, ProfileOverrides, ProfileResolver,
};
pub use remote::{RemoteEndpoint, RemoteRegistry};
pub use request::{BranchInfo, JobRequest, Submission, MAX_REPLICATION};
pub use session::{SessionConfig, SessionSetting};
