//! Shell command grammar.
//!
//! `parse_command` is pure: it only turns a line into a [`ShellCommand`] and
//! never looks at config or job state.

use agent_cli_core::MAX_REPLICATION;
use agent_cli_jobs::{JobId, JobState};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  /run <prompt>       submit a prompt (plain text without '/' does the same)
  /jobs [state]       list jobs, optionally only those in one state
  /job <id>           show one job in full
  /cancel <id>        cancel a queued or running job
  /prune              forget finished jobs
  /requests [remote]  list the requests a remote knows about
  /method <name>      switch agent method
  /model <name>       override the model
  /batch <n>          override the concurrency cap
  /replicas <n>       jobs to create per prompt
  /remote <name>      switch target remote
  /org <name>         set the organisation
  /repo <name>        set the repository
  /config             show session settings
  /remotes            list configured remotes
  /profiles           list configured agent profiles
  /clear              clear the screen
  /help               show this help
  /exit, /quit        leave the shell";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Blank line.
    Empty,
    Help,
    Clear,
    Config,
    Remotes,
    Profiles,
    Jobs(Option<JobState>),
    Job(JobId),
    Cancel(JobId),
    Prune,
    Requests(Option<String>),
    Run(String),
    Method(String),
    Model(String),
    Batch(u32),
    Replicas(u32),
    Remote(String),
    Org(String),
    Repo(String),
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("/{command}: {message}")]
    Invalid { command: String, message: String },
}

pub fn parse_command(line: &str) -> Result<ShellCommand, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ShellCommand::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ShellCommand::Run(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg = (!arg.is_empty()).then_some(arg);

    let command = match name.to_ascii_lowercase().as_str() {
        "help" | "h" | "?" => ShellCommand::Help,
        "clear" | "cls" => ShellCommand::Clear,
        "config" => ShellCommand::Config,
        "remotes" => ShellCommand::Remotes,
        "profiles" | "agents" => ShellCommand::Profiles,
        "jobs" => ShellCommand::Jobs(
            arg.map(|s| s.parse::<JobState>().map_err(|e| invalid(name, e)))
                .transpose()?,
        ),
        "job" => ShellCommand::Job(job_id(name, arg, "/job <id>")?),
        "cancel" => ShellCommand::Cancel(job_id(name, arg, "/cancel <id>")?),
        "prune" => ShellCommand::Prune,
        "requests" => ShellCommand::Requests(arg.map(str::to_string)),
        "run" => ShellCommand::Run(required(arg, "/run <prompt>")?),
        "method" => ShellCommand::Method(required(arg, "/method <name>")?),
        "model" => ShellCommand::Model(required(arg, "/model <name>")?),
        "batch" => ShellCommand::Batch(count(name, arg, "/batch <n>", u32::MAX)?),
        "replicas" => {
            ShellCommand::Replicas(count(name, arg, "/replicas <n>", MAX_REPLICATION)?)
        }
        "remote" => ShellCommand::Remote(required(arg, "/remote <name>")?),
        "org" => ShellCommand::Org(required(arg, "/org <name>")?),
        "repo" => ShellCommand::Repo(required(arg, "/repo <name>")?),
        "exit" | "quit" | "q" => ShellCommand::Exit,
        _ => return Err(CommandError::Unknown(name.to_string())),
    };
    Ok(command)
}

fn required(arg: Option<&str>, usage: &'static str) -> Result<String, CommandError> {
    arg.map(str::to_string).ok_or(CommandError::Usage(usage))
}

fn job_id(name: &str, arg: Option<&str>, usage: &'static str) -> Result<JobId, CommandError> {
    let arg = arg.ok_or(CommandError::Usage(usage))?;
    arg.trim_start_matches('#')
        .parse()
        .map_err(|_| invalid(name, format!("'{arg}' is not a job id")))
}

/// A positive integer no larger than `max`.
fn count(
    name: &str,
    arg: Option<&str>,
    usage: &'static str,
    max: u32,
) -> Result<u32, CommandError> {
    let arg = arg.ok_or(CommandError::Usage(usage))?;
    match arg.parse::<u32>() {
        Ok(n) if n > max => Err(invalid(name, format!("{n} exceeds the limit of {max}"))),
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(name, format!("'{arg}' must be a positive integer"))),
    }
}

fn invalid(name: &str, message: impl Into<String>) -> CommandError {
    CommandError::Invalid {
        command: name.to_string(),
        message: message.into(),
    }
}
