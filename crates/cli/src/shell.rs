//! Interactive shell: owns the session settings and maps commands onto the
//! dispatcher.

use std::io::Write;

use agent_cli_core::{ConfigError, ProfileOverrides, SessionConfig};
use agent_cli_jobs::{Dispatcher, JobState};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::commands::{parse_command, ShellCommand, HELP};
use crate::render;

/// Erase the terminal and home the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// What the loop does after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Print the text (if any) and read the next line.
    Continue(String),
    Exit,
}

pub struct Shell {
    dispatcher: Dispatcher,
    session: SessionConfig,
}

impl Shell {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let session = SessionConfig::new(dispatcher.resolver(), dispatcher.registry());
        Self {
            dispatcher,
            session,
        }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Switch method, keeping overrides. Unknown methods are rejected.
    pub fn set_method(&mut self, name: &str) -> Result<(), ConfigError> {
        self.dispatcher
            .resolver()
            .resolve(name, &self.session.overrides)?;
        self.session.method = name.to_string();
        Ok(())
    }

    pub fn set_remote(&mut self, name: &str) -> Result<(), ConfigError> {
        self.dispatcher.registry().resolve(name)?;
        self.session.remote = Some(name.to_string());
        Ok(())
    }

    pub fn set_replicas(&mut self, replicas: u32) {
        self.session.replication = replicas;
    }

    pub async fn handle(&mut self, command: ShellCommand) -> Step {
        let out = match command {
            ShellCommand::Empty => String::new(),
            ShellCommand::Exit => return Step::Exit,
            ShellCommand::Help => HELP.to_string(),
            ShellCommand::Clear => CLEAR_SCREEN.to_string(),
            ShellCommand::Config => self.config(),
            ShellCommand::Remotes => self.remotes(),
            ShellCommand::Profiles => self.profiles(),
            ShellCommand::Jobs(state) => render::jobs_table(&self.dispatcher.list_jobs(state)),
            ShellCommand::Job(id) => match self.dispatcher.get_job(id) {
                Some(job) => render::job_detail(&job),
                None => format!("error: Job not found: {id}"),
            },
            ShellCommand::Cancel(id) => match self.dispatcher.cancel(id) {
                Ok(()) => format!("Cancelled job {id}"),
                Err(e) => format!("error: {e}"),
            },
            ShellCommand::Prune => {
                format!("Removed {} finished job(s)", self.dispatcher.prune_finished())
            }
            ShellCommand::Requests(remote) => self.requests(remote).await,
            ShellCommand::Run(prompt) => self.run_prompt(prompt),
            ShellCommand::Method(name) => match self.set_method(&name) {
                Ok(()) => format!("method = {name}"),
                Err(e) => format!("error: {e}"),
            },
            ShellCommand::Model(model) => {
                self.session.overrides.model = Some(model.clone());
                format!("model = {model}")
            }
            ShellCommand::Batch(batch) => {
                self.session.overrides.batch = Some(batch);
                format!("batch = {batch}")
            }
            ShellCommand::Replicas(replicas) => {
                self.set_replicas(replicas);
                format!("replicas = {replicas}")
            }
            ShellCommand::Remote(name) => match self.set_remote(&name) {
                Ok(()) => format!("remote = {name}"),
                Err(e) => format!("error: {e}"),
            },
            ShellCommand::Org(org) => {
                self.session.org = Some(org.clone());
                format!("org = {org}")
            }
            ShellCommand::Repo(repo) => {
                self.session.repo = Some(repo.clone());
                format!("repo = {repo}")
            }
        };
        Step::Continue(out)
    }

    fn run_prompt(&self, prompt: String) -> String {
        let submission = self.session.submission(prompt);
        match self.dispatcher.submit(&submission) {
            Ok(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
                format!(
                    "Submitted {} job(s) {} [{} on {}]",
                    ids.len(),
                    ids.join(", "),
                    self.session.method,
                    self.session.remote.as_deref().unwrap_or("default remote"),
                )
            }
            Err(e) => format!("error: {e}"),
        }
    }

    fn config(&self) -> String {
        self.session
            .settings()
            .iter()
            .map(|s| format!("{:<24} {}", s.key, s.value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn remotes(&self) -> String {
        let registry = self.dispatcher.registry();
        if registry.is_empty() {
            return "No remotes configured.".to_string();
        }
        registry
            .list()
            .iter()
            .map(|r| {
                let marker = if self.session.remote.as_deref() == Some(r.name.as_str()) {
                    '*'
                } else {
                    ' '
                };
                format!("{marker} {:<16} {}", r.name, r.base_url())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn profiles(&self) -> String {
        let resolver = self.dispatcher.resolver();
        let tracker = self.dispatcher.tracker();
        let mut names: Vec<String> = resolver.profiles().map(|m| m.to_string()).collect();
        let default = resolver.default_method().to_string();
        if !names.contains(&default) {
            names.insert(0, default);
        }

        let no_overrides = ProfileOverrides::default();
        names
            .iter()
            .map(|name| {
                let marker = if *name == self.session.method { '*' } else { ' ' };
                match resolver.resolve(name, &no_overrides) {
                    Ok(profile) => format!(
                        "{marker} {:<18} batch={:<3} model={:<20} running={} queued={}",
                        name,
                        profile.batch,
                        profile.model,
                        tracker.in_flight(name),
                        tracker.queued(name),
                    ),
                    Err(e) => format!("{marker} {name:<18} error: {e}"),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn requests(&self, remote: Option<String>) -> String {
        let remote = remote.or_else(|| self.session.remote.clone());
        match self.dispatcher.remote_requests(remote.as_deref()).await {
            Ok(records) => render::requests_table(&records),
            Err(e) => format!("error: {e}"),
        }
    }

    /// Read commands from stdin until `/exit` or end of input.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let notifier = spawn_notifier(self.dispatcher.clone());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("agent-cli ready. Type /help for commands.");

        loop {
            print!("> ");
            let _ = std::io::stdout().flush();
            let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
                break;
            };
            let step = match parse_command(&line) {
                Ok(command) => self.handle(command).await,
                Err(e) => Step::Continue(format!("error: {e}")),
            };
            match step {
                Step::Continue(out) if out.is_empty() => {}
                Step::Continue(out) => println!("{out}"),
                Step::Exit => break,
            }
        }

        let unfinished = self
            .dispatcher
            .list_jobs(None)
            .iter()
            .filter(|j| !j.state.is_terminal())
            .count();
        if unfinished > 0 {
            println!("Leaving {unfinished} unfinished job(s) behind.");
        }
        notifier.abort();
        Ok(())
    }
}

/// Print a line to stdout whenever a job reaches a terminal state.
pub fn spawn_notifier(dispatcher: Dispatcher) -> JoinHandle<()> {
    let mut events = dispatcher.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.state.is_terminal() => {
                    if let Some(job) = dispatcher.get_job(event.job_id) {
                        println!("\n{}", render::outcome(&job));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// True if every job ended in `Succeeded`.
pub fn all_succeeded(jobs: &[agent_cli_jobs::Job]) -> bool {
    jobs.iter().all(|j| j.state == JobState::Succeeded)
}
