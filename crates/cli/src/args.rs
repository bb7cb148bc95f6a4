//! Command-line arguments.

use std::path::PathBuf;

use agent_cli_core::{DEFAULT_CONFIG_FILE, MAX_REPLICATION};
use clap::Parser;

/// Dispatch prompts to remote coding agents and track the jobs they run.
///
/// Without `--prompt`, starts an interactive shell reading commands from
/// stdin. Type `/help` inside the shell for the command list.
#[derive(Parser, Debug)]
#[command(name = "agent-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "AGENT_CLI_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Submit one prompt, wait for every job, then exit.
    ///
    /// Exits non-zero if any job did not succeed.
    #[arg(long, short = 'p')]
    pub prompt: Option<String>,

    /// Remote to target instead of the configured default.
    #[arg(long, short = 'r')]
    pub remote: Option<String>,

    /// Agent method (profile) to use instead of the configured default.
    #[arg(long, short = 'm')]
    pub method: Option<String>,

    /// Number of job replicas per prompt.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_REPLICATION))
    )]
    pub replicas: u32,
}
