// crates/cli/src/main.rs
//! agent-cli binary.
//!
//! Loads `.env` and the config, builds the dispatcher over HTTP, then either
//! runs one prompt to completion (`--prompt`) or starts the interactive shell.

use std::process::ExitCode;
use std::sync::Arc;

use agent_cli::shell::all_succeeded;
use agent_cli::{render, Args, Shell};
use agent_cli_core::AppConfig;
use agent_cli_jobs::{Dispatcher, HttpRemoteClient, PollSettings};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Before logging and config, so `.env` can set RUST_LOG and API keys.
    let dotenv = dotenvy::dotenv();

    // stderr, so job notifications on stdout stay readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,agent_cli=info,agent_cli_jobs=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to read .env"),
    }

    let args = Args::parse();
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let settings = PollSettings::from(&config.polling);
    let client =
        HttpRemoteClient::new(settings.request_timeout).context("Failed to build HTTP client")?;
    let dispatcher = Dispatcher::from_config(&config, Arc::new(client))?;
    if dispatcher.registry().is_empty() {
        tracing::warn!("no remotes configured, prompts will be rejected");
    }

    let mut shell = Shell::new(dispatcher.clone());
    if let Some(remote) = &args.remote {
        shell.set_remote(remote)?;
    }
    if let Some(method) = &args.method {
        shell.set_method(method)?;
    }
    shell.set_replicas(args.replicas);

    match args.prompt {
        Some(prompt) => one_shot(&dispatcher, &shell, prompt).await,
        None => {
            shell.run().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Submit `prompt`, wait for every job, print outcomes.
async fn one_shot(dispatcher: &Dispatcher, shell: &Shell, prompt: String) -> Result<ExitCode> {
    let ids = dispatcher.submit(&shell.session().submission(prompt))?;
    tracing::info!(jobs = ids.len(), "waiting for jobs");

    let jobs = tokio::select! {
        jobs = dispatcher.wait_for(&ids) => jobs,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, cancelling jobs");
            for id in &ids {
                // Already-finished jobs refuse; that's fine.
                let _ = dispatcher.cancel(*id);
            }
            dispatcher.wait_for(&ids).await
        }
    };

    for job in &jobs {
        println!("{}", render::outcome(job));
    }
    Ok(if all_succeeded(&jobs) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
