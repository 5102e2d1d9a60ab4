//! caucus: live committee session client.
//! Follows a committee over its session channel and issues procedure and
//! attendance intents through the resource API.

use caucus_core::{CommitteeId, DelegationId};
use clap::Parser;

mod cli;
mod cmd_attend;
mod cmd_delegations;
mod cmd_poll;
mod cmd_roster;
mod cmd_watch;
mod render;
mod settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr; stdout carries the rendered session.
    let filter = std::env::var("CAUCUS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let settings = settings::Settings::resolve(&args)?;

    match args.command {
        cli::Command::Watch(opts) => {
            cmd_watch::cmd_watch(&settings, &opts).await?;
        }
        cli::Command::Poll(opts) => {
            cmd_poll::cmd_poll(
                &settings,
                CommitteeId(opts.committee_id),
                opts.procedure.into(),
            )
            .await?;
        }
        cli::Command::Attend(opts) => {
            cmd_attend::cmd_attend(
                &settings,
                CommitteeId(opts.committee_id),
                DelegationId(opts.delegation_id),
                opts.entry.into(),
            )
            .await?;
        }
        cli::Command::Roster(opts) => {
            cmd_roster::cmd_roster(
                &settings,
                CommitteeId(opts.committee_id),
                opts.delegation_ids.into_iter().map(DelegationId).collect(),
            )
            .await?;
        }
        cli::Command::Delegations => {
            cmd_delegations::cmd_delegations(&settings).await?;
        }
    }

    Ok(())
}
