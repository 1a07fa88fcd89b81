//! CLI entry point for the vk tool.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

mod cli;
mod commands;

use cli::{Args, Command};
use commands::{Session, UnlikeRequest, UnlikeTargets};
use vk_client::likes::LikeKind;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout is reserved for command output (tokens, JSON payloads).
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(command = ?args.command, "CLI arguments parsed");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            signal_cancel.cancel();
        }
    });

    let session = Session::new(args.app, &args.limits)?;

    match args.command {
        Command::Auth { grant } => commands::run_auth_command(&session, &cancel, grant).await,
        Command::Call { method, params } => {
            commands::run_call_command(&session, &cancel, &method, params).await
        }
        Command::Unlike {
            faves,
            kind,
            owner_id,
            ids,
        } => {
            let targets = if faves {
                UnlikeTargets::Faves {
                    kinds: kind.map_or_else(|| LikeKind::ALL.to_vec(), |kind| vec![kind]),
                }
            } else {
                UnlikeTargets::Ids {
                    kind: kind.context("--kind is required without --faves")?,
                    owner_id: owner_id.context("--owner-id is required without --faves")?,
                    ids,
                }
            };
            let request = UnlikeRequest {
                targets,
                parallelism: usize::from(args.limits.parallelism),
                show_progress: !args.quiet && io::stderr().is_terminal(),
            };
            commands::run_unlike_command(&session, &cancel, request).await
        }
    }
}
