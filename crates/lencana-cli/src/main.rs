//! `lencana` — command-line front end for the badge registry.
//!
//! # Usage
//!
//! ```text
//! lencana login school JBA1234
//! lencana history --search "ali"
//! lencana import peserta.xlsx --badge "Keris Gangsa" --submit
//! lencana --config ~/.config/lencana/lencana.toml cohorts
//! ```

mod commands;
mod settings;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::Parser;
use commands::{Command, Ctx};
use lencana_client::{ApiClient, StateStore};
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lencana", version, about = "Badge registration and cohort tracking")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "lencana.toml")]
  config: PathBuf,

  /// Backend endpoint; overrides the config file.
  #[arg(long)]
  backend_url: Option<String>,

  /// Local state file; overrides the config file.
  #[arg(long, value_name = "FILE")]
  state: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  match run(Cli::parse()).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("error: {}", describe(&e));
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let mut settings = Settings::load(cli.config)?;
  if let Some(url) = cli.backend_url {
    settings.backend_url = url;
  }
  if let Some(path) = cli.state {
    settings.state_path = path;
  }

  let state = StateStore::open(&settings.state_path)
    .await
    .with_context(|| format!("failed to open state file {:?}", settings.state_path))?;
  if settings.backend_url.trim().is_empty()
    && let Some(url) = state.get().backend_url
  {
    settings.backend_url = url;
  }

  let client = ApiClient::with_state(settings.client_config()?, state)?;
  let ctx = Ctx::open(client, &settings).await?;
  commands::dispatch(&ctx, cli.command).await
}

/// Client errors carry a message meant for the person at the keyboard;
/// everything else prints with its context chain.
fn describe(e: &anyhow::Error) -> String {
  match e.downcast_ref::<lencana_client::Error>() {
    Some(client) => client.user_message(),
    None => format!("{e:#}"),
  }
}
