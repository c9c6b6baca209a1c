//! shout
//!
//! Entry point for the relay server, the producer and the terminal viewer.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use shout::config::{AppConfig, Cli, Command};
use shout::producer::{self, RunOptions};
use shout::server;
use shout::viewer::client::{self, WsLink};
use shout::viewer::{TerminalSurface, ViewerSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::resolve(&cli.overrides).context("Configuration error")?);

    init_tracing(config.log.json);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::start_server(config).await,
        Command::Watch { stream_id, secure } => watch(&config, stream_id, secure).await,
        Command::Run { delay, command } => {
            let mut options = RunOptions::from_config(&config.client);
            if let Some(secs) = delay {
                options.delay = std::time::Duration::from_secs(secs);
            }
            let summary = producer::run(&options, &command, &mut std::io::stdout())
                .await
                .context("Producer failed")?;
            if !summary.status.success() {
                std::process::exit(summary.status.code().unwrap_or(1));
            }
            Ok(())
        }
    }
}

/// Initialize tracing (M-LOG-STRUCTURED). Logs go to stderr; stdout belongs to the stream.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Follow one stream in the terminal. Entering `a` toggles autoscroll.
async fn watch(config: &AppConfig, stream_id: String, secure: bool) -> anyhow::Result<()> {
    let url = client::ws_url(&config.client.host, secure || config.client.secure)?;
    info!(name: "viewer.started", url = %url, stream_id = %stream_id, "Waiting for socket connection...");

    let (toggle_tx, toggle_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "a" && toggle_tx.send(()).is_err() {
                break;
            }
        }
    });

    let link = WsLink::open(url);
    let session = ViewerSession::new(stream_id, TerminalSurface::stdio());
    let session = client::run(link, session, toggle_rx).await?;
    session
        .into_surface()
        .into_inner()
        .context("Flushing output")?;
    Ok(())
}
