//! aura server binary.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use aura::config::Config;
use aura::gateway;

#[derive(Parser)]
#[command(name = "aura", version, about = "Real-time conversational assistant orchestrator")]
struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!(
        addr = %config.server.listen_addr(),
        generation_endpoint = %config.generation.endpoint,
        tts_enabled = config.voice.tts.enabled,
        "starting aura"
    );

    gateway::serve(config).await
}
