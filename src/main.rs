// ABOUTME: Main entry point: loads config, sets up logging and metrics, runs the session
// ABOUTME: Exits non-zero only when the very first connection attempt fails

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchboard::{brain, config::Config, logging, paths, platform};
use switchboard_core::SessionManager;

#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about = "Keep a chat session alive and route messages to a brain")]
struct Cli {
    /// Path to config.toml (defaults to ~/.config/switchboard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and serve until interrupted (default)
    Run,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::CheckConfig => {
            println!(
                "Configuration OK: name={} platform={:?} brain={:?}",
                config.name, config.platform.kind, config.brain.kind
            );
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    let log_dir = paths::log_dir()?;
    let log_guards = logging::init(&config.name, &log_dir)?;

    tracing::info!(
        name = %config.name,
        platform = ?config.platform.kind,
        brain = ?config.brain.kind,
        log_dir = %log_dir.display(),
        "Starting switchboard"
    );

    if let Some(addr) = &config.metrics.listen_addr {
        let addr: std::net::SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid metrics.listen_addr: {}", addr))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        tracing::info!(addr = %addr, "Prometheus metrics exporter listening");
    }

    let platform = platform::build(&config)?;
    let brain = brain::build(&config.brain)?;
    let mut manager = SessionManager::new(platform, brain, config.session_config());

    if config.log_text {
        let path = logging::transcript_path(&log_dir, &config.name);
        tracing::info!(path = %path.display(), "Logging inbound messages");
        manager = manager.with_transcript(Box::new(logging::FileTranscript::open(&path)?));
    }

    tokio::select! {
        result = manager.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Session failed to start");
                // Give the non-blocking error log a chance to flush
                drop(log_guards);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
