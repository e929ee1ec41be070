use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use releasesentry::{Config, Daemon, GitHubClient, HttpTransport, Notifier, ReleaseMonitor};

#[derive(Parser)]
#[command(name = "releasesentry")]
#[command(about = "Watches GitHub repositories and announces new releases")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to $GITHUB_RELEASE_MONITOR_CONFIG, then config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting ReleaseSentry v{}", env!("CARGO_PKG_VERSION"));

    let config_path = Config::resolve_path(cli.config);
    let config = Config::load(&config_path)
        .with_context(|| format!("Unable to start with config {}", config_path.display()))?;

    info!(
        "Loaded {} repositories and {} notification channels from {}",
        config.repositories.len(),
        config.notifications.len(),
        config_path.display()
    );

    let source = Arc::new(GitHubClient::new(&config)?);
    let notifier = Arc::new(Notifier::new(Arc::new(HttpTransport::new()?)));
    let monitor = ReleaseMonitor::from_config(&config, source, notifier);

    let mut daemon = Daemon::new(config, config_path, monitor);
    daemon.run().await
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}
