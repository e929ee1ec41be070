//! Daemon Loop - Periodic release checks with graceful shutdown
//!
//! The daemon always runs one check immediately. With `interval: 0` it stops
//! there; otherwise it keeps checking on a fixed period until SIGINT/SIGTERM
//! (or a message on [`Daemon::shutdown_handle`]). State is written after every
//! completed cycle and once more on the way out.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::monitor::{CheckSummary, ReleaseMonitor};

/// How the daemon schedules check cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Single cycle, then exit
    OneShot,
    /// A cycle every period until shutdown
    Cyclic(Duration),
}

impl RunMode {
    pub fn from_config(config: &Config) -> Self {
        match config.poll_interval() {
            Some(period) => RunMode::Cyclic(period),
            None => RunMode::OneShot,
        }
    }
}

/// Lifecycle of a daemon run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Running(RunMode),
    ShuttingDown,
    Terminated,
}

/// Daemon statistics
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub completed_cycles: u64,
    pub interrupted_cycles: u64,
    pub failed_checks: u64,
    pub notifications_sent: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_persist_error: Option<String>,
}

impl DaemonStatus {
    fn record(&mut self, summary: &CheckSummary) {
        self.completed_cycles += 1;
        self.failed_checks += summary.failed() as u64;
        self.notifications_sent += summary.notifications_delivered as u64;
        self.last_cycle_at = Some(Utc::now());
    }
}

/// Owns the monitor state for the lifetime of the process
pub struct Daemon {
    config: Config,
    config_path: PathBuf,
    monitor: ReleaseMonitor,
    state: DaemonState,
    status: DaemonStatus,
    last_saved: Option<Config>,
    shutdown_sender: broadcast::Sender<()>,
    shutdown_receiver: Option<broadcast::Receiver<()>>,
}

impl Daemon {
    pub fn new(config: Config, config_path: impl Into<PathBuf>, monitor: ReleaseMonitor) -> Self {
        // Subscribe up front so a signal arriving before the loop starts is kept
        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);

        Self {
            config,
            config_path: config_path.into(),
            monitor,
            state: DaemonState::Starting,
            status: DaemonStatus::default(),
            last_saved: None,
            shutdown_sender,
            shutdown_receiver: Some(shutdown_receiver),
        }
    }

    /// Sender that stops the daemon when a message is sent on it
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn status(&self) -> &DaemonStatus {
        &self.status
    }

    /// Run until done (one-shot) or until SIGINT/SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        let shutdown_sender = self.shutdown_sender.clone();
        let listener = tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping daemon...");
            let _ = shutdown_sender.send(());
        });

        let result = self.run_until_shutdown().await;
        listener.abort();
        result
    }

    /// Run until done (one-shot) or until a message arrives on the shutdown handle.
    ///
    /// Whatever the loop did, unsaved state is persisted before returning; an
    /// error from that final save is the only error returned.
    pub async fn run_until_shutdown(&mut self) -> Result<()> {
        let mut shutdown = self
            .shutdown_receiver
            .take()
            .unwrap_or_else(|| self.shutdown_sender.subscribe());

        let mode = RunMode::from_config(&self.config);
        info!("Starting ReleaseSentry daemon ({:?})", mode);
        self.state = DaemonState::Running(mode);

        self.daemon_loop(mode, &mut shutdown).await;

        self.state = DaemonState::ShuttingDown;
        let result = self.persist_if_changed();
        self.state = DaemonState::Terminated;

        info!("Daemon stopped");
        result
    }

    async fn daemon_loop(&mut self, mode: RunMode, shutdown: &mut broadcast::Receiver<()>) {
        info!("Starting initial repository check");
        if !self.run_cycle(shutdown).await {
            return;
        }

        let period = match mode {
            RunMode::OneShot => {
                info!("Running in one-shot mode (no interval)");
                return;
            }
            RunMode::Cyclic(period) => period,
        };

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately and the initial check already ran
        ticker.tick().await;

        info!("Running in daemon mode, checking every {:?}", period);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("Shutdown signal received in daemon loop");
                    break;
                }

                _ = ticker.tick() => {
                    if !self.run_cycle(shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Daemon loop exiting");
    }

    /// One check cycle followed by a save. Returns false if a shutdown signal
    /// arrived first; updates already applied by the abandoned cycle are kept.
    async fn run_cycle(&mut self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        debug!("Starting check cycle");

        let summary = tokio::select! {
            biased;

            _ = shutdown.recv() => None,
            summary = self.monitor.check_all(&mut self.config.repositories, &self.config.notifications) => Some(summary),
        };

        let Some(summary) = summary else {
            warn!("Shutdown requested during check cycle, abandoning in-flight checks");
            self.status.interrupted_cycles += 1;
            return false;
        };

        self.status.record(&summary);
        info!(
            "Check completed in {:.2}s: {} repos, {} new releases, {} unchanged, {} failed",
            summary.duration.as_secs_f64(),
            summary.total_repositories,
            summary.updated,
            summary.unchanged,
            summary.failed()
        );

        if let Err(e) = self.persist() {
            error!("Error writing config: {:?}", e);
        }

        true
    }

    fn persist(&mut self) -> Result<()> {
        let result = self
            .config
            .save(&self.config_path)
            .with_context(|| format!("Failed to persist state to {}", self.config_path.display()));

        match &result {
            Ok(()) => {
                self.last_saved = Some(self.config.clone());
                self.status.last_persist_error = None;
                debug!("State saved to {}", self.config_path.display());
            }
            Err(e) => self.status.last_persist_error = Some(format!("{:#}", e)),
        }

        result
    }

    fn persist_if_changed(&mut self) -> Result<()> {
        if self.last_saved.as_ref() == Some(&self.config) {
            debug!("State unchanged since last save");
            return Ok(());
        }

        info!("Saving state before exit");
        self.persist()
    }
}

/// Wait for shutdown signals (SIGINT/Ctrl+C, and SIGTERM on unix)
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => debug!("SIGINT received"),
                    _ = sigterm.recv() => debug!("SIGTERM received"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    debug!("Ctrl+C received");
}
