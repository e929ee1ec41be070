//! Release Monitor - Runs release checks across all repositories
//!
//! Checks run concurrently on the calling task. Each in-flight check holds
//! the only mutable borrow of its own repository entry, so entries are
//! updated in place without locking, and results are gathered as they
//! complete.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::check::{check_repository, CheckOutcome};
use crate::config::{Config, NotificationChannel, RepositoryEntry};
use crate::error::CheckError;
use crate::github::ReleaseSource;
use crate::notify::Notifier;

/// Results from one check cycle
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub total_repositories: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub notifications_delivered: usize,
    pub notifications_failed: usize,
    pub duration: Duration,
    pub errors: Vec<CheckError>,
}

impl CheckSummary {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

/// Checks every configured repository against the release source
#[derive(Clone)]
pub struct ReleaseMonitor {
    source: Arc<dyn ReleaseSource>,
    notifier: Arc<Notifier>,
    max_parallel: usize,
    check_timeout: Duration,
}

impl ReleaseMonitor {
    /// Monitor with the default limits of an empty configuration
    pub fn new(source: Arc<dyn ReleaseSource>, notifier: Arc<Notifier>) -> Self {
        let defaults = Config::default();
        Self {
            source,
            notifier,
            max_parallel: defaults.max_parallel(),
            check_timeout: defaults.check_timeout(),
        }
    }

    /// Monitor using the concurrency and timeout limits from `config`
    pub fn from_config(config: &Config, source: Arc<dyn ReleaseSource>, notifier: Arc<Notifier>) -> Self {
        Self::new(source, notifier).with_limits(config.max_parallel(), config.check_timeout())
    }

    pub fn with_limits(mut self, max_parallel: usize, check_timeout: Duration) -> Self {
        self.max_parallel = max_parallel.max(1);
        self.check_timeout = check_timeout;
        self
    }

    /// Check all repositories, updating their stored tags in place.
    ///
    /// Individual failures are logged and collected in the summary; the cycle
    /// itself always completes.
    pub async fn check_all(
        &self,
        repositories: &mut [RepositoryEntry],
        channels: &[NotificationChannel],
    ) -> CheckSummary {
        let start_time = Instant::now();
        let total_repositories = repositories.len();

        info!(
            "Checking {} repositories (max {} in parallel)",
            total_repositories, self.max_parallel
        );

        let semaphore = Semaphore::new(self.max_parallel);
        let mut checks = FuturesUnordered::new();

        for entry in repositories.iter_mut() {
            let semaphore = &semaphore;

            checks.push(async move {
                // Never closed, so acquiring only waits for a free slot
                let _permit = semaphore.acquire().await;

                let slug = entry.slug.clone();
                let check = check_repository(entry, self.source.as_ref(), &self.notifier, channels);
                match timeout(self.check_timeout, check).await {
                    Ok(result) => result,
                    Err(_) => Err(CheckError::TimedOut {
                        slug,
                        seconds: self.check_timeout.as_secs(),
                    }),
                }
            });
        }

        let mut summary = CheckSummary {
            total_repositories,
            ..Default::default()
        };

        while let Some(result) = checks.next().await {
            match result {
                Ok(CheckOutcome::Unchanged { .. }) => summary.unchanged += 1,
                Ok(CheckOutcome::Updated { report, .. }) => {
                    summary.updated += 1;
                    summary.notifications_delivered += report.delivered;
                    summary.notifications_failed += report.failed;
                }
                Err(e) => {
                    error!("Error checking repository {}: {}", e.slug(), e);
                    summary.errors.push(e);
                }
            }
        }

        summary.duration = start_time.elapsed();

        debug!(
            "Check cycle finished in {:.2}s: {} updated, {} unchanged, {} failed",
            summary.duration.as_secs_f64(),
            summary.updated,
            summary.unchanged,
            summary.failed()
        );

        summary
    }
}
