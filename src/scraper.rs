//! Background scrape loop: one task per registered repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Repository;
use crate::git::RepoSyncer;
use crate::metrics::MetricsRegistry;
use crate::operators;

/// Default time between scrape cycles (24 h).
pub const SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperState {
    Idle,
    Syncing,
    Extracting,
    Stopping,
    Stopped,
}

pub struct Scraper {
    repository: Repository,
    clone_path: PathBuf,
    interval: Duration,
    syncer: Arc<dyn RepoSyncer>,
    registry: MetricsRegistry,
    state: watch::Sender<ScraperState>,
}

impl Scraper {
    /// `clone_dir/<repository name>` is both the sync target and the extractor input.
    pub fn new(
        repository: Repository,
        clone_dir: &Path,
        interval: Duration,
        syncer: Arc<dyn RepoSyncer>,
        registry: MetricsRegistry,
    ) -> Self {
        let clone_path = clone_dir.join(&repository.name);
        let (state, _) = watch::channel(ScraperState::Idle);
        Self {
            repository,
            clone_path,
            interval,
            syncer,
            registry,
            state,
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ScraperState> {
        self.state.subscribe()
    }

    /// Scrape now, then once per interval measured from loop start, until
    /// `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let name = self.repository.name.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(repository = %name, "shutdown during scrape, abandoning cycle");
                    break;
                }
                _ = self.scrape_once() => {}
            }
            self.transition(ScraperState::Idle);
        }

        self.transition(ScraperState::Stopping);
        tracing::debug!(repository = %name, "scraper stopped");
        self.transition(ScraperState::Stopped);
    }

    /// One sync-then-extract cycle. Failures are logged and counted; the loop
    /// retries on the next tick.
    async fn scrape_once(&self) {
        let name = &self.repository.name;

        self.transition(ScraperState::Syncing);
        let syncer = Arc::clone(&self.syncer);
        let path = self.clone_path.clone();
        let url = self.repository.url.clone();
        let branch = self.repository.branch.clone();
        let synced =
            tokio::task::spawn_blocking(move || syncer.sync(&path, &url, branch.as_deref())).await;
        match synced {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(repository = %name, err = %e, "repository sync failed");
                self.registry.record_scrape_failure(name, "sync");
                return;
            }
            Err(e) => {
                tracing::warn!(repository = %name, err = %e, "repository sync task failed");
                self.registry.record_scrape_failure(name, "sync");
                return;
            }
        }

        self.transition(ScraperState::Extracting);
        let repository = name.clone();
        let path = self.clone_path.clone();
        let extracted =
            tokio::task::spawn_blocking(move || operators::extract(&repository, &path)).await;
        match extracted {
            Ok(Ok(report)) => {
                self.registry.record_repository(&report);
                tracing::info!(
                    repository = %name,
                    operators = report.stats.operator_count,
                    migrated = report.stats.migrated_count,
                    skipped = report.skipped.len(),
                    "repository scraped"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(repository = %name, err = %e, "operator stats extraction failed");
                self.registry.record_scrape_failure(name, "extract");
            }
            Err(e) => {
                tracing::warn!(repository = %name, err = %e, "extraction task failed");
                self.registry.record_scrape_failure(name, "extract");
            }
        }
    }

    fn transition(&self, next: ScraperState) {
        tracing::debug!(repository = %self.repository.name, state = ?next, "scraper state");
        self.state.send_replace(next);
    }
}
