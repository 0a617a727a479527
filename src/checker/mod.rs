//! The check cycle and the loop that drives it.
//!
//! A cycle walks the tracked apps in order, one request at a time:
//! 1. fetch current metadata (failures leave the app untouched)
//! 2. diff against the stored record
//! 3. notify on first sight or version change
//! 4. record the fetch in the next store
//!
//! The next store is built from a copy of the previous one and only saved
//! once every app has been visited. [`Driver`] owns the store between cycles
//! and runs either a single cycle or the continuous loop.

use crate::config::{CheckerConfig, TrackedApp};
use crate::detector::{detect, ChangeKind};
use crate::meta::MetadataSource;
use crate::notify::Notifier;
use crate::store::{AppVersionRecord, VersionStore};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Outcome counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub fetch_failures: usize,
    pub first_seen: usize,
    pub updated: usize,
    pub notified: usize,
}

impl CycleReport {
    /// First sightings plus version changes.
    pub fn updates_detected(&self) -> usize {
        self.first_seen + self.updated
    }
}

pub struct Checker<S, N> {
    source: S,
    notifier: N,
    apps: Vec<TrackedApp>,
    request_delay: Duration,
}

impl<S: MetadataSource, N: Notifier> Checker<S, N> {
    pub fn new(source: S, notifier: N, apps: Vec<TrackedApp>, request_delay: Duration) -> Self {
        Self {
            source,
            notifier,
            apps,
            request_delay,
        }
    }

    pub fn apps(&self) -> &[TrackedApp] {
        &self.apps
    }

    /// Run one pass over every tracked app. Returns the store to persist;
    /// `previous` is never modified.
    pub async fn run_cycle(&self, previous: &VersionStore) -> (VersionStore, CycleReport) {
        info!(apps = self.apps.len(), "starting update check");

        let mut next = previous.clone();
        let mut report = CycleReport::default();

        for (i, app) in self.apps.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            info!(app_id = %app.id, name = %app.display_name, "checking app");
            report.checked += 1;

            let Some(current) = self.source.fetch(&app.id).await else {
                report.fetch_failures += 1;
                continue;
            };

            info!(
                app_id = %app.id,
                name = %current.name,
                version = %current.version,
                "found app"
            );

            if let Some(change) = detect(&app.id, previous.get(&app.id), &current) {
                match change.kind {
                    ChangeKind::FirstSight => report.first_seen += 1,
                    ChangeKind::Update => report.updated += 1,
                }
                info!(
                    app_id = %app.id,
                    name = %change.name,
                    kind = %change.kind,
                    old = %change.old_version,
                    new = %change.new_version,
                    "version change detected"
                );
                if self.notifier.notify(&change).await {
                    report.notified += 1;
                }
            }

            next.upsert(AppVersionRecord::from_metadata(&app.id, &current, Utc::now()));
        }

        info!(
            checked = report.checked,
            failed = report.fetch_failures,
            first_seen = report.first_seen,
            updated = report.updated,
            notified = report.notified,
            "update check complete"
        );

        (next, report)
    }
}

/// Owns the version store between cycles and decides when cycles run.
pub struct Driver<S, N> {
    checker: Checker<S, N>,
    store: VersionStore,
    state_path: PathBuf,
    check_interval: Duration,
    retry_cooldown: Duration,
}

impl<S: MetadataSource, N: Notifier> Driver<S, N> {
    pub fn new(checker: Checker<S, N>, store: VersionStore, config: &CheckerConfig) -> Self {
        Self {
            checker,
            store,
            state_path: config.state_file.clone(),
            check_interval: Duration::from_secs(config.check_interval_secs),
            retry_cooldown: Duration::from_secs(config.retry_cooldown_secs),
        }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// One cycle followed by a save. The in-memory store only advances once
    /// the file has been written.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        let (next, report) = self.checker.run_cycle(&self.store).await;
        next.save(&self.state_path)
            .with_context(|| format!("failed to save versions to {}", self.state_path.display()))?;
        self.store = next;
        Ok(report)
    }

    /// Run a single cycle and return the number of updates detected.
    pub async fn run_single(&mut self) -> Result<usize> {
        info!("running single update check");
        let report = self.run_once().await?;
        Ok(report.updates_detected())
    }

    /// Run cycles until `shutdown` flips to true. The first cycle starts
    /// immediately. A stop request is honoured between cycles only, so a
    /// running cycle always finishes or fails as a whole.
    pub async fn run_continuous(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            interval_secs = self.check_interval.as_secs(),
            apps = self.checker.apps().len(),
            "update checker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_once().await {
                Ok(_) => {
                    info!(
                        secs = self.check_interval.as_secs(),
                        "waiting until next check"
                    );
                    self.check_interval
                }
                Err(e) => {
                    error!(
                        error = %format!("{:#}", e),
                        retry_secs = self.retry_cooldown.as_secs(),
                        "update check failed"
                    );
                    self.retry_cooldown
                }
            };

            if sleep_unless_stopped(&mut shutdown, pause).await {
                break;
            }
        }

        info!("update checker stopped");
        Ok(())
    }
}

/// Sleep for `pause`, returning early with `true` if a stop is requested.
async fn sleep_unless_stopped(shutdown: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    let sleep = tokio::time::sleep(pause);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }

    // Sender gone: nobody can ask us to stop any more.
    warn!("shutdown channel closed");
    sleep.await;
    false
}
