//! Interval job scheduler.
//!
//! Every job runs on its own tokio task with a fixed-interval ticker. Ticks
//! that land while a run is still in progress are skipped, never queued:
//! the ticker uses `MissedTickBehavior::Skip` and each job carries an
//! atomic in-flight guard, so at most one run of a given job exists at any
//! time. A run that returns an error is logged and counted; the next tick
//! proceeds normally.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Per-job counters, readable while the scheduler runs.
#[derive(Default)]
pub struct JobStats {
    runs: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    last_run_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct JobStatsSnapshot {
    pub runs: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl JobStats {
    #[must_use]
    pub fn snapshot(&self) -> JobStatsSnapshot {
        let last_run_ms = self.last_run_ms.load(Ordering::Relaxed);
        JobStatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            last_run: (last_run_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_run_ms as i64))
                .flatten(),
        }
    }
}

struct Entry {
    job: Arc<dyn Job>,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    stats: Arc<JobStats>,
}

#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job to run every `interval`. Returns its stats handle.
    pub fn add(&mut self, job: Arc<dyn Job>, interval: Duration) -> Arc<JobStats> {
        let stats = Arc::new(JobStats::default());
        self.entries.push(Entry {
            job,
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
            stats: stats.clone(),
        });
        stats
    }

    /// Runs all registered jobs until `shutdown` flips to true.
    ///
    /// # Errors
    /// Returns an error if a job task panics.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tasks = tokio::task::JoinSet::new();

        for entry in self.entries {
            let mut shutdown = shutdown.clone();
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(entry.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(job = entry.job.name(), interval = ?entry.interval, "job scheduled");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            trigger(&entry.job, &entry.in_flight, &entry.stats);
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!(job = entry.job.name(), "job stopping");
                                return;
                            }
                        }
                    }
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            result?;
        }
        Ok(())
    }
}

/// Starts one run of `job` unless a previous run is still in flight.
fn trigger(job: &Arc<dyn Job>, in_flight: &Arc<AtomicBool>, stats: &Arc<JobStats>) {
    if in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        stats.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(job = job.name(), "previous run still in flight, skipping tick");
        return;
    }

    let job = job.clone();
    let in_flight = in_flight.clone();
    let stats = stats.clone();
    tokio::spawn(async move {
        let started = Utc::now();
        if let Err(e) = job.run().await {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            error!(job = job.name(), error = %e, "job run failed");
        }
        stats.runs.fetch_add(1, Ordering::Relaxed);
        stats
            .last_run_ms
            .store(started.timestamp_millis().max(0) as u64, Ordering::Relaxed);
        in_flight.store(false, Ordering::SeqCst);
    });
}
