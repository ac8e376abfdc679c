//! Drives album pairs once or on a fixed interval.

use crate::error::{SyncError, SyncResult};
use crate::pipeline::{AlbumPair, PairOutcome, Pipeline};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Every(Duration),
}

impl RunMode {
    /// `None` runs once.
    pub fn from_interval(every: Option<Duration>) -> Self {
        match every {
            Some(interval) => Self::Every(interval),
            None => Self::Once,
        }
    }
}

/// Result of one pass over all pairs.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<PairOutcome>,
    /// Album name and error for each failed pair.
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    /// Fail with [`SyncError::PairsFailed`] if any pair failed.
    pub fn check(&self) -> SyncResult<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::PairsFailed {
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }
}

pub struct RunLoop {
    pipeline: Pipeline,
    pairs: Vec<AlbumPair>,
    mode: RunMode,
}

impl RunLoop {
    pub fn new(pipeline: Pipeline, pairs: Vec<AlbumPair>, mode: RunMode) -> Self {
        Self {
            pipeline,
            pairs,
            mode,
        }
    }

    /// Sync every pair in order. A failing pair is logged and the rest still run.
    pub async fn run_pass(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for pair in &self.pairs {
            match self.pipeline.sync_pair(pair).await {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(album = %pair.name, error = %e, "album sync failed");
                    summary.failures.push((pair.name.clone(), e.to_string()));
                }
            }
        }
        summary
    }

    /// Run until the mode is exhausted.
    pub async fn run(&self) -> SyncResult<RunSummary> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the mode is exhausted or `shutdown` resolves.
    ///
    /// Failed pairs do not fail the run; they are listed in the returned
    /// summary and [`RunSummary::check`] turns them into an error. Every mode
    /// returns the last pass's summary after shutdown, which is checked
    /// between passes. A zero interval is rejected before any pass runs.
    pub async fn run_until<F>(&self, shutdown: F) -> SyncResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        match self.mode {
            RunMode::Once => Ok(self.run_pass().await),
            RunMode::Every(interval) if interval.is_zero() => Err(SyncError::InvalidRunMode(
                "sync interval must be greater than zero".to_string(),
            )),
            RunMode::Every(interval) => {
                tokio::pin!(shutdown);
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                let mut last = RunSummary::default();
                let mut passes: u64 = 0;
                loop {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            tracing::info!(passes, "shutdown requested, stopping sync loop");
                            return Ok(last);
                        }
                        _ = ticker.tick() => {
                            passes += 1;
                            last = self.run_pass().await;
                            tracing::info!(
                                pass = passes,
                                succeeded = last.outcomes.len(),
                                failed = last.failures.len(),
                                next_in_secs = interval.as_secs(),
                                "sync pass finished"
                            );
                        }
                    }
                }
            }
        }
    }
}
