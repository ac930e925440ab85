//! Scheduled sweeps
//!
//! Runs orphan reconciliation then unused-vocabulary reclamation on a fixed
//! interval, outside the request path. A failed pass is logged and the loop
//! carries on; only the cancellation token stops it.

use crate::cascade::{CascadeEngine, ReconcileReport};
use crate::error::CoreResult;
use crate::privileges::Actor;
use crate::reclaim::{ReclamationSweeper, SweepReport};
use crate::Catalog;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct SweepScheduler {
    cascade: CascadeEngine,
    sweeper: ReclamationSweeper,
    actor: Actor,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(catalog: &Catalog, actor: Actor, interval: Duration) -> Self {
        Self {
            cascade: catalog.cascade(),
            sweeper: catalog.sweeper(),
            actor,
            interval,
        }
    }

    /// One reconciliation pass followed by one reclamation pass
    pub async fn run_once(&self) -> CoreResult<(ReconcileReport, SweepReport)> {
        let reconciled = self.cascade.reconcile_orphans(&self.actor).await?;
        let reclaimed = self.sweeper.sweep_unused(&self.actor).await?;
        Ok((reconciled, reclaimed))
    }

    /// Sweep every interval until `cancel` fires; returns passes attempted
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut passes = 0;

        info!(interval_secs = self.interval.as_secs(), "Sweep scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    passes += 1;
                    match self.run_once().await {
                        Ok((reconciled, reclaimed)) => info!(
                            pass = passes,
                            segments = reconciled.segments,
                            images = reconciled.images,
                            vocabulary = reclaimed.total(),
                            "Scheduled sweep complete"
                        ),
                        Err(e) => error!(pass = passes, error = %e, "Scheduled sweep failed"),
                    }
                }
            }
        }

        info!(passes = passes, "Sweep scheduler stopped");
        passes
    }
}
