//! Periodic drivers of reconciliation.
//!
//! Two independent timers keep the system self-healing:
//! - [`ResourceActuationScheduler`]: slow full sweep that requests a check for
//!   every known resource, so nothing is skipped forever if check requests
//!   get lost.
//! - [`ResourceCheckScheduler`]: fast, liveness-gated poll of the due list
//!   that feeds the actuation pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{QueueError, RepositoryError};
use crate::queue::ResourceCheckQueue;
use crate::repository::ResourceRepository;
use crate::resource::ResourceCheckEvent;
use crate::worker::ActuationPool;

/// Application liveness transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The application finished starting and may actuate.
    Up,
    /// The application is going down.
    Down,
}

/// Summary of one full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scheduled: usize,
    pub rejected: usize,
}

pub struct ResourceActuationScheduler {
    repository: Arc<dyn ResourceRepository>,
    queue: Arc<dyn ResourceCheckQueue>,
    interval: Duration,
}

impl ResourceActuationScheduler {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        queue: Arc<dyn ResourceCheckQueue>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            queue,
            interval,
        }
    }

    /// Request a check for every resource in the repository.
    pub async fn sweep(&self) -> Result<SweepReport, RepositoryError> {
        let mut report = SweepReport::default();
        let queue = Arc::clone(&self.queue);
        let mut callback = |check: ResourceCheckEvent| match queue.schedule_check(check) {
            Ok(()) => report.scheduled += 1,
            Err(QueueError::Full) | Err(QueueError::Closed) => report.rejected += 1,
        };
        self.repository.all_resources(&mut callback).await?;
        Ok(report)
    }

    /// Sweep on every tick until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "Resource actuation scheduler started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report.rejected > 0 => warn!(
                            scheduled = report.scheduled,
                            rejected = report.rejected,
                            "Check queue rejected some checks during sweep"
                        ),
                        Ok(report) => debug!(
                            scheduled = report.scheduled,
                            "Scheduled checks for all resources"
                        ),
                        Err(e) => error!(error = %e, "Failed to enumerate resources"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Resource actuation scheduler stopped");
    }
}

pub struct ResourceCheckScheduler {
    repository: Arc<dyn ResourceRepository>,
    pool: ActuationPool,
    enabled: AtomicBool,
    tick: Duration,
    min_age: Duration,
    batch_size: usize,
}

impl ResourceCheckScheduler {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        pool: ActuationPool,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            pool,
            enabled: AtomicBool::new(false),
            tick: config.check_tick,
            min_age: config.check_min_age,
            batch_size: config.check_batch_size,
        }
    }

    pub fn on_application_up(&self) {
        info!("Application up, enabling resource checks");
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn on_application_down(&self) {
        info!("Application down, disabling resource checks");
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn on_liveness(&self, liveness: Liveness) {
        match liveness {
            Liveness::Up => self.on_application_up(),
            Liveness::Down => self.on_application_down(),
        }
    }

    /// One poll: claim due resources and hand them to the pool. Returns the
    /// number dispatched. No-op while disabled.
    pub async fn check_resources(&self) -> usize {
        if !self.is_enabled() {
            debug!("Resource checks disabled, skipping tick");
            return 0;
        }

        // Hold the worker slots before claiming, so every claimed resource
        // runs. Claimed resources are not due again until min_age passes.
        let mut slots = self.pool.reserve(self.batch_size);
        if slots.is_empty() {
            debug!("Actuation pool saturated, skipping tick");
            return 0;
        }

        let due = match self
            .repository
            .next_resources_due_for_check(self.min_age, slots.len())
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to fetch resources due for check");
                return 0;
            }
        };

        let mut dispatched = 0;
        for check in due {
            let Some(slot) = slots.pop() else { break };
            self.pool.dispatch_reserved(check, slot);
            dispatched += 1;
        }
        dispatched
    }

    /// Poll on every tick and follow liveness transitions until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut liveness: broadcast::Receiver<Liveness>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(tick = ?self.tick, batch = self.batch_size, "Resource check scheduler started");
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut liveness_open = true;

        loop {
            tokio::select! {
                event = liveness.recv(), if liveness_open => match event {
                    Ok(event) => self.on_liveness(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Missed liveness events");
                    }
                    Err(broadcast::error::RecvError::Closed) => liveness_open = false,
                },
                _ = ticker.tick() => {
                    self.check_resources().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        self.on_application_down();
        info!("Resource check scheduler stopped");
    }
}
