//! steward: resource actuation daemon.
//!
//! Loads a desired-state manifest, then keeps every resource converged:
//! - a full sweep requests a check for every known resource
//! - a liveness-gated poll feeds due resources to a bounded worker pool
//! - each check diffs desired against observed state and calls the
//!   resource's handler to create or update it

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use steward_core::{
    ActuationEvent, ActuationPauser, ActuationPool, ChannelCheckQueue, CheckQueueWorker,
    EngineConfig, EventPublisher, InMemoryResourceRepository, Liveness, ResourceActuationScheduler,
    ResourceActuator, ResourceCheckScheduler, ResourcePersister,
};

mod handlers;
mod manifest;

#[derive(Parser, Debug)]
#[command(name = "steward", version)]
#[command(about = "steward - converges resources toward their declared state")]
struct Args {
    /// JSON manifest of resources to manage
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Directory managed by the local-file handler
    #[arg(long, default_value = "/var/lib/steward")]
    state_dir: PathBuf,

    /// Due-list poll period in seconds
    #[arg(long, default_value = "1")]
    check_tick: u64,

    /// Minimum seconds between two checks of the same resource
    #[arg(long, default_value = "60")]
    check_min_age: u64,

    /// Resources pulled from the due list per poll
    #[arg(long, default_value = "1")]
    check_batch_size: usize,

    /// Full sweep period in seconds
    #[arg(long, default_value = "60")]
    sweep_interval: u64,

    /// Maximum concurrent actuations
    #[arg(long, default_value = "8")]
    workers: usize,

    /// Timeout for each handler call in seconds
    #[arg(long, default_value = "30")]
    handler_timeout: u64,

    /// Check queue capacity
    #[arg(long, default_value = "1024")]
    queue_capacity: usize,

    /// Resources to start with actuation paused (can be repeated)
    #[arg(long)]
    pause: Vec<String>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            check_tick: Duration::from_secs(self.check_tick.max(1)),
            check_min_age: Duration::from_secs(self.check_min_age),
            check_batch_size: self.check_batch_size,
            sweep_interval: Duration::from_secs(self.sweep_interval.max(1)),
            worker_count: self.workers,
            handler_timeout: Duration::from_secs(self.handler_timeout),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_filter {
        Some(filter) => EnvFilter::try_new(filter).context("invalid --log-filter")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "steward=info,steward_core=info".into()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.engine_config();
    info!("Starting steward");
    info!("State directory: {}", args.state_dir.display());
    debug!(?config, "Engine configuration");

    tokio::fs::create_dir_all(&args.state_dir)
        .await
        .with_context(|| format!("failed to create {}", args.state_dir.display()))?;

    let repository = Arc::new(InMemoryResourceRepository::new());
    let registry = Arc::new(handlers::builtin(&args.state_dir));
    for kind in registry.kinds() {
        info!(%kind, "Registered handler");
    }

    let events = EventPublisher::default();
    spawn_event_logger(events.subscribe());

    let pauser = Arc::new(ActuationPauser::new());
    for name in &args.pause {
        pauser.pause(name);
    }

    let actuator = Arc::new(
        ResourceActuator::new(
            repository.clone(),
            registry.clone(),
            events,
            config.handler_timeout,
        )
        .with_pauser(pauser),
    );
    let pool = ActuationPool::new(actuator, config.worker_count);

    let (queue, queue_rx) = ChannelCheckQueue::new(config.queue_capacity);
    let queue = Arc::new(queue);
    let persister = ResourcePersister::new(repository.clone(), registry, queue.clone());

    if let Some(path) = &args.manifest {
        let resources = manifest::load(path).await?;
        manifest::apply(&persister, resources).await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (liveness_tx, liveness_rx) = broadcast::channel(4);

    let worker = CheckQueueWorker::new(queue_rx, pool.clone());
    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));

    let sweeper = Arc::new(ResourceActuationScheduler::new(
        repository.clone(),
        queue,
        config.sweep_interval,
    ));
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    let checker = Arc::new(ResourceCheckScheduler::new(repository, pool.clone(), &config));
    let checker_handle = tokio::spawn(checker.run(liveness_rx, shutdown_rx));

    // Startup is complete once every task is running.
    let _ = liveness_tx.send(Liveness::Up);
    info!("steward is up");

    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = liveness_tx.send(Liveness::Down);
    let _ = shutdown_tx.send(true);

    for (name, handle) in [
        ("check queue worker", worker_handle),
        ("actuation scheduler", sweeper_handle),
        ("check scheduler", checker_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Task ended abnormally");
        }
    }

    // Let actuations that already started finish their handler calls.
    info!("Waiting for in-flight actuations");
    if tokio::time::timeout(config.handler_timeout, pool.drain())
        .await
        .is_err()
    {
        warn!("In-flight actuations did not finish within the handler timeout");
    }

    info!("Shutdown complete");
    Ok(())
}

fn spawn_event_logger(mut rx: broadcast::Receiver<ActuationEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(
                    resource = %event.name,
                    kind = %event.resource_kind,
                    event = event.event_type(),
                    "Actuation event"
                ),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
