//! Check queue: "eventually check this resource".
//!
//! Producers (persister, full sweep) only promise that a check will be
//! attempted at least once, eventually. [`ChannelCheckQueue`] backs that with
//! a bounded channel drained by [`CheckQueueWorker`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{info, trace};

use crate::error::QueueError;
use crate::resource::ResourceCheckEvent;
use crate::worker::ActuationPool;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

pub trait ResourceCheckQueue: Send + Sync {
    /// Request a check of one resource. Must not block.
    fn schedule_check(&self, check: ResourceCheckEvent) -> Result<()>;
}

type Pending = Arc<Mutex<HashSet<ResourceCheckEvent>>>;

/// Channel-backed queue. A check already waiting in the channel is not
/// enqueued a second time, so overlapping sweeps coalesce.
#[derive(Clone)]
pub struct ChannelCheckQueue {
    tx: mpsc::Sender<ResourceCheckEvent>,
    pending: Pending,
}

/// Receiving half of a [`ChannelCheckQueue`].
pub struct CheckQueueReceiver {
    rx: mpsc::Receiver<ResourceCheckEvent>,
    pending: Pending,
}

impl ChannelCheckQueue {
    pub fn new(capacity: usize) -> (Self, CheckQueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pending: Pending = Arc::default();
        (
            Self {
                tx,
                pending: Arc::clone(&pending),
            },
            CheckQueueReceiver { rx, pending },
        )
    }
}

impl ResourceCheckQueue for ChannelCheckQueue {
    fn schedule_check(&self, check: ResourceCheckEvent) -> Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(check.clone()) {
            trace!(resource = %check.name, "Check already queued");
            return Ok(());
        }
        match self.tx.try_send(check) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(check)) => {
                pending.remove(&check);
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(check)) => {
                pending.remove(&check);
                Err(QueueError::Closed)
            }
        }
    }
}

impl CheckQueueReceiver {
    /// Next queued check, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ResourceCheckEvent> {
        let check = self.rx.recv().await?;
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&check);
        Some(check)
    }
}

/// Drains the check queue into the actuation pool.
pub struct CheckQueueWorker {
    receiver: CheckQueueReceiver,
    pool: ActuationPool,
}

impl CheckQueueWorker {
    pub fn new(receiver: CheckQueueReceiver, pool: ActuationPool) -> Self {
        Self { receiver, pool }
    }

    /// Run until shutdown is signalled or the queue closes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Check queue worker started");
        loop {
            tokio::select! {
                check = self.receiver.recv() => match check {
                    Some(check) => self.pool.dispatch(check).await,
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Check queue worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str) -> ResourceCheckEvent {
        ResourceCheckEvent::new(name, "v1", "cluster")
    }

    #[tokio::test]
    async fn test_duplicate_checks_coalesce() {
        let (queue, mut rx) = ChannelCheckQueue::new(8);

        queue.schedule_check(check("web-1")).unwrap();
        queue.schedule_check(check("web-1")).unwrap();
        queue.schedule_check(check("web-2")).unwrap();
        drop(queue);

        let mut received = Vec::new();
        while let Some(c) = rx.recv().await {
            received.push(c.name);
        }
        assert_eq!(received, vec!["web-1", "web-2"]);
    }

    #[tokio::test]
    async fn test_check_can_be_requeued_after_receive() {
        let (queue, mut rx) = ChannelCheckQueue::new(8);

        queue.schedule_check(check("web-1")).unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "web-1");

        queue.schedule_check(check("web-1")).unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "web-1");
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let (queue, mut rx) = ChannelCheckQueue::new(1);

        queue.schedule_check(check("web-1")).unwrap();
        assert_eq!(queue.schedule_check(check("web-2")), Err(QueueError::Full));

        // The rejected check was not left marked as pending.
        assert_eq!(rx.recv().await.unwrap().name, "web-1");
        queue.schedule_check(check("web-2")).unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "web-2");
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (queue, rx) = ChannelCheckQueue::new(1);
        drop(rx);
        assert_eq!(queue.schedule_check(check("web-1")), Err(QueueError::Closed));
    }
}
