//! Bounded pool that runs actuation passes off the scheduler tasks.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::actuator::ResourceActuator;
use crate::resource::ResourceCheckEvent;

/// A reserved worker slot. Dropping it unused frees the slot.
pub struct Slot(OwnedSemaphorePermit);

/// Spawns one task per actuation, at most `size` at a time.
///
/// Failures are logged by the actuator and stay inside the spawned task, so a
/// failing resource never affects the caller or other resources.
#[derive(Clone)]
pub struct ActuationPool {
    actuator: Arc<ResourceActuator>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ActuationPool {
    pub fn new(actuator: Arc<ResourceActuator>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            actuator,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Free worker slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Reserve up to `max` free slots without waiting.
    pub fn reserve(&self, max: usize) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(max.min(self.size));
        while slots.len() < max {
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => slots.push(Slot(permit)),
                Err(_) => break,
            }
        }
        slots
    }

    /// Start an actuation in a slot reserved earlier.
    pub fn dispatch_reserved(&self, check: ResourceCheckEvent, slot: Slot) {
        self.spawn(check, slot.0);
    }

    /// Start an actuation if a slot is free. Returns `false` without
    /// blocking when the pool is saturated.
    pub fn try_dispatch(&self, check: ResourceCheckEvent) -> bool {
        match self.reserve(1).pop() {
            Some(slot) => {
                self.dispatch_reserved(check, slot);
                true
            }
            None => {
                debug!(resource = %check.name, "Actuation pool saturated");
                false
            }
        }
    }

    /// Start an actuation, waiting for a free slot.
    pub async fn dispatch(&self, check: ResourceCheckEvent) {
        match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => self.spawn(check, permit),
            Err(_) => warn!(resource = %check.name, "Actuation pool closed, dropping check"),
        }
    }

    /// Wait until every running actuation has finished and stop accepting
    /// new ones.
    pub async fn drain(&self) {
        let size = u32::try_from(self.size).unwrap_or(u32::MAX);
        if let Ok(all) = self.permits.acquire_many(size).await {
            all.forget();
        }
        self.permits.close();
        debug!("Actuation pool drained");
    }

    fn spawn(&self, check: ResourceCheckEvent, permit: OwnedSemaphorePermit) {
        let actuator = Arc::clone(&self.actuator);
        tokio::spawn(async move {
            // Errors are already logged and published by the actuator.
            let _ = actuator.check_resource(&check).await;
            drop(permit);
        });
    }
}
