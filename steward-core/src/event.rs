//! Events emitted by the actuator.
//!
//! Dispatched on a broadcast channel. Having no subscribers is normal; a
//! failed send never affects an actuation pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::resource::{ResourceCheckEvent, ResourceKind};

/// Which mutation the actuator launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuationAction {
    Create,
    Update,
}

/// Why a check ended before talking to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Paused,
    ActuationInProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActuationEventKind {
    /// No observed state; the resource is about to be created.
    ResourceMissing,
    /// Observed state matches desired state.
    ResourceValid,
    /// Observed state differs from desired state.
    ResourceDeltaDetected { delta: Value },
    /// A create or update call returned successfully.
    ResourceActuationLaunched { action: ActuationAction },
    /// Current state could not be determined; retried on the next check.
    ResourceCheckUnresolvable { reason: String },
    /// The check failed.
    ResourceCheckError { error: String },
    ResourceCheckSkipped { reason: SkipReason },
    /// The resource is gone from the repository and its handler cleaned up.
    ResourceFinalized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuationEvent {
    pub name: String,
    #[serde(flatten)]
    pub resource_kind: ResourceKind,
    #[serde(flatten)]
    pub kind: ActuationEventKind,
    pub timestamp: DateTime<Utc>,
}

impl ActuationEvent {
    pub fn new(check: &ResourceCheckEvent, kind: ActuationEventKind) -> Self {
        Self {
            name: check.name.clone(),
            resource_kind: check.kind.clone(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Short event type name for logs.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            ActuationEventKind::ResourceMissing => "resource_missing",
            ActuationEventKind::ResourceValid => "resource_valid",
            ActuationEventKind::ResourceDeltaDetected { .. } => "resource_delta_detected",
            ActuationEventKind::ResourceActuationLaunched { .. } => "resource_actuation_launched",
            ActuationEventKind::ResourceCheckUnresolvable { .. } => "resource_check_unresolvable",
            ActuationEventKind::ResourceCheckError { .. } => "resource_check_error",
            ActuationEventKind::ResourceCheckSkipped { .. } => "resource_check_skipped",
            ActuationEventKind::ResourceFinalized => "resource_finalized",
        }
    }
}

/// Sending half of the actuation event channel.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<ActuationEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActuationEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ActuationEvent) {
        tracing::trace!(
            resource = %event.name,
            event = event.event_type(),
            "Publishing actuation event"
        );
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
