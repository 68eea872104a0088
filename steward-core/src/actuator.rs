//! The reconciliation decision for a single resource.
//!
//! [`ResourceActuator::check_resource`] is called for every check, whichever
//! scheduler or queue produced it. It reads the desired state from the
//! repository and the observed state from the handler registered for the
//! resource's kind, diffs them, and calls `create` or `update` on the handler
//! when they differ. It is the only component that talks to handlers during
//! actuation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::diff::ResourceDiff;
use crate::error::{ActuationError, HandlerError, RepositoryError};
use crate::event::{ActuationAction, ActuationEvent, ActuationEventKind, EventPublisher, SkipReason};
use crate::handler::{ErasedHandler, HandlerRegistry};
use crate::pause::ActuationPauser;
use crate::repository::ResourceRepository;
use crate::resource::ResourceCheckEvent;

/// Result type for actuation passes.
pub type Result<T> = std::result::Result<T, ActuationError>;

/// How an actuation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The handler reported no observed state and `create` was called.
    Created,
    /// Observed state differed and `update` was called.
    Updated,
    /// Observed state matched desired state.
    Valid,
    /// Observed state could not be determined; nothing was done.
    Unresolvable,
    /// The pass stopped before reading observed state.
    Skipped(SkipReason),
    /// The resource no longer exists and the handler's finalizer ran.
    Finalized,
}

/// Marks a resource name as having an actuation in flight until dropped.
struct InFlight<'a> {
    names: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> InFlight<'a> {
    fn acquire(names: &'a Mutex<HashSet<String>>, name: &str) -> Option<Self> {
        let mut set = names.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            names,
            name: name.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

pub struct ResourceActuator {
    repository: Arc<dyn ResourceRepository>,
    handlers: Arc<HandlerRegistry>,
    pauser: Arc<ActuationPauser>,
    events: EventPublisher,
    handler_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl ResourceActuator {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        handlers: Arc<HandlerRegistry>,
        events: EventPublisher,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            handlers,
            pauser: Arc::new(ActuationPauser::new()),
            events,
            handler_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_pauser(mut self, pauser: Arc<ActuationPauser>) -> Self {
        self.pauser = pauser;
        self
    }

    pub fn pauser(&self) -> &Arc<ActuationPauser> {
        &self.pauser
    }

    /// Run one reconciliation pass for `check`.
    ///
    /// Conflicts are recovered here and reported as [`CheckOutcome::Unresolvable`].
    /// Every `Err` has already been logged and published as a
    /// `ResourceCheckError` event when this returns.
    pub async fn check_resource(&self, check: &ResourceCheckEvent) -> Result<CheckOutcome> {
        let handler = match self.handlers.supporting(&check.kind) {
            Ok(handler) => Arc::clone(handler),
            Err(e) => {
                error!(
                    resource = %check.name,
                    kind = %check.kind,
                    "No handler registered for resource kind"
                );
                self.publish(
                    check,
                    ActuationEventKind::ResourceCheckError {
                        error: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };

        if self.pauser.is_paused(&check.name) {
            debug!(resource = %check.name, "Actuation is paused, skipping check");
            return Ok(self.skip(check, SkipReason::Paused));
        }

        let Some(_in_flight) = InFlight::acquire(&self.in_flight, &check.name) else {
            debug!(resource = %check.name, "Actuation already running, skipping check");
            return Ok(self.skip(check, SkipReason::ActuationInProgress));
        };

        debug!(resource = %check.name, kind = %check.kind, "Checking resource");
        let result = self.actuate(check, handler.as_ref()).await;
        if let Err(e) = &result {
            error!(resource = %check.name, error = %e, "Resource check failed");
            self.publish(check, ActuationEventKind::ResourceCheckError { error: e.to_string() });
        }
        result
    }

    async fn actuate(
        &self,
        check: &ResourceCheckEvent,
        handler: &dyn ErasedHandler,
    ) -> Result<CheckOutcome> {
        let resource = match self.repository.get(&check.name).await {
            Ok(resource) if resource.resource_kind() == check.kind => resource,
            Ok(resource) => {
                info!(
                    resource = %check.name,
                    checked_kind = %check.kind,
                    stored_kind = %resource.resource_kind(),
                    "Resource was replaced by another kind, finalizing the old one"
                );
                return self.finalize(check, handler).await;
            }
            Err(RepositoryError::NotFound(_)) => return self.finalize(check, handler).await,
            Err(e) => return Err(e.into()),
        };
        let name = resource.name();

        let current = match timeout(self.handler_timeout, handler.current(&resource)).await {
            Ok(Ok(current)) => current,
            Ok(Err(HandlerError::Conflict(reason))) => {
                warn!(resource = %name, %reason, "Resource check failed (hopefully temporarily)");
                self.publish(check, ActuationEventKind::ResourceCheckUnresolvable { reason });
                return Ok(CheckOutcome::Unresolvable);
            }
            Ok(Err(source)) => {
                return Err(ActuationError::Handler {
                    name: name.to_string(),
                    operation: "current",
                    source,
                });
            }
            Err(_) => {
                let reason = format!(
                    "current state not resolved within {:?}",
                    self.handler_timeout
                );
                warn!(resource = %name, %reason, "Resource check timed out");
                self.publish(check, ActuationEventKind::ResourceCheckUnresolvable { reason });
                return Ok(CheckOutcome::Unresolvable);
            }
        };

        match current {
            None => {
                warn!(resource = %name, "Resource is missing, creating");
                self.publish(check, ActuationEventKind::ResourceMissing);

                self.call(name, "create", handler.create(&resource)).await?;
                self.publish(
                    check,
                    ActuationEventKind::ResourceActuationLaunched {
                        action: ActuationAction::Create,
                    },
                );
                Ok(CheckOutcome::Created)
            }
            Some(current) => {
                let diff = ResourceDiff::new(&resource.spec, Some(&current));
                if !diff.has_changes() {
                    info!(resource = %name, "Resource is valid");
                    self.publish(check, ActuationEventKind::ResourceValid);
                    return Ok(CheckOutcome::Valid);
                }

                warn!(resource = %name, "Resource is invalid");
                info!(resource = %name, "Resource delta:\n{}", diff.to_debug());
                self.publish(
                    check,
                    ActuationEventKind::ResourceDeltaDetected {
                        delta: diff.to_delta_json(),
                    },
                );

                self.call(name, "update", handler.update(&resource, &diff)).await?;
                self.publish(
                    check,
                    ActuationEventKind::ResourceActuationLaunched {
                        action: ActuationAction::Update,
                    },
                );
                Ok(CheckOutcome::Updated)
            }
        }
    }

    async fn finalize(
        &self,
        check: &ResourceCheckEvent,
        handler: &dyn ErasedHandler,
    ) -> Result<CheckOutcome> {
        info!(resource = %check.name, kind = %check.kind, "Resource no longer exists, finalizing");
        self.call(&check.name, "finalize", handler.finalize(&check.name))
            .await?;
        self.publish(check, ActuationEventKind::ResourceFinalized);
        Ok(CheckOutcome::Finalized)
    }

    /// Await a handler mutation under the handler timeout.
    async fn call<F>(&self, name: &str, operation: &'static str, call: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), HandlerError>>,
    {
        match timeout(self.handler_timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ActuationError::Handler {
                name: name.to_string(),
                operation,
                source,
            }),
            Err(_) => Err(ActuationError::Timeout {
                name: name.to_string(),
                operation,
            }),
        }
    }

    fn skip(&self, check: &ResourceCheckEvent, reason: SkipReason) -> CheckOutcome {
        self.publish(check, ActuationEventKind::ResourceCheckSkipped { reason });
        CheckOutcome::Skipped(reason)
    }

    fn publish(&self, check: &ResourceCheckEvent, kind: ActuationEventKind) {
        self.events.publish(ActuationEvent::new(check, kind));
    }
}
