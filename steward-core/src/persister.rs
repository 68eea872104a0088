//! Turns lifecycle events into repository writes plus a check request.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{HandlerError, PersistError};
use crate::handler::HandlerRegistry;
use crate::queue::ResourceCheckQueue;
use crate::repository::ResourceRepository;
use crate::resource::{Resource, ResourceEvent};

/// Result type for persister operations.
pub type Result<T> = std::result::Result<T, PersistError>;

/// Single entry point for create, update and delete intent.
///
/// Every successfully processed event results in exactly one check request.
pub struct ResourcePersister {
    repository: Arc<dyn ResourceRepository>,
    handlers: Arc<HandlerRegistry>,
    queue: Arc<dyn ResourceCheckQueue>,
}

impl ResourcePersister {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        handlers: Arc<HandlerRegistry>,
        queue: Arc<dyn ResourceCheckQueue>,
    ) -> Self {
        Self {
            repository,
            handlers,
            queue,
        }
    }

    /// Apply a lifecycle event.
    ///
    /// Returns the validated resource for create and update, and the
    /// detached original for delete.
    pub async fn handle(&self, event: ResourceEvent) -> Result<Resource> {
        let action = event.action();
        let resource = match event {
            ResourceEvent::Create(resource) => self.upsert(resource, true).await?,
            ResourceEvent::Update(resource) => self.upsert(resource, false).await?,
            ResourceEvent::Delete(resource) => {
                let kind = resource.resource_kind();
                self.handlers.supporting(&kind)?;
                let stored = self.repository.get(resource.name()).await?.resource_kind();
                if stored != kind {
                    warn!(
                        resource = %resource.name(),
                        %stored,
                        requested = %kind,
                        "Refusing delete of another kind"
                    );
                    return Err(PersistError::KindMismatch {
                        name: resource.name().to_string(),
                        stored,
                        requested: kind,
                    });
                }
                self.repository.delete(resource.name()).await?;
                resource
            }
        };

        info!(
            resource = %resource.name(),
            kind = %resource.resource_kind(),
            action,
            "Persisted resource"
        );
        self.queue.schedule_check(resource.check_event())?;
        Ok(resource)
    }

    pub async fn create(&self, resource: Resource) -> Result<Resource> {
        self.handle(ResourceEvent::Create(resource)).await
    }

    pub async fn update(&self, resource: Resource) -> Result<Resource> {
        self.handle(ResourceEvent::Update(resource)).await
    }

    pub async fn delete(&self, resource: Resource) -> Result<Resource> {
        self.handle(ResourceEvent::Delete(resource)).await
    }

    async fn upsert(&self, resource: Resource, is_new: bool) -> Result<Resource> {
        let handler = self.handlers.supporting(&resource.resource_kind())?;
        let name = resource.name().to_string();

        let validated = handler
            .validate(resource, is_new)
            .await
            .map_err(|e| match e {
                HandlerError::Validation(reason) => {
                    warn!(resource = %name, %reason, "Rejected invalid resource");
                    PersistError::Validation { name: name.clone(), reason }
                }
                source => PersistError::Handler {
                    name: name.clone(),
                    source,
                },
            })?;

        self.repository.store(&validated).await?;
        Ok(validated)
    }
}
