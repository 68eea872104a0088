//! Resource handler contract and the registry the engine dispatches through.
//!
//! Handlers are written against their own spec type. The registry stores them
//! behind [`ErasedHandler`], which decodes the stored JSON spec before each
//! call, so no handler ever sees a spec of the wrong shape.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::diff::ResourceDiff;
use crate::error::{HandlerError, UnsupportedKind};
use crate::resource::{Resource, ResourceKind};

/// Result type for handler calls.
pub type Result<T> = std::result::Result<T, HandlerError>;

/// Adapter that knows how to read, create and update one kind of resource.
#[async_trait]
pub trait ResourceHandler: Send + Sync + 'static {
    /// Desired and observed state share this type.
    type Spec: Serialize + DeserializeOwned + Send + Sync;

    /// The (apiVersion, kind) this handler manages.
    fn supported_kind(&self) -> ResourceKind;

    /// Normalize and default a desired spec before it is stored.
    async fn validate(
        &self,
        resource: Resource<Self::Spec>,
        _is_new: bool,
    ) -> Result<Resource<Self::Spec>> {
        Ok(resource)
    }

    /// Observed state, `None` if the resource definitely does not exist.
    ///
    /// Return [`HandlerError::Conflict`] when the truth cannot be determined.
    async fn current(&self, resource: &Resource<Self::Spec>) -> Result<Option<Self::Spec>>;

    async fn create(&self, resource: &Resource<Self::Spec>) -> Result<()>;

    async fn update(&self, resource: &Resource<Self::Spec>, diff: &ResourceDiff) -> Result<()>;

    /// Cleanup hook run by the final check after a resource was deleted.
    async fn finalize(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

/// Object-safe view of a [`ResourceHandler`] over type-erased resources.
#[async_trait]
pub trait ErasedHandler: Send + Sync {
    fn supported_kind(&self) -> ResourceKind;

    async fn validate(&self, resource: Resource, is_new: bool) -> Result<Resource>;

    async fn current(&self, resource: &Resource) -> Result<Option<Value>>;

    async fn create(&self, resource: &Resource) -> Result<()>;

    async fn update(&self, resource: &Resource, diff: &ResourceDiff) -> Result<()>;

    async fn finalize(&self, name: &str) -> Result<()>;
}

fn decode<S: DeserializeOwned>(resource: &Resource) -> Result<Resource<S>> {
    resource.typed().map_err(|e| {
        HandlerError::validation(format!(
            "spec of {} does not match {}: {e}",
            resource.name(),
            resource.resource_kind()
        ))
    })
}

#[async_trait]
impl<H: ResourceHandler> ErasedHandler for H {
    fn supported_kind(&self) -> ResourceKind {
        ResourceHandler::supported_kind(self)
    }

    async fn validate(&self, resource: Resource, is_new: bool) -> Result<Resource> {
        let typed = decode::<H::Spec>(&resource)?;
        let validated = ResourceHandler::validate(self, typed, is_new).await?;
        validated
            .erased()
            .map_err(|e| HandlerError::failed(format!("failed to encode spec: {e}")))
    }

    async fn current(&self, resource: &Resource) -> Result<Option<Value>> {
        let typed = decode::<H::Spec>(resource)?;
        match ResourceHandler::current(self, &typed).await? {
            Some(state) => serde_json::to_value(state)
                .map(Some)
                .map_err(|e| HandlerError::failed(format!("failed to encode current state: {e}"))),
            None => Ok(None),
        }
    }

    async fn create(&self, resource: &Resource) -> Result<()> {
        let typed = decode::<H::Spec>(resource)?;
        ResourceHandler::create(self, &typed).await
    }

    async fn update(&self, resource: &Resource, diff: &ResourceDiff) -> Result<()> {
        let typed = decode::<H::Spec>(resource)?;
        ResourceHandler::update(self, &typed, diff).await
    }

    async fn finalize(&self, name: &str) -> Result<()> {
        ResourceHandler::finalize(self, name).await
    }
}

/// Handlers keyed by the kind they support. Read-only once built.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration for the same kind replaces
    /// the earlier one, so each kind maps to exactly one handler.
    pub fn register<H: ResourceHandler>(&mut self, handler: H) -> &mut Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ErasedHandler>) -> &mut Self {
        let kind = handler.supported_kind();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::warn!(kind = %kind, "Replacing previously registered handler");
        }
        self
    }

    /// Handler for `kind`, or [`UnsupportedKind`].
    pub fn supporting(
        &self,
        kind: &ResourceKind,
    ) -> std::result::Result<&Arc<dyn ErasedHandler>, UnsupportedKind> {
        self.handlers
            .get(kind)
            .ok_or_else(|| UnsupportedKind(kind.clone()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
