//! Resource model: the declared unit of management and the lightweight
//! projections the engine passes around.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The (apiVersion, kind) pair a handler is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKind {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Resource metadata. `name` is unique within the managed namespace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A managed resource.
///
/// The spec is type-erased (`serde_json::Value`) while stored and queued; the
/// handler registered for the resource's kind decodes it into its own spec
/// type via [`Resource::typed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<S = Value> {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ResourceMetadata,
    pub spec: S,
}

impl<S> Resource<S> {
    pub fn new(kind: ResourceKind, name: impl Into<String>, spec: S) -> Self {
        Self {
            api_version: kind.api_version,
            kind: kind.kind,
            metadata: ResourceMetadata {
                name: name.into(),
                labels: BTreeMap::new(),
            },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn resource_kind(&self) -> ResourceKind {
        ResourceKind::new(&self.api_version, &self.kind)
    }

    /// Projection used to request a check of this resource.
    pub fn check_event(&self) -> ResourceCheckEvent {
        ResourceCheckEvent {
            name: self.metadata.name.clone(),
            kind: self.resource_kind(),
        }
    }

    fn with_spec<T>(self, spec: T) -> Resource<T> {
        Resource {
            api_version: self.api_version,
            kind: self.kind,
            metadata: self.metadata,
            spec,
        }
    }
}

impl Resource<Value> {
    /// Decode the opaque spec into a handler's concrete spec type.
    pub fn typed<S: DeserializeOwned>(&self) -> Result<Resource<S>, serde_json::Error> {
        let spec = serde_json::from_value(self.spec.clone())?;
        Ok(self.clone().with_spec(spec))
    }
}

impl<S: Serialize> Resource<S> {
    /// Erase the concrete spec type back into the stored representation.
    pub fn erased(self) -> Result<Resource<Value>, serde_json::Error> {
        let spec = serde_json::to_value(&self.spec)?;
        Ok(self.with_spec(spec))
    }
}

/// A request to reconcile one resource.
///
/// Only the identity travels; the desired state is always re-read from the
/// repository when the check runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceCheckEvent {
    pub name: String,
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl ResourceCheckEvent {
    pub fn new(
        name: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::new(api_version, kind),
        }
    }
}

impl fmt::Display for ResourceCheckEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Lifecycle intent produced by whatever layer owns user-facing mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "resource", rename_all = "UPPERCASE")]
pub enum ResourceEvent {
    Create(Resource),
    Update(Resource),
    Delete(Resource),
}

impl ResourceEvent {
    pub fn resource(&self) -> &Resource {
        match self {
            ResourceEvent::Create(r) | ResourceEvent::Update(r) | ResourceEvent::Delete(r) => r,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ResourceEvent::Create(_) => "create",
            ResourceEvent::Update(_) => "update",
            ResourceEvent::Delete(_) => "delete",
        }
    }
}
