//! Resource repository contract and an in-memory implementation.
//!
//! The repository is the single source of truth for desired state and for
//! "when was this resource last checked".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::RepositoryError;
use crate::resource::{Resource, ResourceCheckEvent};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Durable store of resource definitions and check scheduling metadata.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Get a resource by name.
    async fn get(&self, name: &str) -> Result<Resource>;

    /// Insert or replace a resource. Storing marks the resource as due for
    /// check immediately.
    async fn store(&self, resource: &Resource) -> Result<()>;

    /// Delete a resource by name.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Stream every known resource through `callback` without materializing
    /// the whole set.
    async fn all_resources(
        &self,
        callback: &mut (dyn FnMut(ResourceCheckEvent) + Send),
    ) -> Result<()>;

    /// Claim up to `limit` resources not checked within `min_interval`,
    /// oldest first. Claimed resources count as checked from now on.
    async fn next_resources_due_for_check(
        &self,
        min_interval: Duration,
        limit: usize,
    ) -> Result<Vec<ResourceCheckEvent>>;
}

struct Entry {
    resource: Resource,
    /// `None` until first checked; unchecked entries are always due.
    last_checked: Option<Instant>,
}

/// In-memory repository. Due-list pulls are atomic under the write lock, so
/// concurrent pullers never claim the same resource twice within an interval.
#[derive(Default)]
pub struct InMemoryResourceRepository {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryResourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn get(&self, name: &str) -> Result<Resource> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|e| e.resource.clone())
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
    }

    async fn store(&self, resource: &Resource) -> Result<()> {
        self.entries.write().await.insert(
            resource.name().to_string(),
            Entry {
                resource: resource.clone(),
                last_checked: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
    }

    async fn all_resources(
        &self,
        callback: &mut (dyn FnMut(ResourceCheckEvent) + Send),
    ) -> Result<()> {
        // Snapshot the headers first so the callback never runs under the lock.
        let headers: Vec<ResourceCheckEvent> = self
            .entries
            .read()
            .await
            .values()
            .map(|e| e.resource.check_event())
            .collect();
        headers.into_iter().for_each(callback);
        Ok(())
    }

    async fn next_resources_due_for_check(
        &self,
        min_interval: Duration,
        limit: usize,
    ) -> Result<Vec<ResourceCheckEvent>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let mut due: Vec<(&String, Option<Instant>)> = entries
            .iter()
            .filter(|(_, e)| match e.last_checked {
                Some(at) => now.saturating_duration_since(at) >= min_interval,
                None => true,
            })
            .map(|(name, e)| (name, e.last_checked))
            .collect();
        // None sorts before Some, so never-checked resources go first.
        due.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let names: Vec<String> = due.into_iter().take(limit).map(|(n, _)| n.clone()).collect();

        let mut claimed = Vec::with_capacity(names.len());
        for name in names {
            if let Some(entry) = entries.get_mut(&name) {
                entry.last_checked = Some(now);
                claimed.push(entry.resource.check_event());
            }
        }
        Ok(claimed)
    }
}
