//! Desired-state manifest loaded at startup.
//!
//! A manifest is a JSON array of resources:
//!
//! ```json
//! [{"apiVersion": "steward/v1", "kind": "local-file",
//!   "metadata": {"name": "motd"}, "spec": {"content": "hello"}}]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use steward_core::{Resource, ResourcePersister};

pub async fn load(path: &Path) -> Result<Vec<Resource>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let resources: Vec<Resource> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    Ok(resources)
}

/// Persist every manifest resource. Rejected resources are logged and skipped.
/// Returns how many were accepted.
pub async fn apply(persister: &ResourcePersister, resources: Vec<Resource>) -> usize {
    let total = resources.len();
    let mut accepted = 0;
    for resource in resources {
        let name = resource.name().to_string();
        match persister.create(resource).await {
            Ok(_) => accepted += 1,
            Err(e) => warn!(resource = %name, error = %e, "Skipping manifest resource"),
        }
    }
    info!(accepted, total, "Applied manifest");
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use steward_core::{ChannelCheckQueue, InMemoryResourceRepository, ResourceRepository};
    use tempfile::TempDir;

    use crate::handlers;

    const MANIFEST: &str = r#"[
        {"apiVersion": "steward/v1", "kind": "local-file",
         "metadata": {"name": "motd"}, "spec": {"content": "hello"}},
        {"apiVersion": "steward/v1", "kind": "local-file",
         "metadata": {"name": "../escape"}, "spec": {"content": "nope"}},
        {"apiVersion": "v1", "kind": "cluster",
         "metadata": {"name": "web-1"}, "spec": {"replicas": 3}}
    ]"#;

    #[tokio::test]
    async fn test_load_and_apply() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, MANIFEST).await.unwrap();

        let resources = load(&path).await.unwrap();
        assert_eq!(resources.len(), 3);

        let repo = Arc::new(InMemoryResourceRepository::new());
        let (queue, _rx) = ChannelCheckQueue::new(8);
        let persister = ResourcePersister::new(
            repo.clone(),
            Arc::new(handlers::builtin(dir.path())),
            Arc::new(queue),
        );

        // Only the well-formed local file of a supported kind is kept.
        assert_eq!(apply(&persister, resources).await, 1);
        assert_eq!(repo.len().await, 1);
        assert!(repo.get("motd").await.is_ok());
    }

    #[tokio::test]
    async fn test_load_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse manifest"));
    }
}
