//! Local file handler - keeps `<state_dir>/<name>` holding the declared content.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use steward_core::handler::Result;
use steward_core::{HandlerError, Resource, ResourceDiff, ResourceHandler, ResourceKind};

pub const API_VERSION: &str = "steward/v1";
pub const KIND: &str = "local-file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileSpec {
    pub content: String,
}

pub struct LocalFileHandler {
    state_dir: PathBuf,
}

impl LocalFileHandler {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    async fn write(&self, resource: &Resource<LocalFileSpec>) -> Result<()> {
        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| {
                HandlerError::failed(format!("create {}: {e}", self.state_dir.display()))
            })?;
        let path = self.path_for(resource.name());
        tokio::fs::write(&path, &resource.spec.content)
            .await
            .map_err(|e| HandlerError::failed(format!("write {}: {e}", path.display())))
    }
}

/// File names must stay inside the state directory.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(HandlerError::validation(format!("invalid file name {name:?}")));
    }
    if name.contains(['/', '\\']) || Path::new(name).is_absolute() {
        return Err(HandlerError::validation(format!(
            "file name {name:?} must not contain path separators"
        )));
    }
    Ok(())
}

#[async_trait]
impl ResourceHandler for LocalFileHandler {
    type Spec = LocalFileSpec;

    fn supported_kind(&self) -> ResourceKind {
        ResourceKind::new(API_VERSION, KIND)
    }

    async fn validate(
        &self,
        resource: Resource<LocalFileSpec>,
        _is_new: bool,
    ) -> Result<Resource<LocalFileSpec>> {
        check_name(resource.name())?;
        Ok(resource)
    }

    async fn current(&self, resource: &Resource<LocalFileSpec>) -> Result<Option<LocalFileSpec>> {
        let path = self.path_for(resource.name());
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(LocalFileSpec { content })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // Anything else means we can't tell whether the file matches.
            Err(e) => Err(HandlerError::conflict(format!("read {}: {e}", path.display()))),
        }
    }

    async fn create(&self, resource: &Resource<LocalFileSpec>) -> Result<()> {
        info!(path = %self.path_for(resource.name()).display(), "Creating file");
        self.write(resource).await
    }

    async fn update(&self, resource: &Resource<LocalFileSpec>, _diff: &ResourceDiff) -> Result<()> {
        info!(path = %self.path_for(resource.name()).display(), "Rewriting file");
        self.write(resource).await
    }

    async fn finalize(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Removed file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HandlerError::failed(format!("remove {}: {e}", path.display()))),
        }
    }
}
