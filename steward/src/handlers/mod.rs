//! Resource handlers shipped with the daemon.

pub mod local_file;

use std::path::Path;

use steward_core::HandlerRegistry;

pub use local_file::LocalFileHandler;

/// Registry with every built-in handler.
pub fn builtin(state_dir: &Path) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(LocalFileHandler::new(state_dir));
    registry
}
