//! Per-resource actuation pausing.

use std::collections::HashSet;
use std::sync::RwLock;

use tracing::info;

/// Names of resources whose actuation is paused. Paused resources are still
/// checked on schedule but the actuator stops before calling their handler.
#[derive(Debug, Default)]
pub struct ActuationPauser {
    paused: RwLock<HashSet<String>>,
}

impl ActuationPauser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self, name: &str) {
        let inserted = self
            .paused
            .write()
            .map(|mut p| p.insert(name.to_string()))
            .unwrap_or(false);
        if inserted {
            info!(resource = %name, "Paused actuation");
        }
    }

    pub fn resume(&self, name: &str) {
        let removed = self
            .paused
            .write()
            .map(|mut p| p.remove(name))
            .unwrap_or(false);
        if removed {
            info!(resource = %name, "Resumed actuation");
        }
    }

    pub fn is_paused(&self, name: &str) -> bool {
        self.paused
            .read()
            .map(|p| p.contains(name))
            .unwrap_or(false)
    }
}
