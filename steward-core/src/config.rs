//! Engine configuration.

use std::time::Duration;

/// Timing and sizing knobs for the actuation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the due-list poll.
    pub check_tick: Duration,
    /// Minimum time between two checks of the same resource.
    pub check_min_age: Duration,
    /// Resources pulled from the due list per tick.
    pub check_batch_size: usize,
    /// Period of the full repository sweep.
    pub sweep_interval: Duration,
    /// Maximum concurrent actuation passes.
    pub worker_count: usize,
    /// Upper bound on each handler call.
    pub handler_timeout: Duration,
    /// Capacity of the check queue channel.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_tick: Duration::from_secs(1),
            check_min_age: Duration::from_secs(60),
            check_batch_size: 1,
            sweep_interval: Duration::from_secs(60),
            worker_count: 8,
            handler_timeout: Duration::from_secs(30),
            queue_capacity: 1024,
        }
    }
}
