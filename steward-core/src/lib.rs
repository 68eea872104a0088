pub mod actuator;
pub mod config;
pub mod diff;
pub mod error;
pub mod event;
pub mod handler;
pub mod pause;
pub mod persister;
pub mod queue;
pub mod repository;
pub mod resource;
pub mod scheduler;
pub mod worker;

pub use actuator::{CheckOutcome, ResourceActuator};
pub use config::EngineConfig;
pub use diff::{Change, DiffNode, ResourceDiff};
pub use error::{
    ActuationError, HandlerError, PersistError, QueueError, RepositoryError, UnsupportedKind,
};
pub use event::{ActuationAction, ActuationEvent, ActuationEventKind, EventPublisher, SkipReason};
pub use handler::{ErasedHandler, HandlerRegistry, ResourceHandler};
pub use pause::ActuationPauser;
pub use persister::ResourcePersister;
pub use queue::{ChannelCheckQueue, CheckQueueReceiver, CheckQueueWorker, ResourceCheckQueue};
pub use repository::{InMemoryResourceRepository, ResourceRepository};
pub use resource::{Resource, ResourceCheckEvent, ResourceEvent, ResourceKind, ResourceMetadata};
pub use scheduler::{Liveness, ResourceActuationScheduler, ResourceCheckScheduler, SweepReport};
pub use worker::{ActuationPool, Slot};
