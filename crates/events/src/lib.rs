//! Upstream identity lifecycle events: wire envelope, typed decoding, and the
//! consumer-side seams (projection, message handler, bus).

pub mod bus;
pub mod envelope;
pub mod error;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;

pub use bus::{Delivery, EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use error::{DecodeError, ProjectionError};
pub use event::{
    Event, PasswordUpdated, ScopeChanged, UserCreated, UserDeleted, UserEvent, UserUpdated, kinds,
};
pub use handler::{HandleError, MessageHandler};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::{Projection, ProjectionOutcome, SkipReason};

/// Topic the upstream identity service publishes user lifecycle events on.
pub const USER_EVENTS_TOPIC: &str = "user-events";
