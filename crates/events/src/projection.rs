use async_trait::async_trait;

use crate::{Event, ProjectionError};

/// Why a projection left the read model untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event targets an identity the read model has never seen (or already deleted).
    IdentityMissing,
    /// The event would not change the stored record.
    NoChange,
}

/// What applying one event did to the read model.
///
/// Only store failures are errors; everything else is an outcome so the
/// consumer can log it and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The read model changed.
    Applied,
    /// The read model already reflected the event (redelivery or duplicate create).
    AlreadyApplied,
    /// The event was valid but had nothing to act on.
    Skipped(SkipReason),
    /// The event kind is not one this projection handles.
    Ignored,
}

impl ProjectionOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// A projection folds upstream events into a local read model.
///
/// Implementations must be idempotent: delivery is at-least-once, so applying
/// the same event twice leaves the read model exactly as applying it once.
#[async_trait]
pub trait Projection: Send + Sync {
    type Ev: Event;

    /// Apply a single event to the read model.
    async fn apply(&self, event: &Self::Ev) -> Result<ProjectionOutcome, ProjectionError>;
}
