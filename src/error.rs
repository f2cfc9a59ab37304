use thiserror::Error;

use crate::desktop::{WindowError, WindowHandle};
use crate::types::EntityId;

/// Errors that stop a session. Transient window failures never reach this
/// type; they are logged and the operation is retried later.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invariant violated: entity {0} has no bound window")]
    UnboundEntity(EntityId),
    #[error("invariant violated: entity id {0} is already registered")]
    DuplicateId(EntityId),
    #[error("invariant violated: entity {0} was destroyed twice in one tick")]
    DoubleDestroy(EntityId),
    #[error("invariant violated: window {handle:?} is bound to both {first} and {second}")]
    SharedWindow {
        handle: WindowHandle,
        first: EntityId,
        second: EntityId,
    },
    #[error("no window could be created for the player: {0}")]
    WindowingUnavailable(#[source] WindowError),
}
