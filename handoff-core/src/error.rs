use thiserror::Error;

use crate::handoff::Status;

/// The closed set of error kinds observable across the broker's component
/// boundaries. Every store primitive, dispatcher step, router call, and
/// monitor tick reports one of these — never a boxed `dyn Error` and never
/// a panic that crosses a component boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandoffError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition from {current:?} to {requested:?}")]
    InvalidTransition { current: Status, requested: Status },

    /// Not user-visible: `Pop` on an empty queue is an expected outcome.
    #[error("queue is empty")]
    Empty,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invoker failed: {0}")]
    InvokerFailure(String),

    #[error("no matching route and no default agent configured")]
    NoRoute,

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandoffError {
    pub fn validation(msg: impl Into<String>) -> Self {
        HandoffError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HandoffError::NotFound(msg.into())
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        HandoffError::StoreUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HandoffError::Internal(msg.into())
    }

    /// Whether the dispatcher should treat this as retriable (connection-layer,
    /// timeout) as opposed to terminal for the handoff being processed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, HandoffError::StoreUnavailable(_))
    }
}
