use thiserror::Error;

/// Errors surfaced by the event bus to publishers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,

    #[error("publish of '{topic}' timed out waiting for buffer space")]
    PublishTimeout { topic: String },
}

impl BusError {
    /// True for the error returned after `EventBus::close`.
    pub fn is_closed(&self) -> bool {
        matches!(self, BusError::Closed)
    }
}
