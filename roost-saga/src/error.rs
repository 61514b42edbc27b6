use roost_domain::saga::PayloadError;
use roost_store::StoreError;
use thiserror::Error;

/// Failure taxonomy of the booking saga. The first three are request-path
/// rejections that propagate synchronously to the caller; the rest are
/// saga-path failures handled by the retry wrapper.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Another owner holds the resource; the caller may try again later.
    #[error("lock conflict: {0}")]
    LockConflict(String),
    /// The date range is genuinely booked; retrying cannot succeed.
    #[error("{0}")]
    SlotUnavailable(String),
    #[error("{0} not found")]
    NotFound(String),
    /// Handler-internal failure during a saga step; retried, then
    /// dead-lettered.
    #[error("saga step failed: {0}")]
    Processing(String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
