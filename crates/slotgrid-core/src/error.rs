//! Error types shared by all SlotGrid crates.

use thiserror::Error;

/// Result type alias for SlotGrid operations.
pub type SlotgridResult<T> = Result<T, SlotgridError>;

/// Errors that can occur while analyzing a fleet or managing throttles.
#[derive(Debug, Error)]
pub enum SlotgridError {
    /// Bad throttle parameters or a malformed snapshot.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The fleet or queue snapshot could not be obtained.
    #[error("inventory unavailable: {0}")]
    InventoryUnavailable(String),

    /// A throttle operation referenced a key with no policy.
    #[error("no throttle policy for key: {0}")]
    UnknownKey(String),

    #[error("config error: {0}")]
    Config(String),
}
