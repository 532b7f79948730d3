/*!
 * Error Types
 * Closed status taxonomy for every engine operation, with serde support
 * so the registry protocol can carry the same codes
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for all engine operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Status taxonomy of the synchronization engine.
///
/// Every public operation returns a value drawn from this enum. Callers
/// receiving `NotImplemented` are expected to fall back to the
/// registry-mediated, non-native path.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details", rename_all = "snake_case")]
pub enum SyncError {
    /// Handle was never resolved in this process, or the registry rejects it
    #[error("Invalid handle")]
    InvalidHandle,

    /// Subsystem disabled, pseudo-handle, mixed wait set, or wait-for-all
    /// with more than one object
    #[error("Not implemented on the native synchronization path")]
    NotImplemented,

    /// Wait deadline elapsed before any object became available
    #[error("Wait timed out")]
    Timeout,

    /// Semaphore release would push the count past its maximum
    #[error("Semaphore limit exceeded")]
    LimitExceeded,

    /// Mutex release attempted by a thread that does not own it
    #[error("Mutex not owned by the calling thread")]
    NotOwned,

    /// Operation applied to an object of the wrong kind
    #[error("Object kind mismatch")]
    TypeMismatch,

    /// Caller-supplied argument out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Page mapping failed
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Bootstrap failure: shared segment absent or unreadable
    #[error("Synchronization subsystem unavailable: {0}")]
    Unavailable(String),

    /// Transport or protocol failure talking to the registry
    #[error("Registry failure: {0}")]
    Registry(String),
}
