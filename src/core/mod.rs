/*!
 * Core Types and Errors
 * Shared foundation for the synchronization engine
 */

pub mod errors;
pub mod types;

pub use errors::{SyncError, SyncResult};
pub use types::{current_tid, Handle, RawHandle, SlotIndex, Tid};
