/*!
 * shmsync
 *
 * User-space emulation of kernel synchronization objects (counting
 * semaphores, auto/manual-reset events, recursive-ownership mutexes)
 * over a shared-memory segment, for a compatibility layer that must
 * reproduce exact kernel semantics without a kernel object table.
 *
 * Object state lives in fixed 8-byte slots of a segment owned by an
 * external handle registry; this crate supplies the client side: lazy
 * page mapping, a per-process object cache, atomic signal/acquire
 * operations, and a multi-object wait loop over a batched futex-style
 * block/wake primitive (with a portable condvar fallback).
 */

pub mod cache;
pub mod core;
pub mod engine;
pub mod object;
pub mod registry;
pub mod shm;
pub mod wait;

pub use crate::core::errors::{SyncError, SyncResult};
pub use crate::core::types::{current_tid, Handle, RawHandle, SlotIndex, Tid};
pub use crate::engine::{EngineConfig, SyncEngine, ENV_TOGGLE, MAX_WAIT_OBJECTS};
pub use crate::object::{EventInfo, EventKind, MutexInfo, ObjectKind, SemaphoreInfo, SyncObject};
pub use crate::registry::{ObjectReply, RegistryClient, ResolvedHandle, SocketRegistry};
pub use crate::wait::BackendChoice;
