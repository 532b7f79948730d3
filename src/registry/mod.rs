/*!
 * Registry Client
 *
 * The external registry owns handle allocation, object naming and slot
 * assignment; this engine only ever talks to it through the narrow
 * `RegistryClient` trait. Production uses the Unix-socket client in
 * `client`; tests substitute an in-process implementation over the same
 * trait.
 */

pub mod client;
pub mod protocol;

pub use client::SocketRegistry;

use crate::core::errors::SyncResult;
use crate::core::types::{Handle, SlotIndex};
use crate::object::ObjectKind;

/// Reply to object creation or open. `kind` is the object's canonical
/// kind as the registry stores it, which may differ from the requested
/// tag when a named object already existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectReply {
    pub handle: Handle,
    pub slot: SlotIndex,
    pub kind: ObjectKind,
    pub already_existed: bool,
}

/// Reply to handle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedHandle {
    pub slot: SlotIndex,
    pub kind: ObjectKind,
}

/// Client-side contract of the external registry.
pub trait RegistryClient: Send + Sync {
    /// Allocate (or find, for named objects) an object and its slot.
    /// `init_a`/`init_b` are the type-specific initial record words; the
    /// registry stores them with the name but does not interpret them.
    fn create_object(
        &self,
        kind: ObjectKind,
        access: u32,
        name: Option<&str>,
        init_a: i32,
        init_b: i32,
    ) -> SyncResult<ObjectReply>;

    /// Look up an existing named object.
    fn open_object(&self, kind: ObjectKind, access: u32, name: &str) -> SyncResult<ObjectReply>;

    /// Map a handle this process has never seen to its slot and kind.
    fn resolve_handle(&self, handle: Handle) -> SyncResult<ResolvedHandle>;

    /// Fire-and-forget: tell the registry this thread entered or left a
    /// message-wait. Failures are logged, never surfaced.
    fn set_message_wait(&self, in_wait: bool);
}
