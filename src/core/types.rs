/*!
 * Core Types
 * Handle, slot and thread identity types used across the engine
 */

use serde::{Deserialize, Serialize};

/// Raw handle value as issued by the registry
pub type RawHandle = u32;

/// Index of an 8-byte slot inside the shared segment
pub type SlotIndex = u32;

/// Thread identity as stored in a mutex slot (0 = unowned)
pub type Tid = i32;

/// Opaque object handle issued by the external registry.
///
/// Carries no state of its own; the engine uses it only as a cache key.
/// Registry handles are non-zero multiples of 4, which leaves the low bits
/// free and makes `key()` a dense index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub RawHandle);

impl Handle {
    pub const NULL: Handle = Handle(0);

    #[inline]
    pub fn raw(self) -> RawHandle {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Well-known pseudo-handle pattern (current process/thread and
    /// friends). These are never backed by a shared slot.
    #[inline]
    pub fn is_pseudo(self) -> bool {
        (self.0 as i32) < 0
    }

    /// Dense cache key for a registry-issued handle.
    #[inline]
    pub fn key(self) -> usize {
        ((self.0 as usize) >> 2).wrapping_sub(1)
    }
}

impl From<RawHandle> for Handle {
    fn from(raw: RawHandle) -> Self {
        Handle(raw)
    }
}

/// Identity of the calling thread, unique across cooperating processes.
///
/// Cached per thread; the kernel tid is stable for the thread's lifetime.
pub fn current_tid() -> Tid {
    std::thread_local! {
        static TID: std::cell::Cell<Tid> = const { std::cell::Cell::new(0) };
    }
    TID.with(|tid| {
        let mut id = tid.get();
        if id == 0 {
            id = os_thread_id();
            tid.set(id);
        }
        id
    })
}

#[cfg(target_os = "linux")]
fn os_thread_id() -> Tid {
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as Tid }
}

#[cfg(not(target_os = "linux"))]
fn os_thread_id() -> Tid {
    use std::hash::{Hash, Hasher};

    // No cross-process guarantee here, but non-Linux targets only run the
    // process-local condvar backend anyway.
    let mut hasher = ahash::AHasher::default();
    std::thread::current().id().hash(&mut hasher);
    (hasher.finish() as i32).wrapping_abs().max(1)
}
