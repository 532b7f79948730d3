/*!
 * Synchronization Objects
 *
 * The tagged view of an 8-byte shared slot. The slot itself is an untyped
 * pair of atomic words; this module is the single boundary where those
 * words gain meaning:
 *
 * | kind         | word 0        | word 1          |
 * |--------------|---------------|-----------------|
 * | Semaphore    | count         | max             |
 * | Auto event   | signaled      | reserved        |
 * | Manual event | signaled      | reserved        |
 * | Mutex        | owner tid     | recursion count |
 * | Queue        | signaled      | reserved        |
 *
 * Word 0 is always the word blocking waits watch.
 */

use crate::core::types::Tid;
use crate::shm::SlotRef;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

/// Kind tag of a synchronization object, shared with the registry wire
/// protocol and the cache. Zero is reserved for "empty cache entry".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ObjectKind {
    Semaphore = 1,
    AutoEvent = 2,
    ManualEvent = 3,
    Mutex = 4,
    /// Message queue object owned by the registry. Behaves like a manual
    /// event on the wait path (peek only, never consumed here) and flips
    /// the caller into the message-wait protocol.
    Queue = 5,
}

impl ObjectKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Semaphore),
            2 => Some(Self::AutoEvent),
            3 => Some(Self::ManualEvent),
            4 => Some(Self::Mutex),
            5 => Some(Self::Queue),
            _ => None,
        }
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Kinds settable/resettable through the event operations.
    #[inline]
    pub fn is_event(self) -> bool {
        matches!(self, Self::AutoEvent | Self::ManualEvent)
    }
}

/// Event flavor exposed on the creation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Releases exactly one waiter per signal, then re-arms itself
    Auto,
    /// Stays signaled for every waiter until explicitly reset
    Manual,
}

impl From<EventKind> for ObjectKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Auto => ObjectKind::AutoEvent,
            EventKind::Manual => ObjectKind::ManualEvent,
        }
    }
}

/// Decoded state of one synchronization object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncObject {
    Semaphore { count: i32, max: i32 },
    Event { signaled: bool },
    Mutex { owner: Tid, recursion: i32 },
}

impl SyncObject {
    /// Encode to the fixed two-word slot record.
    pub fn encode(&self) -> [i32; 2] {
        match *self {
            Self::Semaphore { count, max } => [count, max],
            Self::Event { signaled } => [signaled as i32, 0],
            Self::Mutex { owner, recursion } => [owner, recursion],
        }
    }

    /// Decode a two-word slot record under a kind tag.
    pub fn decode(kind: ObjectKind, words: [i32; 2]) -> Self {
        match kind {
            ObjectKind::Semaphore => Self::Semaphore {
                count: words[0],
                max: words[1],
            },
            ObjectKind::AutoEvent | ObjectKind::ManualEvent | ObjectKind::Queue => Self::Event {
                signaled: words[0] != 0,
            },
            ObjectKind::Mutex => Self::Mutex {
                owner: words[0],
                recursion: words[1],
            },
        }
    }

    /// Write this record into a slot. Only used on freshly created
    /// objects, before the handle is published anywhere.
    pub fn store_to(&self, slot: SlotRef) {
        let [a, b] = self.encode();
        slot.primary().store(a, Ordering::SeqCst);
        slot.secondary().store(b, Ordering::SeqCst);
    }

    /// Snapshot a slot under a kind tag. The two words are read
    /// separately; callers treat the result as an observation, not an
    /// atomic whole.
    pub fn load_from(kind: ObjectKind, slot: SlotRef) -> Self {
        Self::decode(
            kind,
            [
                slot.primary().load(Ordering::SeqCst),
                slot.secondary().load(Ordering::SeqCst),
            ],
        )
    }
}

/// Snapshot returned by `query_semaphore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreInfo {
    pub current: i32,
    pub maximum: i32,
}

/// Snapshot returned by `query_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub kind: EventKind,
    pub signaled: bool,
}

/// Snapshot returned by `query_mutex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexInfo {
    pub owner: Tid,
    pub recursion: i32,
    pub owned_by_caller: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_raw_round_trip() {
        for kind in [
            ObjectKind::Semaphore,
            ObjectKind::AutoEvent,
            ObjectKind::ManualEvent,
            ObjectKind::Mutex,
            ObjectKind::Queue,
        ] {
            assert_eq!(ObjectKind::from_raw(kind.raw()), Some(kind));
        }
        assert_eq!(ObjectKind::from_raw(0), None);
        assert_eq!(ObjectKind::from_raw(99), None);
    }

    #[test]
    fn test_encode_matches_record_layout() {
        assert_eq!(
            SyncObject::Semaphore { count: 2, max: 5 }.encode(),
            [2, 5]
        );
        assert_eq!(SyncObject::Event { signaled: true }.encode(), [1, 0]);
        assert_eq!(
            SyncObject::Mutex {
                owner: 1234,
                recursion: 3
            }
            .encode(),
            [1234, 3]
        );
    }

    #[test]
    fn test_queue_decodes_as_event() {
        let obj = SyncObject::decode(ObjectKind::Queue, [1, 0]);
        assert_eq!(obj, SyncObject::Event { signaled: true });
    }
}
