/*!
 * Signal Operations
 *
 * Atomic state transitions on a resolved object, each followed by its
 * type-specific wake. All of these are bounded CAS retries; the only
 * blocking point in the engine lives in `wait`.
 */

use super::SyncEngine;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::types::{current_tid, Handle};
use crate::object::{EventInfo, EventKind, MutexInfo, ObjectKind, SemaphoreInfo, SyncObject};
use log::trace;
use std::sync::atomic::Ordering;

impl SyncEngine {
    /// Release `count` units of a semaphore. Returns the previous count,
    /// or `LimitExceeded` without mutating when the release would pass
    /// the maximum. Waiters are woken only on the empty-to-available
    /// transition, and at most `count` of them, since no more than that
    /// can make progress.
    pub fn release_semaphore(&self, handle: Handle, count: u32) -> SyncResult<i32> {
        let object = self.resolve(handle)?;
        if object.kind != ObjectKind::Semaphore {
            return Err(SyncError::TypeMismatch);
        }
        let release = i32::try_from(count).map_err(|_| {
            SyncError::InvalidParameter(format!("release count {}", count))
        })?;
        if release == 0 {
            return Err(SyncError::InvalidParameter("release count 0".into()));
        }

        let maximum = object.slot.secondary().load(Ordering::SeqCst);
        let counter = object.slot.primary();
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current > maximum - release {
                return Err(SyncError::LimitExceeded);
            }
            match counter.compare_exchange(
                current,
                current + release,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        trace!(
            "released {} on semaphore {:#x} (count {} -> {})",
            release,
            handle.raw(),
            current,
            current + release
        );
        if current == 0 {
            self.waiter().wake(object.slot.addr(), release);
        }
        Ok(current)
    }

    /// Signal an event. Returns the previous signaled state. On the
    /// 0 -> 1 transition an auto-reset event wakes exactly one waiter
    /// (the signal is consumed by whoever wins) and a manual-reset event
    /// wakes everyone.
    pub fn set_event(&self, handle: Handle) -> SyncResult<bool> {
        let object = self.resolve(handle)?;
        if !object.kind.is_event() {
            return Err(SyncError::TypeMismatch);
        }

        let previous = object.slot.primary().swap(1, Ordering::SeqCst);
        trace!("set event {:#x} (was {})", handle.raw(), previous);
        if previous == 0 {
            let fanout = match object.kind {
                ObjectKind::AutoEvent => 1,
                _ => i32::MAX,
            };
            self.waiter().wake(object.slot.addr(), fanout);
        }
        Ok(previous != 0)
    }

    /// Reset an event to non-signaled. Returns the previous state. Never
    /// wakes anyone.
    pub fn reset_event(&self, handle: Handle) -> SyncResult<bool> {
        let object = self.resolve(handle)?;
        if !object.kind.is_event() {
            return Err(SyncError::TypeMismatch);
        }

        let previous = object.slot.primary().swap(0, Ordering::SeqCst);
        trace!("reset event {:#x} (was {})", handle.raw(), previous);
        Ok(previous != 0)
    }

    /// Signal an event and immediately clear it again, giving current
    /// waiters a window to run. A waiter can miss the pulse entirely;
    /// that window cannot be closed from user space.
    pub fn pulse_event(&self, handle: Handle) -> SyncResult<bool> {
        let object = self.resolve(handle)?;
        if !object.kind.is_event() {
            return Err(SyncError::TypeMismatch);
        }

        let previous = object.slot.primary().swap(1, Ordering::SeqCst);
        if previous == 0 {
            let fanout = match object.kind {
                ObjectKind::AutoEvent => 1,
                _ => i32::MAX,
            };
            self.waiter().wake(object.slot.addr(), fanout);
        }
        std::thread::yield_now();
        object.slot.primary().store(0, Ordering::SeqCst);

        trace!("pulsed event {:#x} (was {})", handle.raw(), previous);
        Ok(previous != 0)
    }

    /// Release one level of mutex ownership. Returns the previous
    /// recursion count; fails with `NotOwned`, mutating nothing, when the
    /// calling thread is not the owner. Dropping the last level clears
    /// the owner and wakes exactly one waiter.
    pub fn release_mutex(&self, handle: Handle) -> SyncResult<i32> {
        let object = self.resolve(handle)?;
        if object.kind != ObjectKind::Mutex {
            return Err(SyncError::TypeMismatch);
        }

        let owner = object.slot.primary();
        if owner.load(Ordering::SeqCst) != current_tid() {
            return Err(SyncError::NotOwned);
        }

        // Only the owning thread writes the recursion word while the
        // mutex is held, so this pair of operations cannot race.
        let previous = object.slot.secondary().fetch_sub(1, Ordering::SeqCst);
        trace!(
            "released mutex {:#x} (recursion {} -> {})",
            handle.raw(),
            previous,
            previous - 1
        );
        if previous - 1 == 0 {
            owner.store(0, Ordering::SeqCst);
            self.waiter().wake(object.slot.addr(), 1);
        }
        Ok(previous)
    }

    /// Snapshot a semaphore's current and maximum count.
    pub fn query_semaphore(&self, handle: Handle) -> SyncResult<SemaphoreInfo> {
        let object = self.resolve(handle)?;
        if object.kind != ObjectKind::Semaphore {
            return Err(SyncError::TypeMismatch);
        }
        let SyncObject::Semaphore { count, max } = SyncObject::load_from(object.kind, object.slot)
        else {
            return Err(SyncError::TypeMismatch);
        };
        Ok(SemaphoreInfo {
            current: count,
            maximum: max,
        })
    }

    /// Snapshot an event's kind and signaled state.
    pub fn query_event(&self, handle: Handle) -> SyncResult<EventInfo> {
        let object = self.resolve(handle)?;
        if !object.kind.is_event() {
            return Err(SyncError::TypeMismatch);
        }
        let SyncObject::Event { signaled } = SyncObject::load_from(object.kind, object.slot) else {
            return Err(SyncError::TypeMismatch);
        };
        Ok(EventInfo {
            kind: if object.kind == ObjectKind::AutoEvent {
                EventKind::Auto
            } else {
                EventKind::Manual
            },
            signaled,
        })
    }

    /// Snapshot a mutex's owner and recursion count.
    pub fn query_mutex(&self, handle: Handle) -> SyncResult<MutexInfo> {
        let object = self.resolve(handle)?;
        if object.kind != ObjectKind::Mutex {
            return Err(SyncError::TypeMismatch);
        }
        let SyncObject::Mutex { owner, recursion } = SyncObject::load_from(object.kind, object.slot)
        else {
            return Err(SyncError::TypeMismatch);
        };
        Ok(MutexInfo {
            owner,
            recursion,
            owned_by_caller: owner == current_tid(),
        })
    }
}
