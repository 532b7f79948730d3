/*!
 * Non-Blocking Acquire
 * One attempt at taking an object, per kind, without ever blocking
 */

use crate::cache::CachedObject;
use crate::core::types::Tid;
use crate::object::ObjectKind;
use std::sync::atomic::Ordering;

/// Outcome of one acquire attempt. `Pending` carries the value just
/// observed in the slot's watched word, which becomes the expected value
/// of the wait descriptor for this object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TryAcquire {
    Acquired,
    Pending(i32),
}

/// Attempt a type-specific non-blocking acquire. Either fully succeeds
/// exactly once or leaves the slot untouched.
pub(crate) fn try_acquire(object: &CachedObject, tid: Tid) -> TryAcquire {
    match object.kind {
        ObjectKind::Semaphore => {
            let count = object.slot.primary();
            let mut current = count.load(Ordering::SeqCst);
            while current > 0 {
                match count.compare_exchange(
                    current,
                    current - 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => return TryAcquire::Acquired,
                    Err(observed) => current = observed,
                }
            }
            TryAcquire::Pending(0)
        }

        ObjectKind::AutoEvent => {
            // Consuming the signal and re-arming is one exchange.
            if object
                .slot
                .primary()
                .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                TryAcquire::Acquired
            } else {
                TryAcquire::Pending(0)
            }
        }

        ObjectKind::ManualEvent | ObjectKind::Queue => {
            // Peek only; a manual event satisfies every waiter.
            if object.slot.primary().load(Ordering::SeqCst) != 0 {
                TryAcquire::Acquired
            } else {
                TryAcquire::Pending(0)
            }
        }

        ObjectKind::Mutex => {
            let owner = object.slot.primary();
            let observed = owner.load(Ordering::SeqCst);
            if observed == tid {
                // Re-entry by the owner bumps the recursion count; only
                // the owning thread writes this word while it holds the
                // mutex.
                object.slot.secondary().fetch_add(1, Ordering::SeqCst);
                return TryAcquire::Acquired;
            }
            match owner.compare_exchange(0, tid, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => {
                    object.slot.secondary().store(1, Ordering::SeqCst);
                    TryAcquire::Acquired
                }
                Err(holder) => TryAcquire::Pending(holder),
            }
        }
    }
}
