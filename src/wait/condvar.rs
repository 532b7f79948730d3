/*!
 * Condvar Wait Backend
 *
 * Portable fallback for platforms or kernels without a batched futex
 * wait. Waiters register under every address they watch in an
 * address-keyed table, re-check the expected values to close the
 * lost-wake window, then sleep on their own condvar. Wakes pop waiters
 * from the table, so wake-one really wakes at most one.
 *
 * Functionally equivalent to the futex backend, with two documented
 * differences: wake fan-out costs a table lookup per address, and wakes
 * only reach waiters in this process.
 */

use super::{WaitDescriptor, WaitOutcome};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct Waiter {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }
}

/// Address-keyed condvar backend.
pub struct CondvarWaiter {
    waiters: DashMap<usize, Vec<Arc<Waiter>>, RandomState>,
}

impl CondvarWaiter {
    pub fn new() -> Self {
        Self {
            waiters: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Current value of a watched word.
    ///
    /// # Safety
    /// Addresses come from live slots (or equivalent test memory), which
    /// stay mapped for the lifetime of the wait.
    #[inline]
    unsafe fn load(addr: usize) -> i32 {
        (*(addr as *const AtomicI32)).load(Ordering::SeqCst)
    }

    fn deregister(&self, descriptors: &[WaitDescriptor], me: &Arc<Waiter>) {
        for d in descriptors {
            if let Some(mut list) = self.waiters.get_mut(&d.addr) {
                list.retain(|w| !Arc::ptr_eq(w, me));
            }
        }
    }

    pub fn wait_on_any(
        &self,
        descriptors: &[WaitDescriptor],
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        debug_assert!(!descriptors.is_empty());

        let me = Arc::new(Waiter::new());
        for d in descriptors {
            self.waiters.entry(d.addr).or_default().push(me.clone());
        }

        // Close the lost-wake window: a value that moved between the
        // caller's scan and our registration will never trigger a wake,
        // so check again now that we are visible to wakers.
        for d in descriptors {
            // SAFETY: see load's contract.
            if unsafe { Self::load(d.addr) } != d.expected {
                self.deregister(descriptors, &me);
                return WaitOutcome::Woken;
            }
        }

        let timed_out = {
            let mut woken = me.woken.lock();
            loop {
                if *woken {
                    break false;
                }
                match deadline {
                    Some(deadline) => {
                        if me.condvar.wait_until(&mut woken, deadline).timed_out() {
                            break !*woken;
                        }
                    }
                    None => me.condvar.wait(&mut woken),
                }
            }
        };

        self.deregister(descriptors, &me);
        if timed_out {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Woken
        }
    }

    pub fn wake(&self, addr: usize, count: i32) -> usize {
        if count <= 0 {
            return 0;
        }

        // Pop the waiters under the shard lock, notify after releasing it.
        let popped: Vec<Arc<Waiter>> = match self.waiters.get_mut(&addr) {
            Some(mut list) => {
                let n = (count as usize).min(list.len());
                list.drain(..n).collect()
            }
            None => return 0,
        };

        let woken = popped.len();
        for waiter in popped {
            *waiter.woken.lock() = true;
            waiter.condvar.notify_one();
        }
        woken
    }
}

impl Default for CondvarWaiter {
    fn default() -> Self {
        Self::new()
    }
}
