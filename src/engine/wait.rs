/*!
 * Wait Engine
 *
 * Multi-object wait built on the batched block/wake primitive. The loop
 * alternates a non-blocking acquire pass over every object (in input
 * order, first success wins) with exactly one blocking wait watching all
 * of them, until an acquire lands or the deadline passes. Spurious and
 * interrupted wakes re-enter the scan and never surface to the caller.
 */

use super::acquire::{try_acquire, TryAcquire};
use super::SyncEngine;
use crate::cache::CachedObject;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::types::{current_tid, Handle};
use crate::object::ObjectKind;
use crate::registry::RegistryClient;
use crate::wait::{WaitDescriptor, WaitOutcome};
use log::{trace, warn};
use std::time::{Duration, Instant};

/// Upper bound on one wait set.
pub const MAX_WAIT_OBJECTS: usize = 64;

/// Clears the registry's message-wait flag on every exit path, including
/// errors and panics between arm and return.
struct MessageWaitGuard<'a> {
    registry: &'a dyn RegistryClient,
}

impl<'a> MessageWaitGuard<'a> {
    fn arm(registry: &'a dyn RegistryClient) -> Self {
        registry.set_message_wait(true);
        Self { registry }
    }
}

impl Drop for MessageWaitGuard<'_> {
    fn drop(&mut self) {
        self.registry.set_message_wait(false);
    }
}

impl SyncEngine {
    /// Wait until one of `handles` is acquired or `timeout` elapses.
    ///
    /// Returns the index of the acquired handle. `wait_any = false` with
    /// more than one handle is an explicit unsupported contract and
    /// answers `NotImplemented`. `alertable` is accepted at this boundary
    /// but the core loop takes no cancellation signal; only the timeout
    /// bounds the blocking.
    ///
    /// A set mixing native objects with handles this engine does not back
    /// (pseudo-handles, registry-only objects) degrades to
    /// `NotImplemented` as a whole, before any state is touched, so the
    /// caller can retry the entire wait on the non-native path.
    pub fn wait(
        &self,
        handles: &[Handle],
        wait_any: bool,
        alertable: bool,
        timeout: Option<Duration>,
    ) -> SyncResult<usize> {
        if !self.is_enabled() {
            return Err(SyncError::NotImplemented);
        }
        if handles.is_empty() || handles.len() > MAX_WAIT_OBJECTS {
            return Err(SyncError::InvalidParameter(format!(
                "wait on {} handles",
                handles.len()
            )));
        }
        let _ = alertable;

        // Resolve everything up front; no slot is touched until the whole
        // set is known to be native.
        let mut resolved: Vec<Option<CachedObject>> = Vec::with_capacity(handles.len());
        let mut foreign = 0usize;
        for handle in handles {
            match self.resolve(*handle) {
                Ok(object) => resolved.push(Some(object)),
                Err(SyncError::NotImplemented) => {
                    resolved.push(None);
                    foreign += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if foreign > 0 {
            if foreign < handles.len() {
                warn!("wait set mixes native and non-native objects, falling back");
            }
            return Err(SyncError::NotImplemented);
        }
        let objects: Vec<CachedObject> = resolved.into_iter().flatten().collect();

        // A queue object in last position flips this thread into the
        // registry's message-wait protocol for the duration of the call.
        let _msgwait = objects
            .last()
            .filter(|object| object.kind == ObjectKind::Queue)
            .map(|_| MessageWaitGuard::arm(self.registry()));

        if !wait_any && objects.len() > 1 {
            // Explicit unsupported contract, never silently approximated.
            return Err(SyncError::NotImplemented);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let tid = current_tid();
        let mut descriptors: Vec<WaitDescriptor> = Vec::with_capacity(objects.len());

        loop {
            descriptors.clear();
            for (index, object) in objects.iter().enumerate() {
                match try_acquire(object, tid) {
                    TryAcquire::Acquired => {
                        trace!(
                            "wait satisfied by handle {:#x} [{}]",
                            handles[index].raw(),
                            index
                        );
                        return Ok(index);
                    }
                    TryAcquire::Pending(expected) => descriptors.push(WaitDescriptor {
                        addr: object.slot.addr(),
                        expected,
                    }),
                }
            }

            // The deadline is rechecked against the clock on every pass,
            // so repeated wakes cannot stretch the total wait.
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    trace!("wait timed out");
                    return Err(SyncError::Timeout);
                }
            }

            match self.waiter().wait_on_any(&descriptors, deadline) {
                WaitOutcome::TimedOut => {
                    trace!("wait timed out");
                    return Err(SyncError::Timeout);
                }
                // Either a watched word changed or the sleep was cut
                // short; both just mean scan again.
                WaitOutcome::Woken | WaitOutcome::Interrupted => {}
            }
        }
    }
}
