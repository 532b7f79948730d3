/*!
 * Batched Wait Primitive
 *
 * Abstraction over "block until any one of these addresses changes from
 * its expected value, or a deadline passes". Two implementations behind
 * enum dispatch:
 * - Futex (Linux): one `futex_waitv` syscall watching every address;
 *   wakes reach cooperating processes.
 * - Condvar: portable fallback keyed by address; same semantics with
 *   process-local wake fan-out and a higher bookkeeping cost.
 *
 * Spurious wakes are part of the contract. Callers re-scan their objects
 * on every `Woken` or `Interrupted` outcome.
 */

mod condvar;
#[cfg(target_os = "linux")]
mod futex;

pub use condvar::CondvarWaiter;
#[cfg(target_os = "linux")]
pub use futex::{is_supported as futex_supported, FutexWaiter};

use log::info;
use std::time::Instant;

/// One watched address with the value the caller just observed there.
/// The blocking call returns immediately if the current value differs.
#[derive(Debug, Clone, Copy)]
pub struct WaitDescriptor {
    pub addr: usize,
    pub expected: i32,
}

/// Why a blocking wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A watched address changed, a wake arrived, or the value had already
    /// moved on. The caller re-scans.
    Woken,
    /// The absolute deadline elapsed.
    TimedOut,
    /// A signal interrupted the sleep. The caller re-scans.
    Interrupted,
}

/// Backend selection, resolved once at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Futex when the kernel has it, condvar otherwise
    #[default]
    Auto,
    Futex,
    Condvar,
}

/// The selected wait backend (enum dispatch, no vtable on the hot path).
pub enum WaitBackend {
    #[cfg(target_os = "linux")]
    Futex(FutexWaiter),
    Condvar(CondvarWaiter),
}

impl WaitBackend {
    /// Resolve a `BackendChoice` against what the platform offers.
    pub fn select(choice: BackendChoice) -> Self {
        #[cfg(target_os = "linux")]
        {
            let futex_ok = futex_supported();
            match choice {
                BackendChoice::Condvar => Self::Condvar(CondvarWaiter::new()),
                BackendChoice::Futex | BackendChoice::Auto if futex_ok => {
                    Self::Futex(FutexWaiter::new())
                }
                BackendChoice::Futex => {
                    info!("batched futex wait unavailable, falling back to condvar backend");
                    Self::Condvar(CondvarWaiter::new())
                }
                BackendChoice::Auto => Self::Condvar(CondvarWaiter::new()),
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = choice;
            Self::Condvar(CondvarWaiter::new())
        }
    }

    /// Block until any watched address changes, the deadline passes, or a
    /// signal arrives. A `None` deadline waits indefinitely.
    #[inline]
    pub fn wait_on_any(
        &self,
        descriptors: &[WaitDescriptor],
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        match self {
            #[cfg(target_os = "linux")]
            Self::Futex(backend) => backend.wait_on_any(descriptors, deadline),
            Self::Condvar(backend) => backend.wait_on_any(descriptors, deadline),
        }
    }

    /// Wake up to `count` waiters blocked on `addr`.
    #[inline]
    pub fn wake(&self, addr: usize, count: i32) -> usize {
        match self {
            #[cfg(target_os = "linux")]
            Self::Futex(backend) => backend.wake(addr, count),
            Self::Condvar(backend) => backend.wake(addr, count),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(target_os = "linux")]
            Self::Futex(_) => "futex",
            Self::Condvar(_) => "condvar",
        }
    }
}
