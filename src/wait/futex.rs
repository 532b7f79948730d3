/*!
 * Futex Wait Backend
 *
 * Thin wrapper over the `futex_waitv` syscall (Linux 5.16+), which blocks
 * on up to 128 addresses at once, and classic `FUTEX_WAKE` for the wake
 * side. Wakes deliberately omit the private flag so waiters in other
 * processes mapping the same segment are eligible.
 */

use super::{WaitDescriptor, WaitOutcome};
use log::warn;
use nix::errno::Errno;
use std::sync::OnceLock;
use std::time::Instant;

/// Kernel descriptor for one watched futex word.
#[repr(C)]
struct FutexWaitv {
    val: u64,
    uaddr: u64,
    flags: u32,
    reserved: u32,
}

/// Watched words are 32-bit.
const FUTEX_32: u32 = 0x02;

/// Probe once whether the kernel has `futex_waitv`. A zero-length vector
/// is rejected with EINVAL by kernels that implement the syscall and with
/// ENOSYS by those that do not.
pub fn is_supported() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();
    *SUPPORTED.get_or_init(|| {
        let ret = unsafe {
            libc::syscall(
                libc::SYS_futex_waitv,
                std::ptr::null::<FutexWaitv>(),
                0usize,
                0usize,
                std::ptr::null::<libc::timespec>(),
                libc::CLOCK_MONOTONIC as usize,
            )
        };
        ret == 0 || Errno::last() != Errno::ENOSYS
    })
}

/// Convert a deadline into the absolute CLOCK_MONOTONIC timespec the
/// syscall wants. Recomputed on every call, so repeated sleeps against
/// the same deadline cannot drift.
fn absolute_timeout(deadline: Instant) -> libc::timespec {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: plain out-parameter call.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now) };

    let nanos = now.tv_nsec as i64 + i64::from(remaining.subsec_nanos());
    libc::timespec {
        tv_sec: now.tv_sec + remaining.as_secs() as i64 + nanos / 1_000_000_000,
        tv_nsec: nanos % 1_000_000_000,
    }
}

/// Futex-based batched wait backend.
pub struct FutexWaiter;

impl FutexWaiter {
    pub fn new() -> Self {
        Self
    }

    pub fn wait_on_any(
        &self,
        descriptors: &[WaitDescriptor],
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        debug_assert!(!descriptors.is_empty());

        let waitv: Vec<FutexWaitv> = descriptors
            .iter()
            .map(|d| FutexWaitv {
                val: d.expected as u32 as u64,
                uaddr: d.addr as u64,
                flags: FUTEX_32,
                reserved: 0,
            })
            .collect();

        let timeout = deadline.map(absolute_timeout);
        let timeout_ptr = timeout
            .as_ref()
            .map_or(std::ptr::null(), |ts| ts as *const libc::timespec);

        // SAFETY: waitv outlives the call and every uaddr points at a live
        // 32-bit atomic inside a mapped segment page.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_futex_waitv,
                waitv.as_ptr(),
                waitv.len(),
                0usize,
                timeout_ptr,
                libc::CLOCK_MONOTONIC as usize,
            )
        };

        if ret >= 0 {
            return WaitOutcome::Woken;
        }
        match Errno::last() {
            Errno::ETIMEDOUT => WaitOutcome::TimedOut,
            Errno::EINTR => WaitOutcome::Interrupted,
            // A watched value had already moved on; the rescan will see it.
            Errno::EAGAIN => WaitOutcome::Woken,
            e => {
                warn!("futex_waitv failed with {}, treating as wake", e);
                WaitOutcome::Woken
            }
        }
    }

    pub fn wake(&self, addr: usize, count: i32) -> usize {
        if count <= 0 {
            return 0;
        }
        // SAFETY: addr is the first word of a live slot.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_futex,
                addr,
                libc::FUTEX_WAKE,
                count,
                0usize,
                0usize,
                0usize,
            )
        };
        ret.max(0) as usize
    }
}

impl Default for FutexWaiter {
    fn default() -> Self {
        Self::new()
    }
}
