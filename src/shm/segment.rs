/*!
 * Shared-Memory Page Manager
 *
 * Maps pages of the registry-created segment into the process on first
 * touch of a slot index. The page table is a fixed array of atomic
 * addresses: the first thread to map a page publishes it with a CAS and
 * racing losers unmap their redundant mapping. Pages stay mapped for the
 * lifetime of the segment.
 */

use super::layout::{SlotLocation, SLOT_SIZE};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::types::SlotIndex;
use log::{error, info, trace};
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

/// Capacity of the page table. At 4 KiB pages this covers 4M slots, far
/// beyond what the registry will ever hand out for one installation.
pub const MAX_SHM_PAGES: usize = 8192;

/// Reference to one 8-byte slot of the shared segment.
///
/// This is the only type that touches segment memory. A slot is two i32
/// words accessed atomically; word meaning depends on the object kind
/// (see `object`). Slots come from `SharedSegment::map_slot` and stay
/// valid as long as the segment is alive, since pages are never unmapped
/// before the segment itself is dropped.
#[derive(Debug, Clone, Copy)]
pub struct SlotRef {
    ptr: NonNull<AtomicI32>,
}

// SAFETY: the referenced words are atomics inside a MAP_SHARED mapping
// that outlives every SlotRef handed out by the segment.
unsafe impl Send for SlotRef {}
unsafe impl Sync for SlotRef {}

impl SlotRef {
    /// Rebuild a reference from a cached slot address.
    ///
    /// # Safety
    /// `addr` must be an address previously returned by
    /// `SharedSegment::map_slot` on a segment that is still alive.
    #[inline]
    pub(crate) unsafe fn from_addr(addr: usize) -> Self {
        debug_assert!(addr != 0 && addr % SLOT_SIZE == 0);
        Self {
            ptr: NonNull::new_unchecked(addr as *mut AtomicI32),
        }
    }

    /// Address of the slot's first word, used as cache key and futex target.
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// First word: semaphore count, event signaled flag, or mutex owner.
    /// This is the word blocking waits watch.
    #[inline]
    pub fn primary(&self) -> &AtomicI32 {
        // SAFETY: guaranteed valid by the from_addr contract.
        unsafe { self.ptr.as_ref() }
    }

    /// Second word: semaphore maximum, event reserved word, or mutex
    /// recursion count.
    #[inline]
    pub fn secondary(&self) -> &AtomicI32 {
        // SAFETY: a slot is SLOT_SIZE bytes, so word 1 is in bounds.
        unsafe { &*self.ptr.as_ptr().add(1) }
    }
}

/// Derive the segment name from the installation directory's filesystem
/// identity. The registry derives the same name when it creates the
/// segment, so both sides rendezvous without exchanging it.
pub fn segment_name(install_dir: &Path) -> SyncResult<String> {
    let st = nix::sys::stat::stat(install_dir).map_err(|e| {
        SyncError::Unavailable(format!(
            "cannot stat installation directory {}: {}",
            install_dir.display(),
            e
        ))
    })?;
    Ok(format!("/shmsync-{:x}-{:x}", st.st_dev, st.st_ino))
}

/// Process-local view of the shared segment: the open descriptor plus the
/// lazily filled page table.
pub struct SharedSegment {
    fd: OwnedFd,
    name: String,
    page_size: NonZeroUsize,
    /// `pages[i]` holds the mapped address of segment page i, or 0.
    /// Written at most once per entry; first successful CAS wins.
    pages: Box<[AtomicUsize; MAX_SHM_PAGES]>,
}

impl SharedSegment {
    /// Open the segment belonging to `install_dir`.
    pub fn open_for(install_dir: &Path) -> SyncResult<Self> {
        Self::open(&segment_name(install_dir)?)
    }

    /// Open a pre-existing segment by name. The registry creates the
    /// segment; if it is absent the native path is unavailable for this
    /// whole process.
    pub fn open(name: &str) -> SyncResult<Self> {
        let fd = nix::sys::mman::shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(|e| {
            if e == nix::errno::Errno::ENOENT {
                error!(
                    "shared segment {} does not exist; \
                     make sure the registry is running with the native path enabled",
                    name
                );
            } else {
                error!("failed to open shared segment {}: {}", name, e);
            }
            SyncError::Unavailable(format!("shared segment {}: {}", name, e))
        })?;

        // SAFETY: sysconf with a valid name has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = NonZeroUsize::new(page_size.max(0) as usize)
            .ok_or_else(|| SyncError::Unavailable("cannot determine page size".into()))?;

        info!("opened shared segment {} (page size {})", name, page_size);

        Ok(Self {
            fd,
            name: name.to_owned(),
            page_size,
            pages: Box::new([const { AtomicUsize::new(0) }; MAX_SHM_PAGES]),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map the page holding `index` if this process has not touched it yet
    /// and return a reference to the slot.
    pub fn map_slot(&self, index: SlotIndex) -> SyncResult<SlotRef> {
        let loc = SlotLocation::of(index, self.page_size.get());

        if loc.page >= MAX_SHM_PAGES {
            // The registry handed out a slot beyond anything this table can
            // address. The engine has no degraded mode without its page
            // table, so treat this like any other growth failure.
            error!(
                "slot index {} exceeds page table capacity ({} pages)",
                index, MAX_SHM_PAGES
            );
            std::process::abort();
        }

        let entry = &self.pages[loc.page];
        if entry.load(Ordering::SeqCst) == 0 {
            let addr = unsafe {
                mmap(
                    None,
                    self.page_size,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED,
                    &self.fd,
                    (loc.page * self.page_size.get()) as libc::off_t,
                )
            }
            .map_err(|e| {
                error!("failed to map segment page {}: {}", loc.page, e);
                SyncError::OutOfMemory(format!("mmap of segment page {}: {}", loc.page, e))
            })?;

            if entry
                .compare_exchange(0, addr.as_ptr() as usize, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Lost the first-touch race; drop the redundant mapping.
                // SAFETY: addr is a fresh page-sized mapping nobody else saw.
                let _ = unsafe { munmap(addr, self.page_size.get()) };
            } else {
                trace!("mapped segment page {} at {:p}", loc.page, addr.as_ptr());
            }
        }

        let base = entry.load(Ordering::SeqCst);
        // SAFETY: base is a live MAP_SHARED page and offset stays inside it.
        Ok(unsafe { SlotRef::from_addr(base + loc.offset) })
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        for entry in self.pages.iter() {
            let addr = entry.swap(0, Ordering::SeqCst);
            if addr != 0 {
                if let Some(ptr) = NonNull::new(addr as *mut libc::c_void) {
                    // SAFETY: addr was published by map_slot and is unmapped
                    // exactly once here.
                    let _ = unsafe { munmap(ptr, self.page_size.get()) };
                }
            }
        }
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .finish()
    }
}
