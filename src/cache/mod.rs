/*!
 * Object Cache
 *
 * Process-local map from handle to {kind, slot address}, so that signal
 * and wait operations skip the registry round-trip after the first
 * resolution. Two-level sparse table indexed by the dense handle key:
 * blocks allocate lazily, entries are published by a CAS on the kind word
 * and only ever move from empty to populated to invalidated. Readers take
 * no locks.
 */

use crate::core::types::Handle;
use crate::object::ObjectKind;
use crate::shm::{SlotRef, SLOT_SIZE};
use log::warn;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};

/// Entries per block, sized so one block spans a 64 KiB arena of handles.
pub const CACHE_BLOCK_SIZE: usize = 65536 / SLOT_SIZE;

/// Number of first-level block pointers.
pub const CACHE_BLOCKS: usize = 256;

/// One cache entry. `kind == 0` means empty; `addr` is only meaningful
/// once `kind` has been published, and is written before it.
struct CacheEntry {
    kind: AtomicU32,
    addr: AtomicUsize,
}

impl CacheEntry {
    const fn new() -> Self {
        Self {
            kind: AtomicU32::new(0),
            addr: AtomicUsize::new(0),
        }
    }
}

type CacheBlock = [CacheEntry; CACHE_BLOCK_SIZE];

/// A resolved object as the rest of the engine consumes it.
#[derive(Debug, Clone, Copy)]
pub struct CachedObject {
    pub kind: ObjectKind,
    pub slot: SlotRef,
}

/// The per-process object cache.
pub struct ObjectCache {
    blocks: [AtomicPtr<CacheEntry>; CACHE_BLOCKS],
}

impl ObjectCache {
    /// Block 0 is allocated up front so the common low handle range never
    /// pays the allocation on its first publish.
    pub fn new() -> Self {
        let cache = Self {
            blocks: [const { AtomicPtr::new(std::ptr::null_mut()) }; CACHE_BLOCKS],
        };
        cache.blocks[0].store(Self::alloc_block(), Ordering::SeqCst);
        cache
    }

    fn alloc_block() -> *mut CacheEntry {
        let block: Box<CacheBlock> = Box::new([const { CacheEntry::new() }; CACHE_BLOCK_SIZE]);
        Box::into_raw(block) as *mut CacheEntry
    }

    #[inline]
    fn split_key(handle: Handle) -> Option<(usize, usize)> {
        let key = handle.key();
        let block = key / CACHE_BLOCK_SIZE;
        if block >= CACHE_BLOCKS {
            return None;
        }
        Some((block, key % CACHE_BLOCK_SIZE))
    }

    fn entry(&self, block: usize, offset: usize) -> Option<&CacheEntry> {
        let ptr = self.blocks[block].load(Ordering::SeqCst);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: published block pointers stay live until Drop.
        Some(unsafe { &*ptr.add(offset) })
    }

    /// Get the block for `block`, allocating and publishing it if this is
    /// the first touch. On a publish race the loser frees its allocation
    /// and adopts the winner's block.
    fn entry_or_alloc(&self, block: usize, offset: usize) -> &CacheEntry {
        let slot = &self.blocks[block];
        let mut ptr = slot.load(Ordering::SeqCst);
        if ptr.is_null() {
            let fresh = Self::alloc_block();
            match slot.compare_exchange(
                std::ptr::null_mut(),
                fresh,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => ptr = fresh,
                Err(winner) => {
                    // SAFETY: fresh came from alloc_block and was never shared.
                    drop(unsafe { Box::from_raw(fresh as *mut CacheBlock) });
                    ptr = winner;
                }
            }
        }
        // SAFETY: ptr is non-null and points at a live block.
        unsafe { &*ptr.add(offset) }
    }

    /// Look up a handle. `None` for untouched blocks, empty entries, or
    /// handles outside the table's range.
    pub fn lookup(&self, handle: Handle) -> Option<CachedObject> {
        let (block, offset) = Self::split_key(handle)?;
        let entry = self.entry(block, offset)?;

        let kind = ObjectKind::from_raw(entry.kind.load(Ordering::SeqCst))?;
        let addr = entry.addr.load(Ordering::SeqCst);
        // SAFETY: addr was stored before kind was published and points into
        // a mapped segment page.
        Some(CachedObject {
            kind,
            slot: unsafe { SlotRef::from_addr(addr) },
        })
    }

    /// Publish a resolution. The first writer wins; concurrent resolvers
    /// of the same handle carry identical data, so the loser just adopts
    /// the entry. Handles beyond the table's range are served uncached.
    pub fn publish(&self, handle: Handle, kind: ObjectKind, slot: SlotRef) -> CachedObject {
        let Some((block, offset)) = Self::split_key(handle) else {
            warn!("handle {:#x} exceeds cache capacity, not caching", handle.raw());
            return CachedObject { kind, slot };
        };

        let entry = self.entry_or_alloc(block, offset);
        entry.addr.store(slot.addr(), Ordering::SeqCst);
        let _ = entry.kind.compare_exchange(
            0,
            kind.raw(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        CachedObject { kind, slot }
    }

    /// Invalidate a handle's entry. Returns whether the entry was active.
    /// Entries are never reused for a different kind while valid; close
    /// only ever moves them back toward empty.
    pub fn invalidate(&self, handle: Handle) -> bool {
        let Some((block, offset)) = Self::split_key(handle) else {
            return false;
        };
        match self.entry(block, offset) {
            Some(entry) => entry.kind.swap(0, Ordering::SeqCst) != 0,
            None => false,
        }
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjectCache {
    fn drop(&mut self) {
        for block in &self.blocks {
            let ptr = block.swap(std::ptr::null_mut(), Ordering::SeqCst);
            if !ptr.is_null() {
                // SAFETY: every published pointer came from alloc_block.
                drop(unsafe { Box::from_raw(ptr as *mut CacheBlock) });
            }
        }
    }
}

// SAFETY: all interior state is atomic; blocks are immortal until Drop,
// which takes &mut self.
unsafe impl Send for ObjectCache {}
unsafe impl Sync for ObjectCache {}
