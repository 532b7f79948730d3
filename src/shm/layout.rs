/*!
 * Slot Layout
 * Pure arithmetic from a slot index to its page and byte offset
 */

use crate::core::types::SlotIndex;

/// Size of one synchronization object record in the shared segment
pub const SLOT_SIZE: usize = 8;

/// Location of a slot inside the segment, in page units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLocation {
    pub page: usize,
    pub offset: usize,
}

impl SlotLocation {
    /// Compute the page and in-page byte offset of a slot.
    ///
    /// Slots never straddle a page boundary: `page_size` is a power of two
    /// and a multiple of `SLOT_SIZE` on every supported platform.
    #[inline]
    pub fn of(index: SlotIndex, page_size: usize) -> Self {
        let byte = index as usize * SLOT_SIZE;
        Self {
            page: byte / page_size,
            offset: byte % page_size,
        }
    }
}
