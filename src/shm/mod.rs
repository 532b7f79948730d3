/*!
 * Shared-Memory Segment
 *
 * One segment per installation identity, created by the external registry
 * and divided into fixed 8-byte slots. This module owns the process-local
 * view of that segment:
 * - slot index to page/offset arithmetic (`layout`)
 * - lazy page mapping with first-writer-wins publication (`segment`)
 * - the single narrow accessor for a slot's atomic words (`SlotRef`)
 */

pub mod layout;
pub mod segment;

pub use layout::{SlotLocation, SLOT_SIZE};
pub use segment::{segment_name, SharedSegment, SlotRef, MAX_SHM_PAGES};
