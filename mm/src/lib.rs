#![cfg_attr(not(test), no_std)]

pub mod frame_alloc;
pub mod mm_constants;
pub mod paging;

use thiserror::Error;

/// Memory-management failures reported to callers.
///
/// Exhaustion is recoverable (free something and retry); the rest are
/// caller-contract violations surfaced as values instead of being left
/// undefined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MmError {
    #[error("no free physical frames")]
    Exhausted,
    #[error("address outside the managed physical range")]
    OutOfRange,
    #[error("frame is not currently allocated")]
    NotAllocated,
    #[error("address is not page aligned")]
    Unaligned,
    #[error("virtual address has no mapping")]
    NotMapped,
    #[error("paging has not been activated")]
    NotActive,
}

pub use frame_alloc::{FrameAllocator, FrameStats, MemoryConfig};
pub use paging::{AddressSpace, PageTableEntry, PhysWindow};

/// Configure the physical frame allocator over the managed range.
pub fn init(config: &MemoryConfig) {
    frame_alloc::init(config);
}

/// Build the boot identity mapping and switch translation on.
pub fn activate(config: &MemoryConfig) -> Result<(), MmError> {
    paging::activate(config)
}
