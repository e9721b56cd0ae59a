//! Default physical memory geometry.
//!
//! These are defaults, not requirements; the memory subsystem takes its
//! geometry as an input at initialization time.

use super::paging::PAGE_SIZE_4KB;

/// Managed physical range size when the boot environment reports nothing.
pub const DEFAULT_MANAGED_MEMORY_BYTES: u32 = 32 * 1024 * 1024;

/// Size of the region identity-mapped during paging activation.
pub const DEFAULT_IDENTITY_MAP_BYTES: u32 = 4 * 1024 * 1024;

/// Upper bound on frames the allocator can track.
pub const MAX_MANAGED_FRAMES: usize = (DEFAULT_MANAGED_MEMORY_BYTES / PAGE_SIZE_4KB) as usize;
