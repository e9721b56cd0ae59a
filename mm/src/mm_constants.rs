//! Memory and paging constants, re-exported from `ember-abi` so in-crate
//! code and external callers share one set of definitions.

pub use ember_abi::arch::x86::memory::{
    DEFAULT_IDENTITY_MAP_BYTES, DEFAULT_MANAGED_MEMORY_BYTES, MAX_MANAGED_FRAMES,
};
pub use ember_abi::arch::x86::paging::{
    ENTRIES_PER_PAGE_TABLE, PAGE_SIZE_4KB, PTE_ADDRESS_MASK, PageFlags,
};
