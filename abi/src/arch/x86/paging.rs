//! Two-level page table constants and entry flags.

use bitflags::bitflags;

/// Size of one physical frame and one mapped page.
pub const PAGE_SIZE_4KB: u32 = 4096;

/// Entries per page directory and per page table.
pub const ENTRIES_PER_PAGE_TABLE: usize = 1024;

/// Mask selecting the frame/table address field of an entry.
pub const PTE_ADDRESS_MASK: u32 = 0xFFFF_F000;

bitflags! {
    /// Flag bits shared by page directory and page table entries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// Entry refers to a frame/table.
        const PRESENT       = 1 << 0;
        /// Writes allowed through this entry.
        const WRITABLE      = 1 << 1;
        /// User-mode access allowed.
        const USER          = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Caching disabled.
        const CACHE_DISABLE = 1 << 4;
        /// Set by the CPU on access.
        const ACCESSED      = 1 << 5;
        /// Set by the CPU on write (table entries only).
        const DIRTY         = 1 << 6;
        /// 4 MiB page in a directory entry; PAT in a table entry.
        const LARGE_OR_PAT  = 1 << 7;
        /// Not flushed from the TLB on CR3 reload.
        const GLOBAL        = 1 << 8;
    }
}

impl PageFlags {
    /// Kernel read/write mapping.
    pub const KERNEL_RW: Self = Self::PRESENT.union(Self::WRITABLE);
    /// Kernel read-only mapping.
    pub const KERNEL_RO: Self = Self::PRESENT;
    /// User read/write mapping.
    pub const USER_RW: Self = Self::KERNEL_RW.union(Self::USER);
    /// User read-only mapping.
    pub const USER_RO: Self = Self::PRESENT.union(Self::USER);
}
