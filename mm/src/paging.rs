//! Two-level page tables: one directory of 1024 entries, each pointing at
//! a table of 1024 entries, each mapping one 4 KiB frame.
//!
//! Table memory comes from the frame allocator and is reached through a
//! [`PhysWindow`], so the same code drives real translation hardware in
//! the kernel and plain memory in hosted tests. A present table entry's
//! frame must be marked used in the frame map; `map` and `activate`
//! maintain that, callers of the raw types must too.

use core::ptr;

use ember_abi::arch::x86::paging::{
    ENTRIES_PER_PAGE_TABLE, PAGE_SIZE_4KB, PTE_ADDRESS_MASK, PageFlags,
};
use ember_lib::{cpu, is_aligned_u32, klog_debug, IrqMutex};

use crate::frame_alloc::{self, FrameAllocator, MemoryConfig};
use crate::MmError;

/// Window translating physical frame addresses to dereferenceable
/// pointers. Identity for the kernel proper; hosted tests point it at an
/// arena.
#[derive(Clone, Copy, Debug)]
pub struct PhysWindow {
    offset: usize,
}

impl PhysWindow {
    pub const IDENTITY: Self = Self { offset: 0 };

    pub const fn at_offset(offset: usize) -> Self {
        Self { offset }
    }

    fn frame_ptr(self, phys: u32) -> *mut u8 {
        (phys as usize).wrapping_add(self.offset) as *mut u8
    }

    fn table_ptr(self, phys: u32) -> *mut PageTable {
        self.frame_ptr(phys) as *mut PageTable
    }
}

/// One directory or table entry: flag bits in the low word, 4 KiB-aligned
/// frame/table address in the top 20 bits.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(frame_phys: u32, flags: PageFlags) -> Self {
        Self((frame_phys & PTE_ADDRESS_MASK) | flags.bits())
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    pub fn frame_address(self) -> u32 {
        self.0 & PTE_ADDRESS_MASK
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & !PTE_ADDRESS_MASK)
    }

    /// Drop the present/rw/user bits, ending the mapping while leaving the
    /// stale frame bits behind as debris.
    fn clear_mapping(&mut self) {
        self.0 &= !(PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; ENTRIES_PER_PAGE_TABLE],
}

fn directory_index(virt: u32) -> usize {
    (virt >> 22) as usize
}

fn table_index(virt: u32) -> usize {
    ((virt >> 12) & 0x3FF) as usize
}

fn alloc_page_table(alloc: &mut FrameAllocator, window: PhysWindow) -> Result<u32, MmError> {
    let phys = alloc.allocate()?;
    unsafe {
        ptr::write_bytes(window.frame_ptr(phys), 0, PAGE_SIZE_4KB as usize);
    }
    Ok(phys)
}

/// A page directory plus the window its tables are edited through.
pub struct AddressSpace {
    directory_phys: u32,
    window: PhysWindow,
}

impl AddressSpace {
    /// Allocate and zero a fresh directory.
    pub fn create(alloc: &mut FrameAllocator, window: PhysWindow) -> Result<Self, MmError> {
        let directory_phys = alloc_page_table(alloc, window)?;
        Ok(Self {
            directory_phys,
            window,
        })
    }

    pub fn directory_phys(&self) -> u32 {
        self.directory_phys
    }

    pub fn directory_entry(&self, index: usize) -> PageTableEntry {
        unsafe { (*self.window.table_ptr(self.directory_phys)).entries[index] }
    }

    /// Point `virt` at `phys` with `flags` (the present bit is implied).
    ///
    /// First touch of a directory slot allocates and zeroes a page table;
    /// the directory entry takes read/write plus the user bit when the
    /// mapping itself is a user mapping.
    pub fn map(
        &mut self,
        alloc: &mut FrameAllocator,
        phys: u32,
        virt: u32,
        flags: PageFlags,
    ) -> Result<(), MmError> {
        if !is_aligned_u32(phys, PAGE_SIZE_4KB) || !is_aligned_u32(virt, PAGE_SIZE_4KB) {
            return Err(MmError::Unaligned);
        }

        unsafe {
            let directory = &mut *self.window.table_ptr(self.directory_phys);
            let dir_slot = directory_index(virt);
            let dir_entry = directory.entries[dir_slot];

            let table_phys = if dir_entry.is_present() {
                dir_entry.frame_address()
            } else {
                let table_phys = alloc_page_table(alloc, self.window)?;
                let mut dir_flags = PageFlags::PRESENT | PageFlags::WRITABLE;
                if flags.contains(PageFlags::USER) {
                    dir_flags |= PageFlags::USER;
                }
                directory.entries[dir_slot] = PageTableEntry::new(table_phys, dir_flags);
                table_phys
            };

            let table = &mut *self.window.table_ptr(table_phys);
            table.entries[table_index(virt)] =
                PageTableEntry::new(phys, flags | PageFlags::PRESENT);
        }

        Ok(())
    }

    /// End the mapping for `virt` and release its frame.
    ///
    /// A not-present directory slot is a silent no-op; a not-present table
    /// entry is a reported caller error, because releasing its frame again
    /// would hand the same memory to two owners.
    pub fn unmap(&mut self, alloc: &mut FrameAllocator, virt: u32) -> Result<(), MmError> {
        unsafe {
            let directory = &mut *self.window.table_ptr(self.directory_phys);
            let dir_entry = directory.entries[directory_index(virt)];
            if !dir_entry.is_present() {
                return Ok(());
            }

            let table = &mut *self.window.table_ptr(dir_entry.frame_address());
            let entry = &mut table.entries[table_index(virt)];
            if !entry.is_present() {
                return Err(MmError::NotMapped);
            }

            let frame = entry.frame_address();
            entry.clear_mapping();
            alloc.free(frame)?;
        }

        Ok(())
    }

    /// Walk the tables the way the MMU would.
    pub fn translate(&self, virt: u32) -> Option<(u32, PageFlags)> {
        unsafe {
            let directory = &*self.window.table_ptr(self.directory_phys);
            let dir_entry = directory.entries[directory_index(virt)];
            if !dir_entry.is_present() {
                return None;
            }

            let table = &*self.window.table_ptr(dir_entry.frame_address());
            let entry = table.entries[table_index(virt)];
            if !entry.is_present() {
                return None;
            }

            Some((entry.frame_address() | (virt & (PAGE_SIZE_4KB - 1)), entry.flags()))
        }
    }
}

static KERNEL_SPACE: IrqMutex<Option<AddressSpace>> = IrqMutex::new(None);

/// Identity-map the configured boot region, load the directory into CR3,
/// and set the paging-enable bit.
///
/// The identity region's frames are reserved in the frame map first, so
/// every present entry refers to a frame accounted as used.
pub fn activate(config: &MemoryConfig) -> Result<(), MmError> {
    frame_alloc::with_allocator(|alloc| {
        let mut space = AddressSpace::create(alloc, PhysWindow::IDENTITY)?;

        let identity_start = config.managed_base;
        let identity_end = config.managed_base + config.identity_map_bytes;
        alloc.reserve_range(identity_start, identity_end)?;

        let mut addr = identity_start;
        while addr < identity_end {
            space.map(alloc, addr, addr, PageFlags::KERNEL_RW)?;
            addr += PAGE_SIZE_4KB;
        }

        cpu::write_cr3(space.directory_phys() as usize);
        cpu::enable_paging();

        klog_debug!(
            "paging: active, identity 0x{:08x}..0x{:08x}, directory 0x{:08x}",
            identity_start,
            identity_end,
            space.directory_phys()
        );

        *KERNEL_SPACE.lock() = Some(space);
        Ok(())
    })
}

/// Map into the live kernel address space.
pub fn kernel_map(phys: u32, virt: u32, flags: PageFlags) -> Result<(), MmError> {
    frame_alloc::with_allocator(|alloc| {
        let mut space = KERNEL_SPACE.lock();
        let space = space.as_mut().ok_or(MmError::NotActive)?;
        space.map(alloc, phys, virt, flags)
    })
}

/// Unmap from the live kernel address space and flush the TLB entry.
pub fn kernel_unmap(virt: u32) -> Result<(), MmError> {
    frame_alloc::with_allocator(|alloc| {
        let mut space = KERNEL_SPACE.lock();
        let space = space.as_mut().ok_or(MmError::NotActive)?;
        space.unmap(alloc, virt)?;
        cpu::invlpg(virt as usize);
        Ok(())
    })
}

/// Query the live kernel address space.
pub fn kernel_translate(virt: u32) -> Option<(u32, PageFlags)> {
    KERNEL_SPACE.lock().as_ref()?.translate(virt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_alloc::FRAME_SIZE;
    use std::alloc::{alloc_zeroed, dealloc, Layout};

    /// Heap-backed "physical memory" starting at phys 0.
    struct Arena {
        ptr: *mut u8,
        layout: Layout,
    }

    impl Arena {
        fn new(frames: usize) -> Self {
            let layout =
                Layout::from_size_align(frames * FRAME_SIZE as usize, FRAME_SIZE as usize)
                    .unwrap();
            let ptr = unsafe { alloc_zeroed(layout) };
            assert!(!ptr.is_null());
            Self { ptr, layout }
        }

        fn window(&self) -> PhysWindow {
            PhysWindow::at_offset(self.ptr as usize)
        }
    }

    impl Drop for Arena {
        fn drop(&mut self) {
            unsafe { dealloc(self.ptr, self.layout) };
        }
    }

    fn setup(frames: u32) -> (Arena, FrameAllocator) {
        let arena = Arena::new(frames as usize);
        let mut alloc = FrameAllocator::new();
        alloc.init(0, frames * FRAME_SIZE);
        (arena, alloc)
    }

    #[test]
    fn map_translate_unmap_round_trip() {
        let (arena, mut alloc) = setup(16);
        let mut space = AddressSpace::create(&mut alloc, arena.window()).unwrap();

        let frame = alloc.allocate().unwrap();
        space
            .map(&mut alloc, frame, 0x0040_0000, PageFlags::KERNEL_RW)
            .unwrap();

        let (phys, flags) = space.translate(0x0040_0000).unwrap();
        assert_eq!(phys, frame);
        assert!(flags.contains(PageFlags::PRESENT | PageFlags::WRITABLE));
        assert!(!flags.contains(PageFlags::USER));

        // Offsets within the page carry through the walk.
        assert_eq!(space.translate(0x0040_0123).unwrap().0, frame | 0x123);

        space.unmap(&mut alloc, 0x0040_0000).unwrap();
        assert_eq!(space.translate(0x0040_0000), None);

        // The frame went back to the pool and first-fit hands it out again.
        assert_eq!(alloc.allocate(), Ok(frame));
    }

    #[test]
    fn user_mapping_propagates_to_directory_entry() {
        let (arena, mut alloc) = setup(16);
        let mut space = AddressSpace::create(&mut alloc, arena.window()).unwrap();

        let frame = alloc.allocate().unwrap();
        space
            .map(&mut alloc, frame, 0x0080_0000, PageFlags::USER_RW)
            .unwrap();

        let dir_entry = space.directory_entry(directory_index(0x0080_0000));
        assert!(dir_entry.is_present());
        assert!(dir_entry.flags().contains(PageFlags::USER));

        let (_, flags) = space.translate(0x0080_0000).unwrap();
        assert!(flags.contains(PageFlags::USER));
    }

    #[test]
    fn unmap_without_directory_entry_is_a_noop() {
        let (arena, mut alloc) = setup(8);
        let mut space = AddressSpace::create(&mut alloc, arena.window()).unwrap();
        assert_eq!(space.unmap(&mut alloc, 0x0800_0000), Ok(()));
    }

    #[test]
    fn unmapping_twice_is_reported() {
        let (arena, mut alloc) = setup(16);
        let mut space = AddressSpace::create(&mut alloc, arena.window()).unwrap();

        let frame = alloc.allocate().unwrap();
        space
            .map(&mut alloc, frame, 0x0040_0000, PageFlags::KERNEL_RW)
            .unwrap();
        space.unmap(&mut alloc, 0x0040_0000).unwrap();
        assert_eq!(
            space.unmap(&mut alloc, 0x0040_0000),
            Err(MmError::NotMapped)
        );
    }

    #[test]
    fn misaligned_addresses_are_rejected() {
        let (arena, mut alloc) = setup(8);
        let mut space = AddressSpace::create(&mut alloc, arena.window()).unwrap();

        assert_eq!(
            space.map(&mut alloc, 0x1000, 0x2345, PageFlags::KERNEL_RW),
            Err(MmError::Unaligned)
        );
        assert_eq!(
            space.map(&mut alloc, 0x1234, 0x2000, PageFlags::KERNEL_RW),
            Err(MmError::Unaligned)
        );
    }

    #[test]
    fn identity_mapping_first_4mib_fills_one_directory_slot() {
        // 1024 identity frames + the directory + one page table.
        const IDENTITY_FRAMES: u32 = 1024;
        let (arena, mut alloc) = setup(IDENTITY_FRAMES + 2);

        let mut space = AddressSpace::create(&mut alloc, arena.window()).unwrap();
        alloc
            .reserve_range(0, IDENTITY_FRAMES * FRAME_SIZE)
            .unwrap();

        let mut addr = 0u32;
        while addr < IDENTITY_FRAMES * FRAME_SIZE {
            space
                .map(&mut alloc, addr, addr, PageFlags::KERNEL_RW)
                .unwrap();
            addr += FRAME_SIZE;
        }

        let present_dir_slots = (0..ENTRIES_PER_PAGE_TABLE)
            .filter(|&i| space.directory_entry(i).is_present())
            .count();
        assert_eq!(present_dir_slots, 1);
        assert!(space.directory_entry(0).is_present());

        for page in 0..IDENTITY_FRAMES {
            let virt = page * FRAME_SIZE;
            let (phys, flags) = space.translate(virt).unwrap();
            assert_eq!(phys, virt);
            assert!(flags.contains(PageFlags::PRESENT | PageFlags::WRITABLE));
        }

        // The directory landed inside the identity region (frame 0), so the
        // only frame used beyond it is the single page table.
        assert_eq!(alloc.stats().used, IDENTITY_FRAMES + 1);
    }
}
