//! Global Descriptor Table construction and loading.
//!
//! The kernel runs a flat model: every segment spans the full 4 GiB address
//! space with base 0, and privilege separation is carried entirely by the
//! descriptor privilege fields. The table is built once at boot and never
//! edited afterwards.

use core::cell::UnsafeCell;
use core::mem::size_of;

use ember_abi::arch::x86::gdt::{
    GDT_ENTRY_COUNT, GRANULARITY_FLAT_32, SegmentAccess, SegmentSelector,
};
use ember_lib::klog_debug;

/// Hardware layout of one 8-byte segment descriptor: 16-bit limit low,
/// 24 bits of base, access byte, flags nibble + limit high nibble, base
/// high byte.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentDescriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

const _: () = assert!(size_of::<SegmentDescriptor>() == 8);

impl SegmentDescriptor {
    /// The mandatory all-zero descriptor for slot 0. Loading a selector
    /// that references it faults, which is the point.
    pub const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    pub fn new(base: u32, limit: u32, access: SegmentAccess, flags: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access: access.bits(),
            granularity: (flags & 0xF0) | (((limit >> 16) & 0x0F) as u8),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    /// Flat segment: base 0, limit 0xFFFFF in 4 KiB units, 32-bit.
    pub fn flat(access: SegmentAccess) -> Self {
        Self::new(0, 0xF_FFFF, access, GRANULARITY_FLAT_32)
    }

    pub fn access_bits(&self) -> u8 {
        self.access
    }

    pub fn granularity_bits(&self) -> u8 {
        self.granularity
    }

    pub fn limit_low_bits(&self) -> u16 {
        self.limit_low
    }

    pub fn is_null(&self) -> bool {
        self.limit_low == 0
            && self.base_low == 0
            && self.base_mid == 0
            && self.access == 0
            && self.granularity == 0
            && self.base_high == 0
    }
}

/// Operand of `lgdt`/`lidt`: table length minus one, then its linear
/// address.
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

const _: () = assert!(size_of::<DescriptorTablePointer>() == 6);

#[repr(C, align(8))]
pub struct GlobalDescriptorTable {
    entries: [SegmentDescriptor; GDT_ENTRY_COUNT],
}

impl GlobalDescriptorTable {
    pub const fn new() -> Self {
        Self {
            entries: [SegmentDescriptor::null(); GDT_ENTRY_COUNT],
        }
    }

    /// Slot 0 stays null; kernel and user code/data pairs fill the rest.
    pub fn populate_flat(&mut self) {
        self.entries[SegmentSelector::KERNEL_CODE.index() as usize] =
            SegmentDescriptor::flat(SegmentAccess::KERNEL_CODE);
        self.entries[SegmentSelector::KERNEL_DATA.index() as usize] =
            SegmentDescriptor::flat(SegmentAccess::KERNEL_DATA);
        self.entries[SegmentSelector::USER_CODE.index() as usize] =
            SegmentDescriptor::flat(SegmentAccess::USER_CODE);
        self.entries[SegmentSelector::USER_DATA.index() as usize] =
            SegmentDescriptor::flat(SegmentAccess::USER_DATA);
    }

    pub fn entry(&self, index: usize) -> SegmentDescriptor {
        self.entries[index]
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<SegmentDescriptor>() * GDT_ENTRY_COUNT - 1) as u16,
            base: self.entries.as_ptr() as usize as u32,
        }
    }
}

impl Default for GlobalDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

struct GdtCell(UnsafeCell<GlobalDescriptorTable>);

// SAFETY: written once during single-threaded boot, read-only afterwards.
unsafe impl Sync for GdtCell {}

static GDT: GdtCell = GdtCell(UnsafeCell::new(GlobalDescriptorTable::new()));

/// Build the boot GDT and hand it to the CPU.
///
/// `lgdt` has no failure path; a malformed table faults on the next
/// segment load instead of reporting anything. Runs exactly once, before
/// interrupts are enabled.
pub fn init() {
    let gdt = unsafe { &mut *GDT.0.get() };
    gdt.populate_flat();
    let pointer = gdt.pointer();
    unsafe { load(&pointer) };
    klog_debug!("GDT: flat segmentation active ({} descriptors)", GDT_ENTRY_COUNT);
}

#[cfg(target_os = "none")]
unsafe fn load(pointer: &DescriptorTablePointer) {
    use core::arch::asm;

    let pointer = core::ptr::from_ref(pointer);
    unsafe {
        asm!("lgdt [{0}]", in(reg) pointer, options(nostack, preserves_flags));

        // Far return to reload CS, then refresh the data segment registers.
        asm!(
            "pushl ${code}",
            "leal 2f, %eax",
            "pushl %eax",
            "lretl",
            "2:",
            "movw ${data}, %ax",
            "movw %ax, %ds",
            "movw %ax, %es",
            "movw %ax, %fs",
            "movw %ax, %gs",
            "movw %ax, %ss",
            code = const SegmentSelector::KERNEL_CODE.bits() as usize,
            data = const SegmentSelector::KERNEL_DATA.bits() as usize,
            out("eax") _,
            options(att_syntax)
        );
    }
}

#[cfg(not(target_os = "none"))]
unsafe fn load(_pointer: &DescriptorTablePointer) {}
