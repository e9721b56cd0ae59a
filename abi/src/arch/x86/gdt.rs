//! GDT segment selectors and descriptor access bits.

use bitflags::bitflags;

/// Segment selector loaded into a segment register.
///
/// Bits 3..15 index into the GDT; bits 0..1 carry the requested privilege
/// level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentSelector(pub u16);

impl SegmentSelector {
    /// Kernel code segment (GDT index 1, RPL 0).
    pub const KERNEL_CODE: Self = Self(0x08);
    /// Kernel data segment (GDT index 2, RPL 0).
    pub const KERNEL_DATA: Self = Self(0x10);
    /// User code segment (GDT index 3, RPL 3).
    pub const USER_CODE: Self = Self(0x18 | 3);
    /// User data segment (GDT index 4, RPL 3).
    pub const USER_DATA: Self = Self(0x20 | 3);

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> u16 {
        self.0 >> 3
    }

    #[inline]
    pub const fn rpl(self) -> u8 {
        (self.0 & 0x3) as u8
    }
}

bitflags! {
    /// Access byte of a segment descriptor.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SegmentAccess: u8 {
        /// Set by the CPU when the segment is touched.
        const ACCESSED   = 1 << 0;
        /// Readable for code segments, writable for data segments.
        const READ_WRITE = 1 << 1;
        /// Conforming for code, grow-down for data.
        const DIRECTION  = 1 << 2;
        /// Code segment when set, data segment when clear.
        const EXECUTABLE = 1 << 3;
        /// Code/data descriptor (as opposed to a system descriptor).
        const SEGMENT    = 1 << 4;
        /// Descriptor privilege level, low bit.
        const DPL_LOW    = 1 << 5;
        /// Descriptor privilege level, high bit.
        const DPL_HIGH   = 1 << 6;
        /// Descriptor is valid.
        const PRESENT    = 1 << 7;
    }
}

impl SegmentAccess {
    /// DPL 3 (both privilege bits).
    pub const DPL_USER: Self = Self::DPL_LOW.union(Self::DPL_HIGH);

    /// Kernel code: present, code/data, executable, readable.
    pub const KERNEL_CODE: Self = Self::PRESENT
        .union(Self::SEGMENT)
        .union(Self::EXECUTABLE)
        .union(Self::READ_WRITE);

    /// Kernel data: present, code/data, writable.
    pub const KERNEL_DATA: Self = Self::PRESENT
        .union(Self::SEGMENT)
        .union(Self::READ_WRITE);

    /// User code: kernel code at DPL 3.
    pub const USER_CODE: Self = Self::KERNEL_CODE.union(Self::DPL_USER);

    /// User data: kernel data at DPL 3.
    pub const USER_DATA: Self = Self::KERNEL_DATA.union(Self::DPL_USER);
}

/// Granularity/flags nibble of a segment descriptor, pre-shifted into the
/// high half of the descriptor's sixth byte.
///
/// 4 KiB granularity plus 32-bit default operand size; the low nibble of
/// that byte holds limit bits 16..19.
pub const GRANULARITY_FLAT_32: u8 = 0xC0;

/// Number of descriptor slots the kernel GDT carries:
/// null, kernel code, kernel data, user code, user data.
pub const GDT_ENTRY_COUNT: usize = 5;
