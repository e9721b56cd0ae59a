//! Legacy 8259 PIC (Programmable Interrupt Controller) programming.
//!
//! At power-on the two cascaded controllers deliver IRQs on vectors that
//! collide with the CPU exception range, so the first thing the kernel does
//! with them is a full reinitialization that moves both vector bases.

use ember_abi::arch::x86::idt::SLAVE_BASE_VECTOR;
use ember_abi::arch::x86::ports::{
    PIC1_COMMAND, PIC1_DATA, PIC2_COMMAND, PIC2_DATA, PIC_EOI,
};
use ember_lib::io;

/// ICW1: edge-triggered init sequence, ICW4 follows.
const ICW1_INIT_WITH_ICW4: u8 = 0x11;
/// ICW3 (master): a slave hangs off IRQ line 2.
const ICW3_SLAVE_ON_IRQ2: u8 = 0x04;
/// ICW3 (slave): cascade identity 2.
const ICW3_CASCADE_IDENTITY: u8 = 0x02;
/// ICW4: 8086/88 mode.
const ICW4_MODE_8086: u8 = 0x01;

/// Reinitialize both controllers so the master delivers its eight lines at
/// `master_offset` and the slave at `slave_offset`, then unmask every line.
///
/// Must complete before hardware interrupts are enabled globally; until the
/// remap, IRQ vectors alias CPU exceptions.
pub fn remap(master_offset: u8, slave_offset: u8) {
    unsafe {
        io::outb(PIC1_COMMAND, ICW1_INIT_WITH_ICW4);
        io::outb(PIC2_COMMAND, ICW1_INIT_WITH_ICW4);

        io::outb(PIC1_DATA, master_offset);
        io::outb(PIC2_DATA, slave_offset);

        io::outb(PIC1_DATA, ICW3_SLAVE_ON_IRQ2);
        io::outb(PIC2_DATA, ICW3_CASCADE_IDENTITY);

        io::outb(PIC1_DATA, ICW4_MODE_8086);
        io::outb(PIC2_DATA, ICW4_MODE_8086);

        io::outb(PIC1_DATA, 0x00);
        io::outb(PIC2_DATA, 0x00);
    }
}

/// Acknowledge the controllers for `vector`.
///
/// Slave interrupts need the slave acknowledged first; the master is always
/// acknowledged because the slave cascades through it. Skipping this stops
/// all further delivery on the line.
pub fn end_of_interrupt(vector: u8) {
    unsafe {
        if vector >= SLAVE_BASE_VECTOR {
            io::outb(PIC2_COMMAND, PIC_EOI);
        }
        io::outb(PIC1_COMMAND, PIC_EOI);
    }
}

/// Set every bit in both interrupt mask registers.
pub fn mask_all() {
    unsafe {
        io::outb(PIC1_DATA, 0xFF);
        io::outb(PIC2_DATA, 0xFF);
    }
}

/// Mask one interrupt line in the owning controller's IMR.
pub fn mask_line(line: u8) {
    if line >= 16 {
        return;
    }
    unsafe {
        if line < 8 {
            let imr = io::inb(PIC1_DATA);
            io::outb(PIC1_DATA, imr | (1 << line));
        } else {
            let imr = io::inb(PIC2_DATA);
            io::outb(PIC2_DATA, imr | (1 << (line - 8)));
        }
    }
}

/// Unmask one interrupt line in the owning controller's IMR.
pub fn unmask_line(line: u8) {
    if line >= 16 {
        return;
    }
    unsafe {
        if line < 8 {
            let imr = io::inb(PIC1_DATA);
            io::outb(PIC1_DATA, imr & !(1 << line));
        } else {
            let imr = io::inb(PIC2_DATA);
            io::outb(PIC2_DATA, imr & !(1 << (line - 8)));
        }
    }
}
