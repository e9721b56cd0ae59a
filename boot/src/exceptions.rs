//! CPU exception vectors and the common interrupt entry point.
//!
//! The low-level stubs normalize every interrupt and exception onto one
//! stack layout, reload the kernel data segments, and call
//! [`interrupt_entry`]. Hardware vectors are forwarded to the dispatcher;
//! CPU exceptions are diagnosed and end in a halt, because this kernel
//! defines no recovery for them.

use ember_abi::arch::x86::idt::{
    EXCEPTION_PAGE_FAULT, EXCEPTION_VECTORS, GATE_INTERRUPT_32, IRQ_BASE_VECTOR, IRQ_LINES,
};
use ember_drivers::irq;
use ember_lib::{cpu, dump_interrupt_frame, klog_error, InterruptFrame};

use crate::idt::InterruptDescriptorTable;
use crate::kernel_panic::kernel_panic;

#[cfg(all(target_arch = "x86", target_os = "none"))]
core::arch::global_asm!(include_str!("../interrupt_stubs.s"), options(att_syntax, raw));

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod stubs {
    use super::{EXCEPTION_VECTORS, IRQ_LINES};

    unsafe extern "C" {
        fn isr0();
        fn isr1();
        fn isr2();
        fn isr3();
        fn isr4();
        fn isr5();
        fn isr6();
        fn isr7();
        fn isr8();
        fn isr9();
        fn isr10();
        fn isr11();
        fn isr12();
        fn isr13();
        fn isr14();
        fn isr15();
        fn isr16();
        fn isr17();
        fn isr18();
        fn isr19();
        fn isr20();
        fn isr21();
        fn isr22();
        fn isr23();
        fn isr24();
        fn isr25();
        fn isr26();
        fn isr27();
        fn isr28();
        fn isr29();
        fn isr30();
        fn isr31();

        fn irq0();
        fn irq1();
        fn irq2();
        fn irq3();
        fn irq4();
        fn irq5();
        fn irq6();
        fn irq7();
        fn irq8();
        fn irq9();
        fn irq10();
        fn irq11();
        fn irq12();
        fn irq13();
        fn irq14();
        fn irq15();
    }

    #[inline(always)]
    fn stub_addr(f: unsafe extern "C" fn()) -> u32 {
        f as usize as u32
    }

    pub fn exception_entries() -> [u32; EXCEPTION_VECTORS] {
        [
            stub_addr(isr0),
            stub_addr(isr1),
            stub_addr(isr2),
            stub_addr(isr3),
            stub_addr(isr4),
            stub_addr(isr5),
            stub_addr(isr6),
            stub_addr(isr7),
            stub_addr(isr8),
            stub_addr(isr9),
            stub_addr(isr10),
            stub_addr(isr11),
            stub_addr(isr12),
            stub_addr(isr13),
            stub_addr(isr14),
            stub_addr(isr15),
            stub_addr(isr16),
            stub_addr(isr17),
            stub_addr(isr18),
            stub_addr(isr19),
            stub_addr(isr20),
            stub_addr(isr21),
            stub_addr(isr22),
            stub_addr(isr23),
            stub_addr(isr24),
            stub_addr(isr25),
            stub_addr(isr26),
            stub_addr(isr27),
            stub_addr(isr28),
            stub_addr(isr29),
            stub_addr(isr30),
            stub_addr(isr31),
        ]
    }

    pub fn irq_entries() -> [u32; IRQ_LINES] {
        [
            stub_addr(irq0),
            stub_addr(irq1),
            stub_addr(irq2),
            stub_addr(irq3),
            stub_addr(irq4),
            stub_addr(irq5),
            stub_addr(irq6),
            stub_addr(irq7),
            stub_addr(irq8),
            stub_addr(irq9),
            stub_addr(irq10),
            stub_addr(irq11),
            stub_addr(irq12),
            stub_addr(irq13),
            stub_addr(irq14),
            stub_addr(irq15),
        ]
    }
}

/// Write the 48 boot-time gates: exception vectors 0..31 and hardware
/// vectors 32..47. Everything else stays not-present.
pub fn install_vectors(
    idt: &mut InterruptDescriptorTable,
    exception_entries: &[u32; EXCEPTION_VECTORS],
    irq_entries: &[u32; IRQ_LINES],
) {
    for (vector, &handler) in exception_entries.iter().enumerate() {
        idt.set_gate(vector as u8, handler, GATE_INTERRUPT_32);
    }
    for (line, &handler) in irq_entries.iter().enumerate() {
        idt.set_gate(IRQ_BASE_VECTOR + line as u8, handler, GATE_INTERRUPT_32);
    }
}

/// Bind every exception and hardware vector, remap the controllers away
/// from the exception range, and activate the table.
///
/// Ordering contract: both the gate installation and the remap must be
/// complete before interrupts are enabled globally.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn install() {
    use ember_abi::arch::x86::idt::SLAVE_BASE_VECTOR;
    use ember_drivers::pic;

    crate::idt::with_global(|table| {
        install_vectors(table, &stubs::exception_entries(), &stubs::irq_entries());
    });
    pic::remap(IRQ_BASE_VECTOR, SLAVE_BASE_VECTOR);
    crate::idt::load();
}

pub fn exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "Divide Error",
        1 => "Debug",
        2 => "Non-Maskable Interrupt",
        3 => "Breakpoint",
        4 => "Overflow",
        5 => "Bound Range Exceeded",
        6 => "Invalid Opcode",
        7 => "Device Not Available",
        8 => "Double Fault",
        9 => "Coprocessor Segment Overrun",
        10 => "Invalid TSS",
        11 => "Segment Not Present",
        12 => "Stack Segment Fault",
        13 => "General Protection Fault",
        14 => "Page Fault",
        16 => "x87 FPU Error",
        17 => "Alignment Check",
        18 => "Machine Check",
        19 => "SIMD Floating-Point Exception",
        _ => "Reserved",
    }
}

/// Common entry called by every stub with the captured register snapshot.
#[unsafe(no_mangle)]
pub extern "C" fn interrupt_entry(frame: *mut InterruptFrame) {
    let frame = unsafe { &*frame };
    let vector = (frame.vector & 0xFF) as u8;

    if vector >= IRQ_BASE_VECTOR {
        irq::dispatch(frame);
        return;
    }

    handle_exception(vector, frame);
}

fn handle_exception(vector: u8, frame: &InterruptFrame) -> ! {
    klog_error!("EXCEPTION: vector {} ({})", vector, exception_name(vector));

    if vector == EXCEPTION_PAGE_FAULT {
        let fault_addr = cpu::read_cr2();
        let error = frame.error_code;
        klog_error!("  fault address: 0x{:08x}", fault_addr);
        klog_error!(
            "  error 0x{:x}: {}, {}, {}",
            error,
            if error & 1 != 0 { "protection violation" } else { "page not present" },
            if error & 2 != 0 { "write" } else { "read" },
            if error & 4 != 0 { "user" } else { "supervisor" }
        );
    }

    dump_interrupt_frame(frame);
    kernel_panic("unhandled CPU exception");
}
