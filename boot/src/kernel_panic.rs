//! Terminal failure path. There is no recovery contract for hardware-fatal
//! conditions; the only honest response is to say what happened and stop.

use ember_lib::{cpu, klog_error};

/// Log the failure and halt forever with interrupts disabled.
pub fn kernel_panic(message: &str) -> ! {
    cpu::disable_interrupts();

    klog_error!("");
    klog_error!("=== KERNEL PANIC ===");
    klog_error!("PANIC: {}", message);
    klog_error!(
        "CR0=0x{:08x} CR2=0x{:08x} CR3=0x{:08x}",
        cpu::read_cr0(),
        cpu::read_cr2(),
        cpu::read_cr3()
    );
    klog_error!("System halted.");

    cpu::halt_loop();
}
