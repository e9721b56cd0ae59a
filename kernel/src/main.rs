//! Kernel entry: runs the bring-up sequence in its required order, then
//! idles. Hosted builds compile to an empty binary so the workspace stays
//! buildable off-target; the real entry point only exists for
//! `target_os = "none"`.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod kernel {
    use core::panic::PanicInfo;

    use ember_abi::arch::x86::ports::PIT_DEFAULT_FREQUENCY_HZ;
    use ember_boot as boot;
    use ember_drivers::{irq, pit, serial, serial_println};
    use ember_lib::cpu;
    use ember_mm as mm;
    use ember_mm::MemoryConfig;

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        cpu::disable_interrupts();
        serial_println!("kernel panic: {}", info);
        cpu::halt_loop();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn _start() -> ! {
        kmain()
    }

    fn kmain() -> ! {
        serial::init();
        serial_println!("EMBER kernel booting");

        // Descriptor tables first, then the exception/IRQ plumbing they
        // back. Interrupts stay globally masked through all of it.
        boot::gdt::init();
        boot::exceptions::install();
        irq::init();

        let config = MemoryConfig::default();
        mm::init(&config);
        if let Err(err) = mm::activate(&config) {
            serial_println!("paging activation failed: {}", err);
            boot::kernel_panic("cannot continue without paging");
        }

        cpu::enable_interrupts();

        if pit::init(PIT_DEFAULT_FREQUENCY_HZ).is_err() {
            boot::kernel_panic("timer line rejected during bring-up");
        }

        serial_println!("bring-up complete, idling");
        cpu::halt_loop()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
