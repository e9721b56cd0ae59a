#![cfg_attr(not(test), no_std)]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod cpu {
    //! Privileged and miscellaneous CPU instructions.
    //!
    //! On the kernel target (`target_os = "none"`, i686) these are the real
    //! instructions. Hosted builds get emulated state so the rest of the
    //! kernel can be exercised under `cargo test`.

    #[cfg(target_os = "none")]
    use core::arch::asm;

    /// EFLAGS interrupt-enable bit.
    pub const EFLAGS_IF: u32 = 1 << 9;

    #[cfg(target_os = "none")]
    mod hw {
        use core::arch::asm;

        #[inline(always)]
        pub fn read_eflags() -> u32 {
            let flags: u32;
            unsafe {
                asm!("pushfd; pop {}", out(reg) flags, options(nomem, preserves_flags));
            }
            flags
        }
    }

    #[cfg(not(target_os = "none"))]
    mod emulated {
        use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

        pub static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);
        pub static CR0: AtomicUsize = AtomicUsize::new(0);
        pub static CR2: AtomicUsize = AtomicUsize::new(0);
        pub static CR3: AtomicUsize = AtomicUsize::new(0);

        pub fn read_eflags() -> u32 {
            if INTERRUPTS_ENABLED.load(Ordering::Relaxed) {
                super::EFLAGS_IF
            } else {
                0
            }
        }
    }

    #[inline(always)]
    pub fn hlt() {
        #[cfg(target_os = "none")]
        unsafe {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(target_os = "none"))]
        core::hint::spin_loop();
    }

    #[inline(always)]
    pub fn pause() {
        core::hint::spin_loop();
    }

    #[inline(always)]
    pub fn enable_interrupts() {
        #[cfg(target_os = "none")]
        unsafe {
            asm!("sti", options(nomem, nostack));
        }
        #[cfg(not(target_os = "none"))]
        emulated::INTERRUPTS_ENABLED.store(true, core::sync::atomic::Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn disable_interrupts() {
        #[cfg(target_os = "none")]
        unsafe {
            asm!("cli", options(nomem, nostack));
        }
        #[cfg(not(target_os = "none"))]
        emulated::INTERRUPTS_ENABLED.store(false, core::sync::atomic::Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn read_eflags() -> u32 {
        #[cfg(target_os = "none")]
        {
            hw::read_eflags()
        }
        #[cfg(not(target_os = "none"))]
        {
            emulated::read_eflags()
        }
    }

    #[inline(always)]
    pub fn interrupts_enabled() -> bool {
        read_eflags() & EFLAGS_IF != 0
    }

    #[inline(always)]
    pub fn halt_loop() -> ! {
        loop {
            hlt();
        }
    }

    #[inline(always)]
    pub fn read_cr0() -> usize {
        #[cfg(target_os = "none")]
        {
            let value: usize;
            unsafe {
                asm!("mov {}, cr0", out(reg) value, options(nomem, nostack, preserves_flags));
            }
            value
        }
        #[cfg(not(target_os = "none"))]
        {
            emulated::CR0.load(core::sync::atomic::Ordering::Relaxed)
        }
    }

    #[inline(always)]
    pub fn write_cr0(value: usize) {
        #[cfg(target_os = "none")]
        unsafe {
            asm!("mov cr0, {}", in(reg) value, options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(target_os = "none"))]
        emulated::CR0.store(value, core::sync::atomic::Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn read_cr2() -> usize {
        #[cfg(target_os = "none")]
        {
            let value: usize;
            unsafe {
                asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
            }
            value
        }
        #[cfg(not(target_os = "none"))]
        {
            emulated::CR2.load(core::sync::atomic::Ordering::Relaxed)
        }
    }

    #[inline(always)]
    pub fn read_cr3() -> usize {
        #[cfg(target_os = "none")]
        {
            let value: usize;
            unsafe {
                asm!("mov {}, cr3", out(reg) value, options(nomem, nostack, preserves_flags));
            }
            value
        }
        #[cfg(not(target_os = "none"))]
        {
            emulated::CR3.load(core::sync::atomic::Ordering::Relaxed)
        }
    }

    #[inline(always)]
    pub fn write_cr3(value: usize) {
        #[cfg(target_os = "none")]
        unsafe {
            asm!("mov cr3, {}", in(reg) value, options(nostack, preserves_flags));
        }
        #[cfg(not(target_os = "none"))]
        emulated::CR3.store(value, core::sync::atomic::Ordering::Relaxed);
    }

    /// Set the paging-enable bit in CR0.
    #[inline(always)]
    pub fn enable_paging() {
        write_cr0(read_cr0() | 0x8000_0000);
    }

    /// Invalidate the TLB entry for one virtual address.
    #[inline(always)]
    pub fn invlpg(addr: usize) {
        #[cfg(target_os = "none")]
        unsafe {
            asm!("invlpg [{}]", in(reg) addr, options(nostack, preserves_flags));
        }
        #[cfg(not(target_os = "none"))]
        let _ = addr;
    }
}

pub mod alignment;
pub mod init_flag;
pub mod io;
pub mod kdiag;
pub mod klog;
pub mod spinlock;

pub use alignment::{align_down_u32, align_up_u32, is_aligned_u32};
pub use init_flag::InitFlag;
pub use kdiag::{dump_interrupt_frame, InterruptFrame};
pub use klog::KlogLevel;
pub use spinlock::{IrqMutex, Spinlock};
