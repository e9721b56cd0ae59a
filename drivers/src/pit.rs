//! 8254 PIT driver: the periodic tick source, and the reference consumer
//! of the interrupt registration surface.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ember_abi::arch::x86::ports::{
    PIT_BASE_FREQUENCY_HZ, PIT_CHANNEL0_PORT, PIT_COMMAND_ACCESS_LOHI, PIT_COMMAND_BINARY,
    PIT_COMMAND_CHANNEL0, PIT_COMMAND_MODE_SQUARE, PIT_COMMAND_PORT, PIT_DEFAULT_FREQUENCY_HZ,
    PIT_IRQ_LINE,
};
use ember_lib::{io, klog_info, InterruptFrame};

use crate::irq;

static TICKS: AtomicU64 = AtomicU64::new(0);
static CURRENT_FREQUENCY_HZ: AtomicU32 = AtomicU32::new(0);

fn timer_tick(_line: u8, _frame: &InterruptFrame) {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

fn calculate_divisor(frequency_hz: u32) -> u16 {
    let mut frequency_hz = frequency_hz;
    if frequency_hz == 0 {
        frequency_hz = PIT_DEFAULT_FREQUENCY_HZ;
    }
    if frequency_hz > PIT_BASE_FREQUENCY_HZ {
        frequency_hz = PIT_BASE_FREQUENCY_HZ;
    }

    let divisor = (PIT_BASE_FREQUENCY_HZ / frequency_hz).clamp(1, 0xFFFF);
    CURRENT_FREQUENCY_HZ.store(PIT_BASE_FREQUENCY_HZ / divisor, Ordering::Relaxed);
    divisor as u16
}

/// Program channel 0 as a rate generator at `frequency_hz`.
pub fn set_frequency(frequency_hz: u32) {
    let divisor = calculate_divisor(frequency_hz);
    unsafe {
        io::outb(
            PIT_COMMAND_PORT,
            PIT_COMMAND_CHANNEL0
                | PIT_COMMAND_ACCESS_LOHI
                | PIT_COMMAND_MODE_SQUARE
                | PIT_COMMAND_BINARY,
        );
        io::outb(PIT_CHANNEL0_PORT, (divisor & 0xFF) as u8);
        io::outb(PIT_CHANNEL0_PORT, (divisor >> 8) as u8);
    }
}

/// Program the timer and claim interrupt line 0.
pub fn init(frequency_hz: u32) -> Result<(), irq::BadLine> {
    TICKS.store(0, Ordering::Relaxed);
    set_frequency(frequency_hz);
    irq::register(PIT_IRQ_LINE, "pit", timer_tick)?;
    klog_info!(
        "PIT: timer running at {} Hz",
        CURRENT_FREQUENCY_HZ.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Ticks observed since `init`.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Actual programmed frequency after divisor rounding.
pub fn frequency() -> u32 {
    let freq = CURRENT_FREQUENCY_HZ.load(Ordering::Relaxed);
    if freq == 0 {
        PIT_DEFAULT_FREQUENCY_HZ
    } else {
        freq
    }
}
