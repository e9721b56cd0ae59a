//! 16550-family serial console on COM1. Output-only: this is the kernel
//! log sink, not a terminal.

use core::fmt::{self, Write};

use ember_abi::arch::x86::ports::{
    COM1_BASE, UART_FCR_ENABLE_CLEAR, UART_LCR_8N1, UART_LCR_DLAB, UART_LSR_TX_EMPTY,
    UART_MCR_READY, UART_REG_FCR, UART_REG_IER, UART_REG_LCR, UART_REG_LSR, UART_REG_MCR,
    UART_REG_THR,
};
use ember_lib::io;
use ember_lib::klog::klog_attach_serial;
use spin::Mutex;

/// Divisor for 38400 baud from the 115200 Hz UART clock.
const BAUD_DIVISOR: u16 = 3;

/// Bounded wait for the transmitter; the console must not wedge the kernel
/// on a wedged UART.
const TX_SPIN_LIMIT: u32 = 100_000;

struct SerialPort {
    base: u16,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self { base }
    }

    fn init(&mut self) {
        unsafe {
            // Interrupts off; this driver only ever polls.
            io::outb(self.base + UART_REG_IER, 0x00);

            io::outb(self.base + UART_REG_LCR, UART_LCR_DLAB);
            io::outb(self.base + UART_REG_THR, (BAUD_DIVISOR & 0xFF) as u8);
            io::outb(self.base + UART_REG_IER, (BAUD_DIVISOR >> 8) as u8);

            io::outb(self.base + UART_REG_LCR, UART_LCR_8N1);
            io::outb(self.base + UART_REG_FCR, UART_FCR_ENABLE_CLEAR);
            io::outb(self.base + UART_REG_MCR, UART_MCR_READY);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        unsafe {
            for _ in 0..TX_SPIN_LIMIT {
                if io::inb(self.base + UART_REG_LSR) & UART_LSR_TX_EMPTY != 0 {
                    break;
                }
                core::hint::spin_loop();
            }
            io::outb(self.base + UART_REG_THR, byte);
        }
    }
}

impl Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

static SERIAL: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1_BASE));

/// Program the UART and mark the kernel log sink ready.
pub fn init() {
    SERIAL.lock().init();
    klog_attach_serial();
}

pub fn write_line(s: &str) {
    let mut port = SERIAL.lock();
    let _ = port.write_str(s);
    let _ = port.write_str("\n");
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    let _ = SERIAL.lock().write_fmt(args);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => {
        $crate::serial_print!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::serial::_print(::core::format_args!($($arg)*));
        $crate::serial_print!("\n");
    }};
}
