//! Hardware-interrupt dispatch and handler registration.
//!
//! Device drivers register one handler per interrupt line; the common
//! interrupt entry path hands every hardware vector to [`dispatch`], which
//! acknowledges the controllers and then calls whatever is registered.
//! The table is only ever mutated with interrupts masked.

use core::sync::atomic::{AtomicBool, Ordering};

use ember_abi::arch::x86::idt::{IRQ_BASE_VECTOR, IRQ_LINES};
use ember_lib::{klog_debug, klog_warn, InterruptFrame, IrqMutex};

use crate::pic;

/// Handler invoked with the interrupt line and the register snapshot.
/// The snapshot is borrowed; handlers must not stash it.
pub type IrqHandler = fn(u8, &InterruptFrame);

/// Registration attempt on a line outside 0..16.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BadLine(pub u8);

#[derive(Clone, Copy)]
struct IrqEntry {
    handler: Option<IrqHandler>,
    name: &'static str,
    count: u64,
    reported_unhandled: bool,
}

impl IrqEntry {
    const fn new() -> Self {
        Self {
            handler: None,
            name: "",
            count: 0,
            reported_unhandled: false,
        }
    }
}

static IRQ_TABLE: IrqMutex<[IrqEntry; IRQ_LINES]> = IrqMutex::new([IrqEntry::new(); IRQ_LINES]);
static IRQ_SYSTEM_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Reset the registration table. Runs once during boot, after the
/// descriptor tables are loaded and before interrupts are enabled.
pub fn init() {
    let mut table = IRQ_TABLE.lock();
    for entry in table.iter_mut() {
        *entry = IrqEntry::new();
    }
    drop(table);
    IRQ_SYSTEM_INITIALIZED.store(true, Ordering::Relaxed);
}

/// Store `handler` for `line`, replacing any previous registration.
/// A line is owned by at most one driver; re-registration overwrites.
pub fn register(line: u8, name: &'static str, handler: IrqHandler) -> Result<(), BadLine> {
    if line as usize >= IRQ_LINES {
        klog_warn!("IRQ: refusing handler registration for invalid line {}", line);
        return Err(BadLine(line));
    }

    let mut table = IRQ_TABLE.lock();
    let entry = &mut table[line as usize];
    entry.handler = Some(handler);
    entry.name = name;
    entry.reported_unhandled = false;
    drop(table);

    klog_debug!("IRQ: registered handler for line {} ({})", line, name);
    Ok(())
}

/// Drop any registration for `line`.
pub fn unregister(line: u8) -> Result<(), BadLine> {
    if line as usize >= IRQ_LINES {
        return Err(BadLine(line));
    }
    let mut table = IRQ_TABLE.lock();
    table[line as usize] = IrqEntry::new();
    drop(table);

    klog_debug!("IRQ: unregistered handler for line {}", line);
    Ok(())
}

/// Deliveries observed on `line` since boot.
pub fn delivery_count(line: u8) -> Option<u64> {
    if line as usize >= IRQ_LINES {
        return None;
    }
    Some(IRQ_TABLE.lock()[line as usize].count)
}

/// Route one hardware interrupt.
///
/// The controllers are acknowledged before any handler runs and regardless
/// of whether one is registered; an unacknowledged 8259 stops delivering
/// the line (and, from the slave, all eight of its lines).
pub fn dispatch(frame: &InterruptFrame) {
    let vector = (frame.vector & 0xFF) as u8;

    if vector < IRQ_BASE_VECTOR {
        klog_warn!("IRQ: received non-IRQ vector {}", vector);
        return;
    }

    let line = vector - IRQ_BASE_VECTOR;
    if line as usize >= IRQ_LINES {
        klog_warn!("IRQ: spurious vector {} received", vector);
        pic::end_of_interrupt(vector);
        return;
    }

    if !IRQ_SYSTEM_INITIALIZED.load(Ordering::Relaxed) {
        klog_warn!("IRQ: dispatch on line {} before initialization", line);
        pic::end_of_interrupt(vector);
        return;
    }

    pic::end_of_interrupt(vector);

    let handler = {
        let mut table = IRQ_TABLE.lock();
        let entry = &mut table[line as usize];
        entry.count = entry.count.wrapping_add(1);
        entry.handler
    };

    match handler {
        Some(handler) => handler(line, frame),
        None => {
            let report = {
                let mut table = IRQ_TABLE.lock();
                let entry = &mut table[line as usize];
                let first = !entry.reported_unhandled;
                entry.reported_unhandled = true;
                first
            };
            if report {
                klog_debug!("IRQ: no handler for line {} (vector {})", line, vector);
            }
        }
    }
}
