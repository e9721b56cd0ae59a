//! Dispatcher and PIC behavior, observed through the hosted port log.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use ember_drivers::{irq, pic, pit};
use ember_lib::io::capture::{self, PortWrite};
use ember_lib::InterruptFrame;

// The port log is process-global; every test that touches it holds this.
static PORT_LOG_GUARD: Mutex<()> = Mutex::new(());

const PIC_PORTS: [u16; 4] = [0x20, 0x21, 0xA0, 0xA1];
const EOI: u32 = 0x20;

fn lock_log() -> std::sync::MutexGuard<'static, ()> {
    PORT_LOG_GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

fn frame(vector: u32) -> InterruptFrame {
    InterruptFrame {
        gs: 0x10,
        fs: 0x10,
        es: 0x10,
        ds: 0x10,
        edi: 0,
        esi: 0,
        ebp: 0,
        esp_dummy: 0,
        ebx: 0,
        edx: 0,
        ecx: 0,
        eax: 0,
        vector,
        error_code: 0,
        eip: 0x0010_2000,
        cs: 0x08,
        eflags: 0x202,
        user_esp: 0,
        ss: 0,
    }
}

fn pic_writes() -> Vec<PortWrite> {
    capture::with_writes(|writes| {
        writes
            .iter()
            .copied()
            .filter(|w| PIC_PORTS.contains(&w.port))
            .collect()
    })
}

static CALLS_A: AtomicUsize = AtomicUsize::new(0);
static CALLS_B: AtomicUsize = AtomicUsize::new(0);
static SEEN_LINE: AtomicU32 = AtomicU32::new(u32::MAX);
static SEEN_EAX: AtomicU32 = AtomicU32::new(0);
static ACKED_BEFORE_HANDLER: AtomicBool = AtomicBool::new(false);

fn handler_a(line: u8, frame: &InterruptFrame) {
    CALLS_A.fetch_add(1, Ordering::SeqCst);
    SEEN_LINE.store(line as u32, Ordering::SeqCst);
    SEEN_EAX.store(frame.eax, Ordering::SeqCst);
    ACKED_BEFORE_HANDLER.store(
        pic_writes().iter().any(|w| w.port == 0x20 && w.value == EOI),
        Ordering::SeqCst,
    );
}

fn handler_b(_line: u8, _frame: &InterruptFrame) {
    CALLS_B.fetch_add(1, Ordering::SeqCst);
}

fn reset_counters() {
    CALLS_A.store(0, Ordering::SeqCst);
    CALLS_B.store(0, Ordering::SeqCst);
    SEEN_LINE.store(u32::MAX, Ordering::SeqCst);
    SEEN_EAX.store(0, Ordering::SeqCst);
    ACKED_BEFORE_HANDLER.store(false, Ordering::SeqCst);
}

#[test]
fn remap_issues_documented_command_sequence() {
    let _log = lock_log();
    capture::reset();

    pic::remap(32, 40);

    let expected = [
        PortWrite { port: 0x20, value: 0x11 },
        PortWrite { port: 0xA0, value: 0x11 },
        PortWrite { port: 0x21, value: 32 },
        PortWrite { port: 0xA1, value: 40 },
        PortWrite { port: 0x21, value: 0x04 },
        PortWrite { port: 0xA1, value: 0x02 },
        PortWrite { port: 0x21, value: 0x01 },
        PortWrite { port: 0xA1, value: 0x01 },
        PortWrite { port: 0x21, value: 0x00 },
        PortWrite { port: 0xA1, value: 0x00 },
    ];
    assert_eq!(pic_writes(), expected);
    capture::reset();
}

#[test]
fn registered_handler_runs_once_with_snapshot() {
    let _log = lock_log();
    irq::init();
    reset_counters();

    irq::register(5, "test-a", handler_a).unwrap();

    capture::reset();
    let mut f = frame(37);
    f.eax = 0xDEAD_BEEF;
    irq::dispatch(&f);

    assert_eq!(CALLS_A.load(Ordering::SeqCst), 1);
    assert_eq!(SEEN_LINE.load(Ordering::SeqCst), 5);
    assert_eq!(SEEN_EAX.load(Ordering::SeqCst), 0xDEAD_BEEF);
    assert_eq!(irq::delivery_count(5), Some(1));

    // Master line: exactly one master EOI, no slave traffic.
    assert_eq!(pic_writes(), [PortWrite { port: 0x20, value: EOI }]);
    capture::reset();
}

#[test]
fn acknowledge_happens_before_handler_runs() {
    let _log = lock_log();
    irq::init();
    reset_counters();

    irq::register(3, "test-a", handler_a).unwrap();

    capture::reset();
    irq::dispatch(&frame(35));

    assert_eq!(CALLS_A.load(Ordering::SeqCst), 1);
    assert!(ACKED_BEFORE_HANDLER.load(Ordering::SeqCst));
    capture::reset();
}

#[test]
fn unregistered_slave_line_gets_slave_then_master_ack() {
    let _log = lock_log();
    irq::init();
    reset_counters();

    capture::reset();
    // Vector 44 = line 12 (mouse); nothing registered there.
    irq::dispatch(&frame(44));

    assert_eq!(CALLS_A.load(Ordering::SeqCst), 0);
    assert_eq!(CALLS_B.load(Ordering::SeqCst), 0);
    assert_eq!(
        pic_writes(),
        [
            PortWrite { port: 0xA0, value: EOI },
            PortWrite { port: 0x20, value: EOI },
        ]
    );
    capture::reset();
}

#[test]
fn reregistration_overwrites_previous_owner() {
    let _log = lock_log();
    irq::init();
    reset_counters();

    irq::register(6, "first", handler_a).unwrap();
    irq::register(6, "second", handler_b).unwrap();

    capture::reset();
    irq::dispatch(&frame(38));

    assert_eq!(CALLS_A.load(Ordering::SeqCst), 0);
    assert_eq!(CALLS_B.load(Ordering::SeqCst), 1);
    capture::reset();
}

#[test]
fn out_of_range_line_is_reported() {
    let _log = lock_log();
    irq::init();

    assert_eq!(
        irq::register(16, "bogus", handler_a),
        Err(irq::BadLine(16))
    );
    assert_eq!(irq::unregister(200), Err(irq::BadLine(200)));
    assert_eq!(irq::delivery_count(16), None);
    capture::reset();
}

#[test]
fn spurious_vector_still_acknowledged() {
    let _log = lock_log();
    irq::init();
    reset_counters();

    capture::reset();
    irq::dispatch(&frame(48));

    // Vector 48 is past the slave's range but still PIC-era; both EOIs go out.
    assert_eq!(
        pic_writes(),
        [
            PortWrite { port: 0xA0, value: EOI },
            PortWrite { port: 0x20, value: EOI },
        ]
    );
    capture::reset();
}

#[test]
fn timer_scenario_ticks_and_acks() {
    let _log = lock_log();
    irq::init();
    reset_counters();

    capture::reset();
    pit::init(100).unwrap();

    // Rate generator programming: command 0x36, divisor 11931 lo/hi.
    let pit_writes: Vec<_> = capture::with_writes(|writes| {
        writes
            .iter()
            .copied()
            .filter(|w| w.port == 0x43 || w.port == 0x40)
            .collect()
    });
    assert_eq!(
        pit_writes,
        [
            PortWrite { port: 0x43, value: 0x36 },
            PortWrite { port: 0x40, value: 0x9B },
            PortWrite { port: 0x40, value: 0x2E },
        ]
    );
    assert_eq!(pit::frequency(), 100);

    capture::reset();
    irq::dispatch(&frame(32));
    assert_eq!(pit::ticks(), 1);
    assert_eq!(pic_writes(), [PortWrite { port: 0x20, value: EOI }]);

    // An unrelated, unregistered line leaves the tick count alone.
    irq::dispatch(&frame(44));
    assert_eq!(pit::ticks(), 1);
    capture::reset();
}
