use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::cpu;

/// Raw spinlock without data. Callers pair it with the state it guards.
pub struct Spinlock {
    locked: AtomicBool,
}

impl Spinlock {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub fn lock(&self) {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
    }

    #[inline(always)]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Lock with interrupts disabled; returns the saved EFLAGS.
    #[inline(always)]
    pub fn lock_irqsave(&self) -> u32 {
        let flags = cpu::read_eflags();
        cpu::disable_interrupts();
        self.lock();
        flags
    }

    #[inline(always)]
    pub fn unlock_irqrestore(&self, flags: u32) {
        self.unlock();
        if flags & cpu::EFLAGS_IF != 0 {
            cpu::enable_interrupts();
        }
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutex that disables interrupts while held.
///
/// Required for state touched from both foreground code and interrupt
/// handlers: the interrupt is the only preemption source, so masking it
/// for the critical section is the whole locking discipline.
pub struct IrqMutex<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: IrqMutex provides exclusive access through atomic locking with
// interrupts disabled, making it safe to share across contexts.
unsafe impl<T: Send> Send for IrqMutex<T> {}
unsafe impl<T: Send> Sync for IrqMutex<T> {}

pub struct IrqMutexGuard<'a, T> {
    mutex: &'a IrqMutex<T>,
    saved_flags: u32,
}

impl<T> IrqMutex<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    #[inline]
    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let saved_flags = cpu::read_eflags();
        cpu::disable_interrupts();

        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }

        IrqMutexGuard {
            mutex: self,
            saved_flags,
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<IrqMutexGuard<'_, T>> {
        let saved_flags = cpu::read_eflags();
        cpu::disable_interrupts();

        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqMutexGuard {
                mutex: self,
                saved_flags,
            })
        } else {
            if saved_flags & cpu::EFLAGS_IF != 0 {
                cpu::enable_interrupts();
            }
            None
        }
    }
}

impl<'a, T> Deref for IrqMutexGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for IrqMutexGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for IrqMutexGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.lock.store(false, Ordering::Release);
        if self.saved_flags & cpu::EFLAGS_IF != 0 {
            cpu::enable_interrupts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The hosted interrupt flag is process-global; keep these tests from
    // toggling it under each other.
    static FLAG_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn irq_mutex_basic_lock_and_raii() {
        let _serial = FLAG_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let m = IrqMutex::new(0u32);

        {
            let mut g = m.lock();
            *g = 41;
        }

        {
            let mut g = m.lock();
            *g += 1;
            assert_eq!(*g, 42);
        }
    }

    #[test]
    fn irq_mutex_try_lock_semantics() {
        let _serial = FLAG_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let m = IrqMutex::new(1u8);

        let g1 = m.try_lock();
        assert!(g1.is_some());

        let g2 = m.try_lock();
        assert!(g2.is_none());

        drop(g1);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn irq_mutex_restores_interrupt_flag() {
        let _serial = FLAG_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        cpu::enable_interrupts();
        let m = IrqMutex::new(());
        {
            let _g = m.lock();
            assert!(!cpu::interrupts_enabled());
        }
        assert!(cpu::interrupts_enabled());
    }
}
