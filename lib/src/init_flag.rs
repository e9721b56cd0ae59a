use core::sync::atomic::{AtomicBool, Ordering};

/// One-way initialization marker for subsystems with an explicit init step.
pub struct InitFlag {
    set: AtomicBool,
}

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn mark_set(&self) {
        self.set.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set_relaxed(&self) -> bool {
        self.set.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset(&self) {
        self.set.store(false, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
