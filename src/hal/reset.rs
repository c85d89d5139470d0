//! Device reset signalling
//!
//! While the device is being reset (recovery, teardown), DMA completions are
//! never going to arrive. Busy-wait loops query [`ResetStatus`] on every
//! iteration and treat a reset as a benign early exit instead of a timeout.

use core::sync::atomic::{AtomicBool, Ordering};

/// Query for a concurrent device reset.
pub trait ResetStatus {
    /// True while a device reset is in progress
    fn reset_in_progress(&self) -> bool;
}

impl<T: ResetStatus + ?Sized> ResetStatus for &T {
    #[inline(always)]
    fn reset_in_progress(&self) -> bool {
        (**self).reset_in_progress()
    }
}

// =============================================================================
// Reset Flag
// =============================================================================

/// Atomic reset indicator shared between the recovery path and the engine.
///
/// # Example
///
/// ```ignore
/// static RESET: ResetFlag = ResetFlag::new();
///
/// // recovery thread
/// RESET.begin();
/// /* ... reinitialize ... */
/// RESET.end();
/// ```
#[derive(Debug, Default)]
pub struct ResetFlag {
    active: AtomicBool,
}

impl ResetFlag {
    /// Create a cleared flag (const, suitable for statics)
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// Mark a reset as started
    pub fn begin(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Mark the reset as finished
    pub fn end(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl ResetStatus for ResetFlag {
    #[inline(always)]
    fn reset_in_progress(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
