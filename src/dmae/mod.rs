//! DMA command engine (DMAE)
//!
//! Moves data between host memory and device (GRC) space through a small,
//! fixed set of hardware command slots.
//!
//! - [`command`]: command encoding and `submit`
//! - [`context`]: single and split transfers through a context's scratch buffer
//! - [`sgl`]: chained register-range reads triggered as one sequence
//!
//! Each transfer category owns one [`DmaeContext`] behind a `spin::Mutex`.
//! The lock is held across submit and completion polling so a slot is never
//! reprogrammed while a command is in flight. The SGL loader and executer
//! slots share one [`DmaeSgl`] behind a lock of their own.

pub mod command;
pub mod context;
pub mod sgl;

use crate::driver::chip::ChipProfile;
use crate::driver::config::EngineConfig;
use crate::driver::error::Result;
use crate::hal::DmaMemory;

pub use command::{Completion, DmaeCommand, Endianness, Opcode, Space, submit};
pub use context::{DmaDest, DmaSource, DmaeContext, TransferOptions};
pub use sgl::{DmaeSgl, SglEntry};

// =============================================================================
// Polling
// =============================================================================

/// Result of one non-blocking completion check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Poll {
    /// The operation completed
    Ready,
    /// Not yet; budget remains
    Pending,
    /// Budget exhausted without completion
    TimedOut,
}

/// Attempt budget for a completion wait.
///
/// Each [`tick`](Self::tick) consumes one attempt; the caller decides what
/// happens between attempts (spin, delay, yield).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollBudget {
    remaining: u32,
}

impl PollBudget {
    /// Budget of exactly `attempts` checks
    #[must_use]
    pub const fn attempts(attempts: u32) -> Self {
        Self {
            remaining: attempts,
        }
    }

    /// Budget covering `timeout_us` at `interval_us` per attempt, scaled by
    /// the chip clock factor. Always at least one attempt.
    #[must_use]
    pub const fn from_timeout(timeout_us: u32, interval_us: u32, clock_factor: u32) -> Self {
        let interval = if interval_us == 0 { 1 } else { interval_us };
        let n = timeout_us.saturating_mul(clock_factor) / interval;
        Self::attempts(if n == 0 { 1 } else { n })
    }

    /// Attempts left
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Classify one check: `done` wins, then an exhausted budget times out
    pub fn tick(&mut self, done: bool) -> Poll {
        if done {
            Poll::Ready
        } else if self.remaining == 0 {
            Poll::TimedOut
        } else {
            self.remaining -= 1;
            Poll::Pending
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Transfer category. Each owns one context, slot and lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaeCategory {
    /// General register/memory moves (slow path, init)
    Misc,
    /// Statistics collection
    Stats,
}

/// The per-category DMA contexts and the SGL chain.
pub struct DmaeEngine {
    misc: spin::Mutex<DmaeContext>,
    stats: spin::Mutex<DmaeContext>,
    sgl: spin::Mutex<DmaeSgl>,
}

impl DmaeEngine {
    /// Allocate both contexts and the SGL command array.
    ///
    /// # Errors
    ///
    /// - `Config(OutOfMemory)` when a scratch buffer or the command array
    ///   cannot be allocated.
    /// - `Dma(InvalidParameter)` when the SGL slots are out of range.
    pub fn new<M: DmaMemory, C: ChipProfile>(
        mem: &M,
        chip: &C,
        config: &EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            misc: spin::Mutex::new(DmaeContext::new(mem, chip, config, config.dmae_misc_slot)?),
            stats: spin::Mutex::new(DmaeContext::new(mem, chip, config, config.dmae_stats_slot)?),
            sgl: spin::Mutex::new(DmaeSgl::new(mem, chip, config)?),
        })
    }

    /// Take the category lock. Hold the guard for the whole transfer.
    pub fn lock(&self, category: DmaeCategory) -> spin::MutexGuard<'_, DmaeContext> {
        match category {
            DmaeCategory::Misc => self.misc.lock(),
            DmaeCategory::Stats => self.stats.lock(),
        }
    }

    /// Take the category lock if it is free
    pub fn try_lock(&self, category: DmaeCategory) -> Option<spin::MutexGuard<'_, DmaeContext>> {
        match category {
            DmaeCategory::Misc => self.misc.try_lock(),
            DmaeCategory::Stats => self.stats.try_lock(),
        }
    }

    /// Take the SGL lock. Hold the guard from `setup` until the chain
    /// completes.
    pub fn lock_sgl(&self) -> spin::MutexGuard<'_, DmaeSgl> {
        self.sgl.lock()
    }

    /// Take the SGL lock if it is free
    pub fn try_lock_sgl(&self) -> Option<spin::MutexGuard<'_, DmaeSgl>> {
        self.sgl.try_lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::chip::{Chip, ChipFamily};
    use crate::test_utils::MockMemory;

    #[test]
    fn budget_counts_down_then_times_out() {
        let mut budget = PollBudget::attempts(2);
        assert_eq!(budget.tick(false), Poll::Pending);
        assert_eq!(budget.tick(false), Poll::Pending);
        assert_eq!(budget.tick(false), Poll::TimedOut);
        assert_eq!(budget.tick(true), Poll::Ready);
    }

    #[test]
    fn budget_scales_with_clock_factor() {
        assert_eq!(PollBudget::from_timeout(200_000, 50, 1).remaining(), 4000);
        assert_eq!(PollBudget::from_timeout(200_000, 50, 100).remaining(), 400_000);
        assert_eq!(PollBudget::from_timeout(10, 50, 1).remaining(), 1);
    }

    #[test]
    fn categories_lock_independently() {
        let mem = MockMemory::new();
        let engine =
            DmaeEngine::new(&mem, &Chip::new(ChipFamily::E2), &EngineConfig::new()).unwrap();
        let misc = engine.lock(DmaeCategory::Misc);
        assert!(engine.try_lock(DmaeCategory::Misc).is_none());
        assert!(engine.try_lock(DmaeCategory::Stats).is_some());
        assert_eq!(misc.slot(), 0);
        drop(misc);
        assert_eq!(engine.lock(DmaeCategory::Stats).slot(), 1);
    }

    #[test]
    fn sgl_chain_is_shared_and_exclusive() {
        let mem = MockMemory::new();
        let engine =
            DmaeEngine::new(&mem, &Chip::new(ChipFamily::E2), &EngineConfig::new()).unwrap();
        let allocated = mem.allocations();

        let sgl = engine.lock_sgl();
        assert!(engine.try_lock_sgl().is_none());
        assert!(engine.try_lock(DmaeCategory::Misc).is_some());
        drop(sgl);

        for _ in 0..3 {
            let mut sgl = engine.try_lock_sgl().unwrap();
            sgl.setup(&[SglEntry { grc_addr: 0x1000, len32: 4 }]).unwrap();
        }
        assert_eq!(mem.allocations(), allocated);
    }
}
