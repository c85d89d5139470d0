//! Doorbell rate limiting
//!
//! FPGA and emulation platforms drop doorbells when too many are queued.
//! The gate hands out a budget of doorbells; when it runs dry the caller
//! waits for the device's doorbell queue to drain below a low-water mark
//! before the budget is refilled. Production silicon writes straight through.

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;
#[cfg(feature = "log")]
use log::warn;

use crate::driver::chip::{Block, ChipProfile};
use crate::driver::config::EngineConfig;
use crate::hal::RegisterSpace;
use crate::internal::constants::DOORBELL_GATE_MAX_POLLS;
use crate::internal::register::doorbell;

/// Device-global doorbell gate, shared by every transmit queue.
#[derive(Debug)]
pub struct DoorbellGate {
    enabled: bool,
    budget: AtomicU32,
    refill: u32,
    low_water: u32,
    depth_reg: u32,
}

impl DoorbellGate {
    /// Gate for `chip`, sized from the configuration
    pub fn new<C: ChipProfile>(chip: &C, config: &EngineConfig) -> Self {
        Self {
            enabled: chip.doorbell_workaround(),
            budget: AtomicU32::new(config.doorbell_budget),
            refill: config.doorbell_budget,
            low_water: config.doorbell_low_water,
            depth_reg: chip.register_base(Block::Doorbell) + doorbell::QUEUE_DEPTH,
        }
    }

    /// True when doorbells are rate limited
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Doorbells left before the next drain wait
    #[must_use]
    pub fn budget(&self) -> u32 {
        self.budget.load(Ordering::Acquire)
    }

    /// Write `value` to the doorbell at `offset`, waiting for budget first.
    pub fn ring<R: RegisterSpace + ?Sized, D: DelayNs>(
        &self,
        regs: &R,
        delay: &mut D,
        offset: u32,
        value: u32,
    ) {
        if self.enabled {
            while !self.take() {
                self.drain(regs, delay);
            }
        }
        regs.write32(offset, value);
    }

    fn take(&self) -> bool {
        self.budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| b.checked_sub(1))
            .is_ok()
    }

    fn drain<R: RegisterSpace + ?Sized, D: DelayNs>(&self, regs: &R, delay: &mut D) {
        let mut polls = 0;
        while regs.read32(self.depth_reg) >= self.low_water {
            if polls == DOORBELL_GATE_MAX_POLLS {
                #[cfg(feature = "log")]
                warn!("doorbell queue did not drain, refilling anyway");
                break;
            }
            delay.delay_us(1);
            polls += 1;
        }
        // another caller may have refilled meanwhile
        let _ = self
            .budget
            .compare_exchange(0, self.refill, Ordering::AcqRel, Ordering::Acquire);
    }
}
