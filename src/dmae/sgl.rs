//! Chained register-range reads (SGL)
//!
//! A loader command copies executer commands, one at a time, from a host
//! array into the executer slot's command memory and starts it. Every
//! executer but the last completes by re-triggering the loader; because the
//! loader keeps its source cursor (no source reset), the next trigger fetches
//! the next executer. The last executer writes `DMAE_SGL_COMPLETION_VAL` into
//! a host completion word instead.
//!
//! ```text
//! host array: [comp word][exec 0][exec 1]...[exec n-1]
//!                  ^         |       |            |
//!                  |     go(loader) go(loader)    |
//!                  +------------------------------+
//! ```

use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;

#[cfg(feature = "log")]
use log::warn;

use super::command::{Completion, DmaeCommand, Opcode, Space, submit};
use super::{Poll, PollBudget};
use crate::driver::chip::{Block, ChipProfile};
use crate::driver::config::EngineConfig;
use crate::driver::error::{ConfigError, DmaError, DmaResult, Result};
use crate::hal::{DmaMemory, DmaRegion, RegisterSpace, ResetStatus};
use crate::internal::constants::{
    DMAE_CMD_DWORDS, DMAE_COMP_WORD_SIZE, DMAE_SGL_COMPLETION_VAL, DMAE_SGL_MAX_COMMANDS,
};
use crate::internal::register::{dmae_cmd_mem, dmae_go, is_valid_slot};

const CMD_BYTES: usize = DMAE_CMD_DWORDS * 4;

/// One register range to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SglEntry {
    /// GRC byte address of the first register
    pub grc_addr: u32,
    /// Dwords to read
    pub len32: u16,
}

/// A built SGL chain.
pub struct DmaeSgl {
    loader_slot: u8,
    exec_slot: u8,
    dmae_base: u32,
    port: u8,
    vn: u8,
    clock_factor: u32,
    timeout_us: u32,
    poll_interval_us: u32,
    entries: Vec<SglEntry>,
    host: DmaRegion,
    armed: bool,
}

impl DmaeSgl {
    /// Allocate the host command array for up to `DMAE_SGL_MAX_COMMANDS`
    /// executers. The loader uses `config.dmae_sgl_slot`, the executer the
    /// slot after it.
    ///
    /// # Errors
    ///
    /// - `DmaError::InvalidParameter` when either slot is out of range.
    /// - `ConfigError::OutOfMemory` when the command array cannot be
    ///   allocated.
    pub fn new<M: DmaMemory, C: ChipProfile>(
        mem: &M,
        chip: &C,
        config: &EngineConfig,
    ) -> Result<Self> {
        let loader_slot = config.dmae_sgl_slot;
        let exec_slot = loader_slot.wrapping_add(1);
        if !is_valid_slot(loader_slot) || !is_valid_slot(exec_slot) {
            return Err(DmaError::InvalidParameter.into());
        }
        let host = mem
            .alloc_dma(DMAE_COMP_WORD_SIZE + DMAE_SGL_MAX_COMMANDS * CMD_BYTES, 64)
            .ok_or(ConfigError::OutOfMemory)?;
        Ok(Self {
            loader_slot,
            exec_slot,
            dmae_base: chip.register_base(Block::Dmae),
            port: config.port,
            vn: config.vn,
            clock_factor: chip.clock_factor(),
            timeout_us: config.dmae_timeout_us,
            poll_interval_us: config.dmae_poll_interval_us,
            entries: Vec::new(),
            host,
            armed: false,
        })
    }

    /// Define the register ranges read by the chain.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for an empty list, more than
    /// `DMAE_SGL_MAX_COMMANDS` entries, or an entry with a zero address or
    /// length.
    pub fn setup(&mut self, entries: &[SglEntry]) -> DmaResult<()> {
        if entries.is_empty()
            || entries.len() > DMAE_SGL_MAX_COMMANDS
            || entries.iter().any(|e| e.grc_addr == 0 || e.len32 == 0)
        {
            return Err(DmaError::InvalidParameter);
        }
        self.entries.clear();
        self.entries.extend_from_slice(entries);
        self.armed = false;
        Ok(())
    }

    /// Total bytes one run writes into host memory
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| usize::from(e.len32) * 4).sum()
    }

    /// Executer commands in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True before `setup`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill in the per-run destination: entry `i` lands right after entry
    /// `i - 1` starting at bus address `dst_base`. Clears the completion word.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` before `setup` or for a zero destination.
    pub fn arm(&mut self, dst_base: u64) -> DmaResult<()> {
        if self.entries.is_empty() || dst_base == 0 {
            return Err(DmaError::InvalidParameter);
        }
        let last = self.entries.len() - 1;
        let mut dst = dst_base;
        for (i, entry) in self.entries.iter().enumerate() {
            let op = Opcode::new(Space::Grc, Space::Pci).with_function(self.port, self.vn);
            let completion = if i == last {
                Completion::Pci {
                    addr: self.host.device_addr(),
                    value: DMAE_SGL_COMPLETION_VAL,
                }
            } else {
                Completion::Grc {
                    addr: self.dmae_base + dmae_go(self.loader_slot),
                    value: 1,
                }
            };
            let cmd = DmaeCommand::new(
                op,
                (Space::Grc, u64::from(entry.grc_addr)),
                (Space::Pci, dst),
                entry.len32,
            )
            .with_completion(completion);
            let base = DMAE_COMP_WORD_SIZE + i * CMD_BYTES;
            for (w, word) in cmd.to_words().iter().enumerate() {
                self.host.write_u32(base + w * 4, *word);
            }
            dst += u64::from(entry.len32) * 4;
        }
        self.host.write_u32(0, 0);
        self.armed = true;
        Ok(())
    }

    /// The loader command: host array → executer command memory, then go
    fn loader(&self) -> DmaeCommand {
        let op = Opcode::new(Space::Pci, Space::Grc)
            .with_function(self.port, self.vn)
            .without_src_reset();
        DmaeCommand::new(
            op,
            (
                Space::Pci,
                self.host.device_addr() + DMAE_COMP_WORD_SIZE as u64,
            ),
            (Space::Grc, u64::from(self.dmae_base + dmae_cmd_mem(self.exec_slot))),
            DMAE_CMD_DWORDS as u16,
        )
        .with_completion(Completion::Grc {
            addr: self.dmae_base + dmae_go(self.exec_slot),
            value: 1,
        })
    }

    /// Start an armed chain. Re-submitting the loader rewinds its cursor.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the chain is not armed.
    pub fn go<R: RegisterSpace + DmaMemory>(&mut self, regs: &R) -> DmaResult<()> {
        if !self.armed {
            return Err(DmaError::InvalidParameter);
        }
        self.host.write_u32(0, 0);
        regs.barrier();
        submit(regs, self.dmae_base, self.loader_slot, &self.loader())
    }

    /// Non-blocking completion check
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.host.read_u32(0) == DMAE_SGL_COMPLETION_VAL
    }

    /// One step of a caller-driven wait
    pub fn poll(&self, budget: &mut PollBudget) -> Poll {
        budget.tick(self.is_done())
    }

    /// Attempt budget matching the configured timeout
    #[must_use]
    pub fn default_budget(&self) -> PollBudget {
        PollBudget::from_timeout(self.timeout_us, self.poll_interval_us, self.clock_factor)
    }

    /// Busy-wait for completion with the configured budget.
    ///
    /// A device reset ends the wait as success.
    ///
    /// # Errors
    ///
    /// `Timeout` when the budget runs out.
    pub fn wait<R: ResetStatus, D: DelayNs>(&self, reset: &R, delay: &mut D) -> DmaResult<()> {
        let mut budget = self.default_budget();
        loop {
            match self.poll(&mut budget) {
                Poll::Ready => return Ok(()),
                Poll::TimedOut => {
                    #[cfg(feature = "log")]
                    warn!("DMAE SGL (loader slot {}) timeout", self.loader_slot);
                    return Err(DmaError::Timeout);
                }
                Poll::Pending => {}
            }
            if reset.reset_in_progress() {
                return Ok(());
            }
            delay.delay_us(self.poll_interval_us);
        }
    }
}
