//! DMA transfer contexts
//!
//! A context binds one command slot to a DMA-visible scratch buffer:
//!
//! ```text
//! offset 0   completion word (written by the engine)
//! offset 8   staging area, `max_len32` dwords
//! ```
//!
//! Host-memory endpoints are staged through the scratch buffer, so the
//! engine only ever sees bus addresses. Transfers block: the completion word
//! is polled with a bounded attempt budget and a short delay in between.

use embedded_hal::delay::DelayNs;

#[cfg(feature = "log")]
use log::warn;

use super::command::{DmaeCommand, Endianness, Opcode, Space, submit};
use super::{Poll, PollBudget};
use crate::driver::chip::{Block, ChipProfile, TransferDir};
use crate::driver::config::EngineConfig;
use crate::driver::error::{ConfigError, ConfigResult, DmaError, DmaResult};
use crate::hal::{DmaMemory, DmaRegion, RegisterSpace, ResetStatus};
use crate::internal::constants::{DMAE_COMP_WORD_SIZE, DMAE_COMPLETION_VAL, DMAE_PCI_ERR_FLAG};

/// Scratch buffer alignment
const SCRATCH_ALIGN: usize = 64;

// =============================================================================
// Endpoints
// =============================================================================

/// Where a transfer reads from
#[derive(Debug, Clone, Copy)]
pub enum DmaSource<'a> {
    /// Device space, byte address
    Grc(u32),
    /// Host memory already visible to the device, bus address
    Pci(u64),
    /// Host memory staged through the scratch buffer
    Host(&'a [u8]),
}

/// Where a transfer writes to
#[derive(Debug)]
pub enum DmaDest<'a> {
    /// Device space, byte address
    Grc(u32),
    /// Host memory already visible to the device, bus address
    Pci(u64),
    /// Host memory, copied back from the scratch buffer after completion
    Host(&'a mut [u8]),
}

fn grc_offset(addr: u32, bytes: usize) -> Option<u32> {
    u32::try_from(bytes).ok().and_then(|b| addr.checked_add(b))
}

fn pci_offset(addr: u64, bytes: usize) -> Option<u64> {
    addr.checked_add(bytes as u64)
}

impl<'a> DmaSource<'a> {
    fn advance(self, bytes: usize) -> Option<Self> {
        match self {
            Self::Grc(a) => grc_offset(a, bytes).map(Self::Grc),
            Self::Pci(a) => pci_offset(a, bytes).map(Self::Pci),
            Self::Host(buf) => buf.get(bytes..).map(Self::Host),
        }
    }

    fn can_reach(&self, bytes: usize) -> bool {
        match *self {
            Self::Grc(a) => grc_offset(a, bytes).is_some(),
            Self::Pci(a) => pci_offset(a, bytes).is_some(),
            Self::Host(_) => true,
        }
    }

    fn is_host(&self) -> bool {
        matches!(self, Self::Host(_))
    }
}

impl<'a> DmaDest<'a> {
    fn reborrow(&mut self) -> DmaDest<'_> {
        match self {
            Self::Grc(a) => DmaDest::Grc(*a),
            Self::Pci(a) => DmaDest::Pci(*a),
            Self::Host(buf) => DmaDest::Host(&mut **buf),
        }
    }

    fn advance(self, bytes: usize) -> Option<Self> {
        match self {
            Self::Grc(a) => grc_offset(a, bytes).map(Self::Grc),
            Self::Pci(a) => pci_offset(a, bytes).map(Self::Pci),
            Self::Host(buf) => buf.get_mut(bytes..).map(Self::Host),
        }
    }

    fn can_reach(&self, bytes: usize) -> bool {
        match *self {
            Self::Grc(a) => grc_offset(a, bytes).is_some(),
            Self::Pci(a) => pci_offset(a, bytes).is_some(),
            Self::Host(_) => true,
        }
    }

    fn dir(&self) -> TransferDir {
        match self {
            Self::Grc(_) => TransferDir::FromHost,
            Self::Pci(_) | Self::Host(_) => TransferDir::ToHost,
        }
    }
}

/// Per-transfer options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferOptions {
    /// Byte-order transformation performed by the engine
    pub endianness: Endianness,
    /// Byte-swap every dword of a host source while staging it
    pub swap_on_stage: bool,
}

impl TransferOptions {
    /// Options with the given engine endianness
    #[must_use]
    pub const fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Byte-swap host data while staging
    #[must_use]
    pub const fn with_swap_on_stage(mut self, swap: bool) -> Self {
        self.swap_on_stage = swap;
        self
    }
}

/// How a completion wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Completed,
    ResetEscape,
}

// =============================================================================
// Context
// =============================================================================

/// One command slot plus its scratch buffer.
pub struct DmaeContext {
    slot: u8,
    scratch: DmaRegion,
    max_len32: u32,
    read_max: u32,
    write_max: u32,
    dmae_base: u32,
    clock_factor: u32,
    timeout_us: u32,
    poll_interval_us: u32,
    port: u8,
    vn: u8,
    transfers: u32,
}

impl DmaeContext {
    /// Allocate a context for `slot`.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` when the scratch buffer cannot be allocated.
    pub fn new<M: DmaMemory, C: ChipProfile>(
        mem: &M,
        chip: &C,
        config: &EngineConfig,
        slot: u8,
    ) -> ConfigResult<Self> {
        let bytes = DMAE_COMP_WORD_SIZE + config.dmae_scratch_len32 as usize * 4;
        let scratch = mem
            .alloc_dma(bytes, SCRATCH_ALIGN)
            .ok_or(ConfigError::OutOfMemory)?;
        Ok(Self {
            slot,
            scratch,
            max_len32: config.dmae_scratch_len32,
            read_max: chip.max_transfer_len32(TransferDir::ToHost),
            write_max: chip.max_transfer_len32(TransferDir::FromHost),
            dmae_base: chip.register_base(Block::Dmae),
            clock_factor: chip.clock_factor(),
            timeout_us: config.dmae_timeout_us,
            poll_interval_us: config.dmae_poll_interval_us,
            port: config.port,
            vn: config.vn,
            transfers: 0,
        })
    }

    /// Command slot owned by this context
    #[must_use]
    pub const fn slot(&self) -> u8 {
        self.slot
    }

    /// Bus address of the completion word
    #[must_use]
    pub fn completion_addr(&self) -> u64 {
        self.scratch.device_addr()
    }

    /// Commands submitted through this context so far
    #[must_use]
    pub const fn transfers(&self) -> u32 {
        self.transfers
    }

    /// Largest single command for `dir`, in dwords
    #[must_use]
    pub fn max_len32(&self, dir: TransferDir) -> u32 {
        let chip_max = match dir {
            TransferDir::ToHost => self.read_max,
            TransferDir::FromHost => self.write_max,
        };
        chip_max.min(self.max_len32)
    }

    /// Move `len32` dwords from `src` to `dst` with a single command.
    ///
    /// Blocks until the completion word shows up, the attempt budget runs out,
    /// or a device reset is reported. A reset ends the wait as success; a
    /// host destination is left untouched in that case.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter`: zero or oversized length, host-to-host, a host
    ///   buffer shorter than the transfer, or a zero address.
    /// - `Timeout`: no completion within the budget.
    /// - `PciError`: the engine flagged a PCI failure.
    pub fn transfer<P, D>(
        &mut self,
        platform: &P,
        delay: &mut D,
        src: DmaSource<'_>,
        dst: DmaDest<'_>,
        len32: u32,
        opts: TransferOptions,
    ) -> DmaResult<()>
    where
        P: RegisterSpace + DmaMemory + ResetStatus,
        D: DelayNs,
    {
        let bytes = len32 as usize * 4;
        if len32 == 0 || len32 > self.max_len32(dst.dir()) {
            return Err(DmaError::InvalidParameter);
        }
        if src.is_host() && matches!(dst, DmaDest::Host(_)) {
            return Err(DmaError::InvalidParameter);
        }

        let staging = self.scratch.device_addr() + DMAE_COMP_WORD_SIZE as u64;
        let src_end = match src {
            DmaSource::Grc(a) => (Space::Grc, u64::from(a)),
            DmaSource::Pci(a) => (Space::Pci, a),
            DmaSource::Host(buf) => {
                let data = buf.get(..bytes).ok_or(DmaError::InvalidParameter)?;
                self.stage(data, opts.swap_on_stage);
                (Space::Pci, staging)
            }
        };
        let (dst_end, copy_back) = match dst {
            DmaDest::Grc(a) => ((Space::Grc, u64::from(a)), None),
            DmaDest::Pci(a) => ((Space::Pci, a), None),
            DmaDest::Host(buf) => {
                let out = buf.get_mut(..bytes).ok_or(DmaError::InvalidParameter)?;
                ((Space::Pci, staging), Some(out))
            }
        };

        let op = Opcode::new(src_end.0, dst_end.0)
            .with_function(self.port, self.vn)
            .with_endianness(opts.endianness);
        let cmd = DmaeCommand::new(op, src_end, dst_end, len32 as u16)
            .with_host_completion(self.completion_addr());

        self.scratch.write_u32(0, 0);
        platform.barrier();
        submit(platform, self.dmae_base, self.slot, &cmd)?;
        self.transfers = self.transfers.wrapping_add(1);

        match self.wait(platform, delay, opts.endianness)? {
            WaitOutcome::Completed => {
                if let Some(out) = copy_back {
                    self.scratch.read_bytes(DMAE_COMP_WORD_SIZE, out);
                }
            }
            WaitOutcome::ResetEscape => {}
        }
        Ok(())
    }

    /// Like [`transfer`](Self::transfer) for any length: issues
    /// `ceil(len32 / max)` commands, advancing both endpoints by each chunk.
    ///
    /// Callers hold the category lock for the whole call.
    ///
    /// # Errors
    ///
    /// The first error of any chunk; later chunks are not issued.
    pub fn transfer_split<P, D>(
        &mut self,
        platform: &P,
        delay: &mut D,
        src: DmaSource<'_>,
        dst: DmaDest<'_>,
        len32: u32,
        opts: TransferOptions,
    ) -> DmaResult<()>
    where
        P: RegisterSpace + DmaMemory + ResetStatus,
        D: DelayNs,
    {
        let max = self.max_len32(dst.dir());
        if len32 == 0 || max == 0 {
            return Err(DmaError::InvalidParameter);
        }
        // the last dword must be addressable on both ends
        let last = (len32 as usize - 1) * 4;
        if !src.can_reach(last) || !dst.can_reach(last) {
            return Err(DmaError::InvalidParameter);
        }
        let (mut src, mut dst) = (src, dst);
        let mut remaining = len32;
        loop {
            let chunk = remaining.min(max);
            self.transfer(platform, delay, src, dst.reborrow(), chunk, opts)?;
            remaining -= chunk;
            if remaining == 0 {
                return Ok(());
            }
            let step = chunk as usize * 4;
            src = src.advance(step).ok_or(DmaError::InvalidParameter)?;
            dst = dst.advance(step).ok_or(DmaError::InvalidParameter)?;
        }
    }

    fn stage(&self, data: &[u8], swap: bool) {
        if swap {
            for (i, chunk) in data.chunks_exact(4).enumerate() {
                let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                self.scratch
                    .write_bytes(DMAE_COMP_WORD_SIZE + i * 4, &word.to_le_bytes());
            }
        } else {
            self.scratch.write_bytes(DMAE_COMP_WORD_SIZE, data);
        }
    }

    fn wait<R, D>(
        &self,
        reset: &R,
        delay: &mut D,
        endianness: Endianness,
    ) -> DmaResult<WaitOutcome>
    where
        R: ResetStatus,
        D: DelayNs,
    {
        let desired = endianness.completion_value(DMAE_COMPLETION_VAL);
        let err_flag = endianness.completion_value(DMAE_PCI_ERR_FLAG);
        let mut budget =
            PollBudget::from_timeout(self.timeout_us, self.poll_interval_us, self.clock_factor);

        loop {
            let word = self.scratch.read_u32(0);
            if word != desired && (word & !err_flag) == (desired & !err_flag) {
                #[cfg(feature = "log")]
                warn!("DMAE slot {} completed with PCI error", self.slot);
                return Err(DmaError::PciError);
            }
            match budget.tick(word == desired) {
                Poll::Ready => return Ok(WaitOutcome::Completed),
                Poll::TimedOut => {
                    #[cfg(feature = "log")]
                    warn!("DMAE slot {} timeout, completion word {:#010x}", self.slot, word);
                    return Err(DmaError::Timeout);
                }
                Poll::Pending => {}
            }
            if reset.reset_in_progress() {
                #[cfg(feature = "log")]
                warn!("DMAE slot {} wait abandoned: device reset in progress", self.slot);
                return Ok(WaitOutcome::ResetEscape);
            }
            delay.delay_us(self.poll_interval_us);
        }
    }
}
