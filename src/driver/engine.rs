//! Engine facade
//!
//! [`Engine`] owns everything one physical function needs: the platform
//! handle, one [`TxQueue`] per transmit queue, the DMA contexts and the
//! device-wide doorbell gate. It is the only place where those pieces meet.
//!
//! # Locking
//!
//! Each transmit queue, each DMA category and the SGL chain sits behind its
//! own `spin::Mutex`, so `&Engine` can be shared between the contexts that
//! send, reclaim and collect statistics. Queues never share a lock.
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(platform, EngineConfig::new().with_tx_queues(4))?;
//!
//! let pkt = TxPacket::new(1)
//!     .with_fragment(hdr_addr, 54)
//!     .with_fragment(payload_addr, 1400)
//!     .with_checksum(20, 20, false);
//! match engine.send(0, pkt, &mut delay) {
//!     Ok(receipt) => { /* queued */ }
//!     Err(rejected) if rejected.error.is_resource() => { /* retry later */ }
//!     Err(rejected) => { /* drop rejected.packet */ }
//! }
//!
//! // on a status block update
//! for done in engine.get_completed(0)? {
//!     /* release done */
//! }
//! ```

use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::dmae::{
    DmaDest, DmaSource, DmaeCategory, DmaeContext, DmaeEngine, DmaeSgl, SglEntry,
    TransferOptions,
};
use crate::driver::chip::Chip;
use crate::driver::config::EngineConfig;
use crate::driver::error::{ConfigError, DmaError, Result, TxError, TxRejected};
use crate::hal::Platform;
use crate::tx::{DoorbellGate, TxPacket, TxQueue, TxReceipt};

/// Host-side DMA and transmit engine for one physical function.
pub struct Engine<P: Platform> {
    platform: P,
    config: EngineConfig,
    gate: DoorbellGate,
    queues: Vec<spin::Mutex<TxQueue>>,
    dmae: DmaeEngine,
}

impl<P: Platform> Engine<P> {
    /// Validate `config` and allocate every ring, pool and DMA context.
    ///
    /// # Errors
    ///
    /// `Config(InvalidConfig)` for an inconsistent configuration,
    /// `Config(OutOfMemory)` when the platform runs out of DMA memory.
    pub fn new(platform: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let chip = config.chip;
        let mut queues = Vec::with_capacity(usize::from(config.tx_queues));
        for id in 0..config.tx_queues {
            queues.push(spin::Mutex::new(TxQueue::new(&platform, &chip, &config, id)?));
        }
        let dmae = DmaeEngine::new(&platform, &chip, &config)?;
        let gate = DoorbellGate::new(&chip, &config);
        Ok(Self {
            platform,
            config,
            gate,
            queues,
            dmae,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The platform handle
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// Active configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adapter generation and revision
    pub const fn chip(&self) -> Chip {
        self.config.chip
    }

    /// Number of transmit queues
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// The shared doorbell gate
    pub const fn doorbell_gate(&self) -> &DoorbellGate {
        &self.gate
    }

    /// Lock transmit queue `ring_id`
    pub fn queue(&self, ring_id: u8) -> Option<spin::MutexGuard<'_, TxQueue>> {
        self.queues.get(usize::from(ring_id)).map(|q| q.lock())
    }

    /// Lock DMA category `category`. Hold the guard for the whole transfer.
    pub fn dmae(&self, category: DmaeCategory) -> spin::MutexGuard<'_, DmaeContext> {
        self.dmae.lock(category)
    }

    // =========================================================================
    // Transmit
    // =========================================================================

    /// Queue `packet` on transmit queue `ring_id`.
    ///
    /// # Errors
    ///
    /// See [`TxQueue::send`]; an unknown `ring_id` yields `InvalidQueue`.
    pub fn send<D: DelayNs>(
        &self,
        ring_id: u8,
        packet: TxPacket,
        delay: &mut D,
    ) -> core::result::Result<TxReceipt, TxRejected> {
        let Some(mut queue) = self.queue(ring_id) else {
            return Err(TxRejected::new(TxError::InvalidQueue, packet));
        };
        queue.send(&self.platform, &self.gate, packet, delay)
    }

    /// Packets the device finished on `ring_id`, oldest first.
    ///
    /// The consumer index is re-read from the status block after every
    /// packet.
    ///
    /// # Errors
    ///
    /// `Config(InvalidQueue)` for an unknown `ring_id`.
    ///
    /// # Panics
    ///
    /// When the device reports completions that were never sent.
    pub fn get_completed(&self, ring_id: u8) -> Result<Vec<TxPacket>> {
        let mut queue = self.queue(ring_id).ok_or(ConfigError::InvalidQueue)?;
        let mut sent = Vec::new();
        queue.reclaim(|| self.platform.tx_consumer(ring_id), &mut sent);
        Ok(sent)
    }

    // =========================================================================
    // DMA
    // =========================================================================

    /// Read `dst.len()` bytes of device space starting at `grc_addr`.
    ///
    /// # Errors
    ///
    /// `Dma(InvalidParameter)` for a length that is not a whole number of
    /// dwords, otherwise the first failing chunk's error.
    pub fn read_dmae<D: DelayNs>(
        &self,
        category: DmaeCategory,
        grc_addr: u32,
        dst: &mut [u8],
        delay: &mut D,
    ) -> Result<()> {
        let len32 = dword_len(dst.len())?;
        let mut ctx = self.dmae.lock(category);
        ctx.transfer_split(
            &self.platform,
            delay,
            DmaSource::Grc(grc_addr),
            DmaDest::Host(dst),
            len32,
            TransferOptions::default(),
        )?;
        Ok(())
    }

    /// Write `src` into device space starting at `grc_addr`.
    ///
    /// # Errors
    ///
    /// `Dma(InvalidParameter)` for a length that is not a whole number of
    /// dwords, otherwise the first failing chunk's error.
    pub fn write_dmae<D: DelayNs>(
        &self,
        category: DmaeCategory,
        src: &[u8],
        grc_addr: u32,
        delay: &mut D,
    ) -> Result<()> {
        let len32 = dword_len(src.len())?;
        let mut ctx = self.dmae.lock(category);
        ctx.transfer_split(
            &self.platform,
            delay,
            DmaSource::Host(src),
            DmaDest::Grc(grc_addr),
            len32,
            TransferOptions::default(),
        )?;
        Ok(())
    }

    /// Lock the SGL chain and load `entries` into it. The chain stays
    /// exclusive until the guard drops.
    ///
    /// # Errors
    ///
    /// `Dma(InvalidParameter)` for bad entries.
    pub fn sgl(&self, entries: &[SglEntry]) -> Result<spin::MutexGuard<'_, DmaeSgl>> {
        let mut sgl = self.dmae.lock_sgl();
        sgl.setup(entries)?;
        Ok(sgl)
    }
}

fn dword_len(bytes: usize) -> Result<u32> {
    if bytes == 0 || !bytes.is_multiple_of(4) {
        return Err(DmaError::InvalidParameter.into());
    }
    Ok((bytes / 4) as u32)
}
