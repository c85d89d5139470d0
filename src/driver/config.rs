//! Configuration types for the NX2 engine

use crate::driver::chip::{Chip, ChipFamily};
use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::{
    DEFAULT_COALESCE_BUF_SIZE, DEFAULT_COALESCE_BUFFERS, DEFAULT_DOORBELL_BUDGET,
    DEFAULT_DOORBELL_LOW_WATER, DEFAULT_RING_PAGES, DEFAULT_SLOTS_PER_PAGE, DEFAULT_TX_QUEUES,
    DMAE_CMD_SLOTS, DMAE_POLL_INTERVAL_US, DMAE_SCRATCH_LEN32, DMAE_TIMEOUT_US, MAX_BD_BYTES,
    MAX_FETCH_BD, MAX_RING_CAPACITY, MAX_TX_QUEUES,
};

/// Complete engine configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// Adapter generation and revision
    pub chip: Chip,
    /// Number of transmit queues (one BD ring each)
    pub tx_queues: u8,
    /// Pages per BD ring
    pub ring_pages: u16,
    /// Slots per ring page, link slot included
    pub slots_per_page: u16,
    /// Coalescing buffers per queue
    pub coalesce_buffers: u16,
    /// Size of each coalescing buffer in bytes
    pub coalesce_buf_size: usize,
    /// BDs the device prefetches per packet
    pub fetch_limit: usize,
    /// DMA completion wait budget in microseconds, before the clock factor
    pub dmae_timeout_us: u32,
    /// Delay between DMA completion polls in microseconds
    pub dmae_poll_interval_us: u32,
    /// DMA scratch buffer size per context, in dwords
    pub dmae_scratch_len32: u32,
    /// Command slot used for miscellaneous transfers
    pub dmae_misc_slot: u8,
    /// Command slot used for statistics transfers
    pub dmae_stats_slot: u8,
    /// Loader slot for SGL chains (the executer uses the next slot)
    pub dmae_sgl_slot: u8,
    /// Port number encoded into DMA commands
    pub port: u8,
    /// Virtual NIC number encoded into DMA commands
    pub vn: u8,
    /// Doorbells per budget refill (slow silicon only)
    pub doorbell_budget: u32,
    /// Doorbell queue depth that allows a refill
    pub doorbell_low_water: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create a configuration with default values
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chip: Chip::new(ChipFamily::E2),
            tx_queues: DEFAULT_TX_QUEUES,
            ring_pages: DEFAULT_RING_PAGES,
            slots_per_page: DEFAULT_SLOTS_PER_PAGE,
            coalesce_buffers: DEFAULT_COALESCE_BUFFERS,
            coalesce_buf_size: DEFAULT_COALESCE_BUF_SIZE,
            fetch_limit: MAX_FETCH_BD,
            dmae_timeout_us: DMAE_TIMEOUT_US,
            dmae_poll_interval_us: DMAE_POLL_INTERVAL_US,
            dmae_scratch_len32: DMAE_SCRATCH_LEN32,
            dmae_misc_slot: 0,
            dmae_stats_slot: 1,
            dmae_sgl_slot: 2,
            port: 0,
            vn: 0,
            doorbell_budget: DEFAULT_DOORBELL_BUDGET,
            doorbell_low_water: DEFAULT_DOORBELL_LOW_WATER,
        }
    }

    /// Set the chip
    #[must_use]
    pub const fn with_chip(mut self, chip: Chip) -> Self {
        self.chip = chip;
        self
    }

    /// Set the number of transmit queues
    #[must_use]
    pub const fn with_tx_queues(mut self, queues: u8) -> Self {
        self.tx_queues = queues;
        self
    }

    /// Set the BD ring geometry
    #[must_use]
    pub const fn with_ring_geometry(mut self, pages: u16, slots_per_page: u16) -> Self {
        self.ring_pages = pages;
        self.slots_per_page = slots_per_page;
        self
    }

    /// Set the coalescing pool
    #[must_use]
    pub const fn with_coalesce_pool(mut self, buffers: u16, buf_size: usize) -> Self {
        self.coalesce_buffers = buffers;
        self.coalesce_buf_size = buf_size;
        self
    }

    /// Set the per-packet BD fetch limit
    #[must_use]
    pub const fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    /// Set the DMA completion budget and poll interval
    #[must_use]
    pub const fn with_dmae_timeout(mut self, timeout_us: u32, poll_interval_us: u32) -> Self {
        self.dmae_timeout_us = timeout_us;
        self.dmae_poll_interval_us = poll_interval_us;
        self
    }

    /// Set the DMA scratch buffer size
    #[must_use]
    pub const fn with_dmae_scratch_len32(mut self, len32: u32) -> Self {
        self.dmae_scratch_len32 = len32;
        self
    }

    /// Set the command slots for the misc, stats and SGL categories
    #[must_use]
    pub const fn with_dmae_slots(mut self, misc: u8, stats: u8, sgl: u8) -> Self {
        self.dmae_misc_slot = misc;
        self.dmae_stats_slot = stats;
        self.dmae_sgl_slot = sgl;
        self
    }

    /// Set the port and virtual NIC encoded into DMA commands
    #[must_use]
    pub const fn with_function(mut self, port: u8, vn: u8) -> Self {
        self.port = port;
        self.vn = vn;
        self
    }

    /// Set the doorbell gate budget and low-water mark
    #[must_use]
    pub const fn with_doorbell_gate(mut self, budget: u32, low_water: u32) -> Self {
        self.doorbell_budget = budget;
        self.doorbell_low_water = low_water;
        self
    }

    /// Usable BDs per ring
    #[must_use]
    pub const fn ring_capacity(&self) -> usize {
        self.ring_pages as usize * (self.slots_per_page as usize).saturating_sub(1)
    }

    /// Check the configuration for inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidConfig` when:
    /// - there are no queues, or more than the doorbell map supports
    /// - the ring is empty, has single-slot pages, or exceeds 16-bit tracking
    /// - a packet could never fit (fetch limit vs ring capacity)
    /// - a DMA slot is out of range, or two categories share a slot
    /// - timing values are zero
    /// - a coalescing buffer is larger than one BD can describe
    pub fn validate(&self) -> ConfigResult<()> {
        let capacity = self.ring_capacity();
        let slots = [
            self.dmae_misc_slot,
            self.dmae_stats_slot,
            self.dmae_sgl_slot,
            self.dmae_sgl_slot.wrapping_add(1),
        ];
        let distinct_slots = slots
            .iter()
            .enumerate()
            .all(|(i, a)| slots[i + 1..].iter().all(|b| a != b));

        let ok = self.tx_queues != 0
            && self.tx_queues <= MAX_TX_QUEUES
            && self.ring_pages != 0
            && self.slots_per_page >= 2
            && capacity <= MAX_RING_CAPACITY
            && self.fetch_limit >= 4
            && capacity >= self.fetch_limit + 2
            && slots.iter().all(|&s| s < DMAE_CMD_SLOTS)
            && distinct_slots
            && self.port <= 1
            && self.vn <= 3
            && self.dmae_timeout_us != 0
            && self.dmae_poll_interval_us != 0
            && self.dmae_scratch_len32 != 0
            && (self.coalesce_buffers == 0 || self.coalesce_buf_size != 0)
            && self.coalesce_buf_size <= MAX_BD_BYTES as usize
            && self.doorbell_budget != 0;

        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidConfig)
        }
    }
}
