//! Centralized Constants
//!
//! This module provides a single source of truth for the magic numbers used
//! throughout the engine.
//!
//! # Organization
//!
//! Constants are grouped by category:
//! - **Frame sizes**: Ethernet header dimensions
//! - **Descriptor ring**: BD size and default geometry
//! - **Transmit**: fetch limits and coalescing defaults
//! - **DMA engine**: slot counts, completion values, timing
//! - **Doorbell gate**: budget and water marks for slow silicon
//!
//! Register offsets and descriptor bit fields live in `internal::register`
//! and `ring::bits`.

// =============================================================================
// Frame Sizes
// =============================================================================

/// Ethernet header size (dst MAC + src MAC + EtherType)
pub const ETH_HEADER_SIZE: usize = 14;

/// 802.1Q VLAN tag size
pub const VLAN_TAG_SIZE: usize = 4;

/// 802.2 LLC + SNAP header size
pub const LLC_SNAP_SIZE: usize = 8;

/// MAC address length
pub const MAC_ADDR_LEN: usize = 6;

/// Largest byte count one BD can describe (16-bit `nbytes`)
pub const MAX_BD_BYTES: u32 = 0xFFFF;

// =============================================================================
// Descriptor Ring
// =============================================================================

/// Size of every transmit BD in bytes
pub const BD_SIZE: usize = 16;

/// Default slots per ring page (one 4 KiB page of 16-byte BDs)
pub const DEFAULT_SLOTS_PER_PAGE: u16 = 256;

/// Default number of ring pages
pub const DEFAULT_RING_PAGES: u16 = 2;

/// Largest usable ring capacity. Producer/consumer distance is evaluated as a
/// signed 16-bit difference, so it must stay below 2^15.
pub const MAX_RING_CAPACITY: usize = 0x7FFF;

/// Ring page alignment
pub const RING_PAGE_ALIGN: usize = 4096;

// =============================================================================
// Transmit
// =============================================================================

/// BDs the device prefetches per packet. Packets with at least this many
/// fragments are candidates for coalescing.
pub const MAX_FETCH_BD: usize = 13;

/// Default coalescing buffers per transmit queue
pub const DEFAULT_COALESCE_BUFFERS: u16 = 4;

/// Default coalescing buffer size in bytes
pub const DEFAULT_COALESCE_BUF_SIZE: usize = 2048;

/// Coalescing buffer alignment
pub const COALESCE_BUF_ALIGN: usize = 64;

/// Default number of transmit queues
pub const DEFAULT_TX_QUEUES: u8 = 1;

/// Largest number of transmit queues the doorbell map supports
pub const MAX_TX_QUEUES: u8 = 16;

// =============================================================================
// DMA Engine
// =============================================================================

/// Hardware DMA command slots
pub const DMAE_CMD_SLOTS: u8 = 16;

/// Dwords in one DMA command
pub const DMAE_CMD_DWORDS: usize = 14;

/// Value the device writes into a host completion word
pub const DMAE_COMPLETION_VAL: u32 = 0x60d0_d0ae;

/// Value the last SGL executer writes into its completion word
pub const DMAE_SGL_COMPLETION_VAL: u32 = 0x5a5a_d0ae;

/// Set by the device in the completion word when the PCI transaction failed
pub const DMAE_PCI_ERR_FLAG: u32 = 1 << 31;

/// Largest read into host memory, in dwords
pub const DMAE_LEN32_RD_MAX: u32 = 0x80;

/// Largest write from host memory on E1, in dwords
pub const DMAE_LEN32_WR_MAX_E1: u32 = 0x400;

/// Largest write from host memory on E1H/E2, in dwords
pub const DMAE_LEN32_WR_MAX: u32 = 0x2000;

/// Default wait budget for one DMA completion, in microseconds (production silicon)
pub const DMAE_TIMEOUT_US: u32 = 200_000;

/// Delay between completion polls, in microseconds
pub const DMAE_POLL_INTERVAL_US: u32 = 50;

/// Default scratch buffer size per DMA context, in dwords
pub const DMAE_SCRATCH_LEN32: u32 = 0x400;

/// Bytes reserved at the start of a scratch buffer for the completion word
pub const DMAE_COMP_WORD_SIZE: usize = 8;

/// Most executer commands one SGL context can chain
pub const DMAE_SGL_MAX_COMMANDS: usize = 16;

/// Wait-budget multiplier for FPGA/emulation platforms
pub const SLOW_CHIP_CLOCK_FACTOR: u32 = 100;

// =============================================================================
// Doorbell Gate
// =============================================================================

/// Doorbells allowed per refill on slow silicon
pub const DEFAULT_DOORBELL_BUDGET: u32 = 64;

/// Queue depth below which the budget is refilled
pub const DEFAULT_DOORBELL_LOW_WATER: u32 = 8;

/// Bound on the doorbell-gate wait, in 1 µs polls
pub const DOORBELL_GATE_MAX_POLLS: u32 = 100_000;
