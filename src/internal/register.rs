//! Device register map
//!
//! Offsets are relative to the device BAR and are handed to
//! [`RegisterSpace`](crate::hal::RegisterSpace). Blocks whose location differs
//! per chip generation are resolved through
//! [`ChipProfile::register_base`](crate::driver::chip::ChipProfile::register_base).

use crate::internal::constants::{DMAE_CMD_DWORDS, DMAE_CMD_SLOTS};

// =============================================================================
// DMA Engine
// =============================================================================

/// Offset of the command memory inside the DMA engine block
pub const DMAE_CMD_MEM_OFFSET: u32 = 0x400;

/// Offset of the first "go" register inside the DMA engine block
pub const DMAE_GO_C0_OFFSET: u32 = 0x80;

/// Bytes per command-memory row
pub const DMAE_CMD_SIZE: u32 = (DMAE_CMD_DWORDS * 4) as u32;

/// Command-memory row for `slot`, relative to the DMA engine block
#[inline(always)]
pub const fn dmae_cmd_mem(slot: u8) -> u32 {
    DMAE_CMD_MEM_OFFSET + slot as u32 * DMAE_CMD_SIZE
}

/// "Go" trigger register for `slot`, relative to the DMA engine block
#[inline(always)]
pub const fn dmae_go(slot: u8) -> u32 {
    DMAE_GO_C0_OFFSET + slot as u32 * 4
}

/// True when `slot` names a hardware command slot
#[inline(always)]
pub const fn is_valid_slot(slot: u8) -> bool {
    slot < DMAE_CMD_SLOTS
}

// =============================================================================
// Doorbells
// =============================================================================

/// Doorbell block layout
pub mod doorbell {
    /// E1/E1H doorbell stride per transmit queue
    pub const STRIDE_E1X: u32 = 0x80;
    /// E2 doorbell stride per transmit queue
    pub const STRIDE_E2: u32 = 0x100;
    /// Queue-depth register, relative to the doorbell block.
    /// Only meaningful on slow (FPGA/emulation) silicon.
    pub const QUEUE_DEPTH: u32 = 0xFFF0;

    /// Doorbell type bit in the header byte
    pub const HDR_DB_TYPE: u32 = 1 << 7;
    /// Producer field shift
    pub const PROD_SHIFT: u32 = 16;

    /// Doorbell word announcing BD producer `prod`
    #[inline(always)]
    pub const fn value(prod: u16) -> u32 {
        HDR_DB_TYPE | ((prod as u32) << PROD_SHIFT)
    }

    /// Producer carried by a doorbell word
    #[inline(always)]
    pub const fn prod(value: u32) -> u16 {
        (value >> PROD_SHIFT) as u16
    }
}
