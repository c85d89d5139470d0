//! Hardware Abstraction Layer
//!
//! The engine never touches a BAR, an allocator or a clock directly. Everything
//! it needs from the platform goes through the small traits in this module,
//! so the same code runs against real hardware and against the host mocks in
//! `test_utils`.
//!
//! # Modules
//!
//! - [`memory`]: DMA-visible memory regions and the allocator seam
//! - [`reset`]: "device reset in progress" query
//!
//! # Delay Integration
//!
//! All busy-wait loops take `embedded_hal::delay::DelayNs` directly.
//! Pass any delay implementation from your platform.

pub mod memory;
pub mod reset;

pub use memory::{DmaMemory, DmaRegion};
pub use reset::{ResetFlag, ResetStatus};

// =============================================================================
// Register Space
// =============================================================================

/// 32-bit register access by byte offset within the device BAR.
///
/// Implementations are expected to use volatile MMIO accesses. Methods take
/// `&self` because register blocks are shared hardware state.
pub trait RegisterSpace {
    /// Read the register at `offset`
    fn read32(&self, offset: u32) -> u32;

    /// Write `value` to the register at `offset`
    fn write32(&self, offset: u32, value: u32);
}

impl<T: RegisterSpace + ?Sized> RegisterSpace for &T {
    #[inline(always)]
    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    #[inline(always)]
    fn write32(&self, offset: u32, value: u32) {
        (**self).write32(offset, value);
    }
}

// =============================================================================
// Status Block
// =============================================================================

/// Source of the hardware transmit consumer indices.
///
/// The status block itself (and the interrupt that announces updates) lives
/// outside this crate; the engine only needs the latest packet consumer of
/// each transmit queue.
pub trait StatusBlock {
    /// Packet consumer index last reported by the device for `queue`
    fn tx_consumer(&self, queue: u8) -> u16;
}

impl<T: StatusBlock + ?Sized> StatusBlock for &T {
    #[inline(always)]
    fn tx_consumer(&self, queue: u8) -> u16 {
        (**self).tx_consumer(queue)
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Everything the engine consumes from the platform, in one bound.
pub trait Platform: RegisterSpace + DmaMemory + ResetStatus + StatusBlock {}

impl<T: RegisterSpace + DmaMemory + ResetStatus + StatusBlock> Platform for T {}
