//! Chip generations
//!
//! The handful of behaviors that differ between adapter generations are
//! resolved once, at initialization, from a [`Chip`] value. Everything else
//! asks the [`ChipProfile`] instead of branching on the family.

use crate::internal::constants::{
    DMAE_LEN32_RD_MAX, DMAE_LEN32_WR_MAX, DMAE_LEN32_WR_MAX_E1, SLOW_CHIP_CLOCK_FACTOR,
};
use crate::internal::register::doorbell;

/// Adapter generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipFamily {
    /// First generation, single function per port
    E1,
    /// Multi-function first generation
    E1H,
    /// Second generation
    #[default]
    E2,
}

/// Silicon revision class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipRevision {
    /// Production silicon
    #[default]
    Asic,
    /// FPGA prototype
    Fpga,
    /// Emulation platform
    Emulation,
}

/// Register blocks whose location is generation specific
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Block {
    /// DMA engine command memory and "go" registers
    Dmae,
    /// Transmit doorbells
    Doorbell,
}

/// Direction of a DMA transfer, as far as size limits are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDir {
    /// Destination is host memory
    ToHost,
    /// Destination is device space
    FromHost,
}

/// Layout of the parsing BD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseBdLayout {
    /// E1/E1H: offsets, sequence, IP id, pseudo checksum
    E1x,
    /// E2: destination MAC and packed parsing data
    E2,
}

/// Per-generation behavior.
pub trait ChipProfile {
    /// BAR offset of `block`
    fn register_base(&self, block: Block) -> u32;

    /// Largest single DMA command, in dwords
    fn max_transfer_len32(&self, dir: TransferDir) -> u32;

    /// Whether doorbells must pass the rate-limiting gate
    fn doorbell_workaround(&self) -> bool;

    /// Multiplier for busy-wait budgets
    fn clock_factor(&self) -> u32;

    /// Parsing BD layout
    fn parse_bd_layout(&self) -> ParseBdLayout;

    /// Offset between consecutive transmit queue doorbells
    fn doorbell_stride(&self) -> u32;
}

/// A concrete adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chip {
    /// Generation
    pub family: ChipFamily,
    /// Revision class
    pub revision: ChipRevision,
}

impl Chip {
    /// Production silicon of `family`
    #[must_use]
    pub const fn new(family: ChipFamily) -> Self {
        Self {
            family,
            revision: ChipRevision::Asic,
        }
    }

    /// Same family, different revision class
    #[must_use]
    pub const fn with_revision(mut self, revision: ChipRevision) -> Self {
        self.revision = revision;
        self
    }

    /// True on FPGA and emulation platforms
    #[inline(always)]
    #[must_use]
    pub const fn is_slow(&self) -> bool {
        !matches!(self.revision, ChipRevision::Asic)
    }

    /// True for E1 and E1H
    #[inline(always)]
    #[must_use]
    pub const fn is_e1x(&self) -> bool {
        matches!(self.family, ChipFamily::E1 | ChipFamily::E1H)
    }
}

impl ChipProfile for Chip {
    fn register_base(&self, block: Block) -> u32 {
        match (block, self.family) {
            (Block::Dmae, _) => 0x10_2000,
            (Block::Doorbell, ChipFamily::E1 | ChipFamily::E1H) => 0x20_0000,
            (Block::Doorbell, ChipFamily::E2) => 0x40_0000,
        }
    }

    fn max_transfer_len32(&self, dir: TransferDir) -> u32 {
        match (dir, self.family) {
            (TransferDir::ToHost, _) => DMAE_LEN32_RD_MAX,
            (TransferDir::FromHost, ChipFamily::E1) => DMAE_LEN32_WR_MAX_E1,
            (TransferDir::FromHost, _) => DMAE_LEN32_WR_MAX,
        }
    }

    fn doorbell_workaround(&self) -> bool {
        self.is_slow()
    }

    fn clock_factor(&self) -> u32 {
        if self.is_slow() {
            SLOW_CHIP_CLOCK_FACTOR
        } else {
            1
        }
    }

    fn parse_bd_layout(&self) -> ParseBdLayout {
        if self.is_e1x() {
            ParseBdLayout::E1x
        } else {
            ParseBdLayout::E2
        }
    }

    fn doorbell_stride(&self) -> u32 {
        if self.is_e1x() {
            doorbell::STRIDE_E1X
        } else {
            doorbell::STRIDE_E2
        }
    }
}
