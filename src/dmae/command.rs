//! DMA command encoding and submission
//!
//! A command is fourteen dwords copied into the engine's command memory row
//! for a slot; writing 1 to the slot's "go" register starts it.

use crate::driver::error::{DmaError, DmaResult};
use crate::hal::RegisterSpace;
use crate::internal::constants::{DMAE_CMD_DWORDS, DMAE_COMPLETION_VAL};
use crate::internal::register::{dmae_cmd_mem, dmae_go, is_valid_slot};

// =============================================================================
// Opcode
// =============================================================================

/// Opcode bit fields
pub mod opcode {
    /// Source is device (GRC) space; clear for PCI
    pub const SRC_GRC: u32 = 1 << 0;
    /// Destination field shift
    pub const DST_SHIFT: u32 = 1;
    /// Destination field mask
    pub const DST_MASK: u32 = 0x3 << 1;
    /// Destination PCI
    pub const DST_PCI: u32 = 1 << 1;
    /// Destination GRC
    pub const DST_GRC: u32 = 2 << 1;
    /// Completion goes to GRC; clear for PCI
    pub const C_DST_GRC: u32 = 1 << 3;
    /// Write the completion value when done
    pub const C_TYPE_ENABLE: u32 = 1 << 4;
    /// Endianness field shift
    pub const ENDIANNESS_SHIFT: u32 = 9;
    /// Endianness field mask
    pub const ENDIANNESS_MASK: u32 = 0x3 << 9;
    /// Port number
    pub const PORT_SHIFT: u32 = 11;
    /// Reset the source address on every go
    pub const SRC_RESET: u32 = 1 << 12;
    /// Reset the destination address on every go
    pub const DST_RESET: u32 = 1 << 13;
    /// Virtual NIC shift
    pub const VN_SHIFT: u32 = 14;
    /// Virtual NIC mask (after shift)
    pub const VN_MASK: u32 = 0x3;
}

/// Kind of address a command endpoint names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Space {
    /// Host memory, by device-visible bus address
    Pci,
    /// Device register/memory space, by byte address
    Grc,
}

/// Byte-order transformation applied by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Endianness {
    /// Copy as is
    #[default]
    None = 0,
    /// Swap bytes within each dword
    ByteSwap = 1,
    /// Swap dwords within each qword
    DwordSwap = 2,
    /// Both
    ByteDwordSwap = 3,
}

impl Endianness {
    /// Decode the opcode field
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            1 => Self::ByteSwap,
            2 => Self::DwordSwap,
            3 => Self::ByteDwordSwap,
            _ => Self::None,
        }
    }

    /// True when bytes inside a dword change position
    #[must_use]
    pub const fn swaps_bytes(self) -> bool {
        matches!(self, Self::ByteSwap | Self::ByteDwordSwap)
    }

    /// Completion value as the host will read it back
    #[must_use]
    pub const fn completion_value(self, val: u32) -> u32 {
        if self.swaps_bytes() {
            val.swap_bytes()
        } else {
            val
        }
    }
}

/// Where the engine reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// Write `value` to a host word at bus address `addr`
    Pci {
        /// Bus address of the completion word
        addr: u64,
        /// Value written
        value: u32,
    },
    /// Write `value` to a device register (chains commands)
    Grc {
        /// Byte address of the register
        addr: u32,
        /// Value written
        value: u32,
    },
}

/// Opcode builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(u32);

impl Opcode {
    /// Opcode for a `src` → `dst` copy with completion enabled
    #[must_use]
    pub const fn new(src: Space, dst: Space) -> Self {
        let mut bits = opcode::C_TYPE_ENABLE;
        if matches!(src, Space::Grc) {
            bits |= opcode::SRC_GRC;
        }
        bits |= match dst {
            Space::Pci => opcode::DST_PCI,
            Space::Grc => opcode::DST_GRC,
        };
        Self(bits | opcode::SRC_RESET | opcode::DST_RESET)
    }

    /// Encode the function the command runs on behalf of
    #[must_use]
    pub const fn with_function(self, port: u8, vn: u8) -> Self {
        Self(
            self.0
                | ((port as u32 & 1) << opcode::PORT_SHIFT)
                | ((vn as u32 & opcode::VN_MASK) << opcode::VN_SHIFT),
        )
    }

    /// Set the byte-order transformation
    #[must_use]
    pub const fn with_endianness(self, e: Endianness) -> Self {
        Self((self.0 & !opcode::ENDIANNESS_MASK) | ((e as u32) << opcode::ENDIANNESS_SHIFT))
    }

    /// Send completion to device space instead of host memory
    #[must_use]
    pub const fn with_grc_completion(self) -> Self {
        Self(self.0 | opcode::C_DST_GRC)
    }

    /// Keep the source cursor across "go" triggers
    #[must_use]
    pub const fn without_src_reset(self) -> Self {
        Self(self.0 & !opcode::SRC_RESET)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Decoded endianness
    #[must_use]
    pub const fn endianness(self) -> Endianness {
        Endianness::from_bits(self.0 >> opcode::ENDIANNESS_SHIFT)
    }
}

// =============================================================================
// Command
// =============================================================================

/// One DMA command.
///
/// GRC addresses are stored in dword units, as the engine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaeCommand {
    /// Opcode bits
    pub opcode: u32,
    /// Source address (bus address, or GRC dword address)
    pub src: u64,
    /// Destination address (bus address, or GRC dword address)
    pub dst: u64,
    /// Length in dwords
    pub len32: u16,
    /// Completion address (bus address, or GRC dword address)
    pub comp_addr: u64,
    /// Completion value
    pub comp_val: u32,
}

impl DmaeCommand {
    /// Build a command. `src`/`dst` are bus addresses for `Space::Pci` and
    /// byte addresses for `Space::Grc`.
    #[must_use]
    pub fn new(op: Opcode, src: (Space, u64), dst: (Space, u64), len32: u16) -> Self {
        Self {
            opcode: op.bits(),
            src: encode_addr(src),
            dst: encode_addr(dst),
            len32,
            comp_addr: 0,
            comp_val: 0,
        }
    }

    /// Attach a completion target
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        match completion {
            Completion::Pci { addr, value } => {
                self.opcode &= !opcode::C_DST_GRC;
                self.comp_addr = addr;
                self.comp_val = value;
            }
            Completion::Grc { addr, value } => {
                self.opcode |= opcode::C_DST_GRC;
                self.comp_addr = u64::from(addr >> 2);
                self.comp_val = value;
            }
        }
        self
    }

    /// Default host completion: `DMAE_COMPLETION_VAL` at `addr`
    #[must_use]
    pub fn with_host_completion(self, addr: u64) -> Self {
        self.with_completion(Completion::Pci {
            addr,
            value: DMAE_COMPLETION_VAL,
        })
    }

    /// Decoded opcode
    #[must_use]
    pub const fn op(&self) -> Opcode {
        Opcode(self.opcode)
    }

    /// Serialize into command-memory order
    #[must_use]
    pub fn to_words(&self) -> [u32; DMAE_CMD_DWORDS] {
        let mut w = [0u32; DMAE_CMD_DWORDS];
        w[0] = self.opcode;
        w[1] = self.src as u32;
        w[2] = (self.src >> 32) as u32;
        w[3] = self.dst as u32;
        w[4] = (self.dst >> 32) as u32;
        w[5] = u32::from(self.len32);
        w[6] = self.comp_addr as u32;
        w[7] = (self.comp_addr >> 32) as u32;
        w[8] = self.comp_val;
        // words 9..14: CRC/checksum accumulators, always zero
        w
    }

    /// Parse a command back from command-memory order
    #[must_use]
    pub fn from_words(w: &[u32; DMAE_CMD_DWORDS]) -> Self {
        let join = |lo: u32, hi: u32| (u64::from(hi) << 32) | u64::from(lo);
        Self {
            opcode: w[0],
            src: join(w[1], w[2]),
            dst: join(w[3], w[4]),
            len32: w[5] as u16,
            comp_addr: join(w[6], w[7]),
            comp_val: w[8],
        }
    }
}

fn encode_addr((space, addr): (Space, u64)) -> u64 {
    match space {
        Space::Pci => addr,
        Space::Grc => addr >> 2,
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Load `cmd` into `slot` and start it.
///
/// `dmae_base` is the DMA engine block base
/// ([`ChipProfile::register_base`](crate::driver::chip::ChipProfile::register_base)).
///
/// # Errors
///
/// `InvalidParameter` for an out-of-range slot, a zero source or destination
/// address, or a zero length. Nothing is written in that case.
pub fn submit<R: RegisterSpace>(
    regs: &R,
    dmae_base: u32,
    slot: u8,
    cmd: &DmaeCommand,
) -> DmaResult<()> {
    if !is_valid_slot(slot) || cmd.src == 0 || cmd.dst == 0 || cmd.len32 == 0 {
        return Err(DmaError::InvalidParameter);
    }
    let row = dmae_base + dmae_cmd_mem(slot);
    for (i, word) in cmd.to_words().iter().enumerate() {
        regs.write32(row + (i as u32) * 4, *word);
    }
    regs.write32(dmae_base + dmae_go(slot), 1);
    Ok(())
}
