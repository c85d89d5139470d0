//! NetXtreme II DMA and Transmit Engine
//!
//! A `no_std` (with `alloc`) implementation of the host-side data path of
//! NetXtreme II class multi-queue Ethernet adapters (57710/57711/57712 and
//! later): the on-chip DMA command engine and the transmit descriptor path.
//!
//! # Architecture
//!
//! The crate is organized into four layers:
//!
//! 1. **Engine** ([`driver::engine`]): one context per physical function that
//!    owns the queues, the DMA contexts and the doorbell gate
//! 2. **Transmit** ([`tx`]): BD construction, LSO header split, fragment
//!    coalescing, doorbells and completion reclaim
//! 3. **DMA engine** ([`dmae`]): command building, submission, polling,
//!    chunked transfers and scatter-gather chains
//! 4. **HAL** ([`hal`]): platform seams for registers, DMA memory, device
//!    reset and the status block
//!
//! The descriptor ring itself ([`ring`]) is shared by layers 1 and 2.
//!
//! # Features
//!
//! - `defmt`: Enable defmt formatting for error and descriptor types
//! - `log`: Emit diagnostics through the `log` facade (timeouts, reset
//!   escapes, doorbell gate overruns, consistency violations)
//! - `critical-section`: Enable the ISR-safe [`sync::SharedTxQueue`] wrapper
//!
//! # Example
//!
//! ```ignore
//! use ph_nx2_dma::{Chip, ChipFamily, DmaeCategory, Engine, EngineConfig, TxPacket};
//!
//! // Your platform: BAR access, DMA allocator, reset flag, status block
//! let platform = /* impl ph_nx2_dma::hal::Platform */;
//! let mut delay = /* your DelayNs implementation */;
//!
//! let config = EngineConfig::new()
//!     .with_chip(Chip::new(ChipFamily::E2))
//!     .with_tx_queues(4)
//!     .with_coalesce_pool(8, 9600);
//!
//! let engine = Engine::new(platform, config)?;
//!
//! // Read 64 bytes of device memory
//! let mut buf = [0u8; 64];
//! engine.read_dmae(DmaeCategory::Misc, 0x5_0000, &mut buf, &mut delay)?;
//!
//! // Send a two-fragment packet on queue 0
//! let packet = TxPacket::new(1)
//!     .with_fragment(hdr_bus_addr, 54)
//!     .with_fragment(payload_bus_addr, 1400);
//! engine.send(0, packet, &mut delay).map_err(|r| r.error)?;
//!
//! // Later, from the status-block handler
//! for done in engine.get_completed(0)? {
//!     /* release done.id */
//! }
//! ```
//!
//! # Memory Requirements
//!
//! With default configuration (one queue, 2 ring pages, 4 coalescing buffers
//! of 2 KiB, 4 KiB DMA scratch per category):
//! - Ring: 8 KiB of DMA memory per queue
//! - Coalescing: 8 KiB of DMA memory per queue
//! - DMA contexts: ~12 KiB of DMA memory

#![no_std]
#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future
)]

extern crate alloc;

// =============================================================================
// Modules
// =============================================================================

pub mod dmae;
pub mod driver;
pub mod hal;
pub mod ring;
pub mod tx;

// Internal implementation details (pub(crate) only)
mod internal;

#[cfg(feature = "critical-section")]
#[cfg_attr(docsrs, doc(cfg(feature = "critical-section")))]
pub mod sync;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod test_utils;

// =============================================================================
// Re-exports
// =============================================================================

pub use dmae::{DmaeCategory, DmaeSgl, SglEntry};
pub use driver::chip::{Chip, ChipFamily, ChipProfile, ChipRevision};
pub use driver::config::EngineConfig;
pub use driver::engine::Engine;
pub use driver::error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, Result, TxError, TxRejected, TxResult,
};
pub use hal::{DmaMemory, DmaRegion, Platform, RegisterSpace, ResetFlag, ResetStatus, StatusBlock};
pub use tx::{Fragment, LsoParams, OffloadFlags, PacketState, TxPacket, TxReceipt, TxStats};

// Re-export sync types when critical-section is enabled
#[cfg(feature = "critical-section")]
pub use sync::{CriticalSectionCell, SharedTxQueue};

/// Shared engine constants.
///
/// These are grouped into a dedicated module to keep the top-level facade
/// focused on engine types.
pub mod constants {
    pub use crate::internal::constants::{
        // Transmit
        COALESCE_BUF_ALIGN,
        DEFAULT_COALESCE_BUF_SIZE,
        DEFAULT_COALESCE_BUFFERS,
        // Doorbell gate
        DEFAULT_DOORBELL_BUDGET,
        DEFAULT_DOORBELL_LOW_WATER,
        // Descriptor ring
        DEFAULT_RING_PAGES,
        DEFAULT_SLOTS_PER_PAGE,
        DEFAULT_TX_QUEUES,
        // DMA engine
        DMAE_COMPLETION_VAL,
        DMAE_LEN32_RD_MAX,
        DMAE_LEN32_WR_MAX,
        DMAE_LEN32_WR_MAX_E1,
        DMAE_POLL_INTERVAL_US,
        DMAE_SCRATCH_LEN32,
        DMAE_TIMEOUT_US,
        // Frame sizes
        ETH_HEADER_SIZE,
        MAX_BD_BYTES,
        MAX_FETCH_BD,
        MAX_RING_CAPACITY,
        MAX_TX_QUEUES,
        VLAN_TAG_SIZE,
    };
}
