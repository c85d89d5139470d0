//! Core engine components.
//!
//! This module contains the building blocks every other layer consumes:
//!
//! - [`chip`] - Chip generations, revisions and their per-generation quirks
//! - [`config`] - Configuration types and builder patterns
//! - [`engine`] - The per-function engine facade
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```ignore
//! use ph_nx2_dma::driver::{Chip, ChipFamily, EngineConfig};
//!
//! let config = EngineConfig::new()
//!     .with_chip(Chip::new(ChipFamily::E1H))
//!     .with_tx_queues(2);
//! ```

// Submodules
pub mod chip;
pub mod config;
pub mod engine;
pub mod error;

// Re-exports for convenience
pub use chip::{Block, Chip, ChipFamily, ChipProfile, ChipRevision, ParseBdLayout, TransferDir};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, Result, TxError, TxRejected, TxResult,
};
