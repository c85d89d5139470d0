//! Error types for the NX2 DMA/transmit engine
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Initialization and configuration failures
//! - [`DmaError`]: DMA command engine failures
//! - [`TxError`]: Transmit path rejections
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by the [`Engine`](crate::Engine) facade.
//!
//! Consistency violations (the device reporting completions the driver never
//! queued) are not represented here: they panic, since continuing would
//! desynchronize the ring from the hardware.

use crate::tx::TxPacket;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration and initialization errors
///
/// These errors occur while validating [`EngineConfig`](crate::EngineConfig)
/// or allocating the DMA-visible memory behind rings, pools and contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Invalid configuration parameter
    InvalidConfig,
    /// The platform allocator could not provide DMA memory
    OutOfMemory,
    /// Queue index out of range
    InvalidQueue,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidConfig => "invalid configuration",
            ConfigError::OutOfMemory => "out of DMA memory",
            ConfigError::InvalidQueue => "invalid queue index",
        }
    }
}

// =============================================================================
// DMA Errors
// =============================================================================

/// DMA command engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// Zero address, zero/oversized length, bad slot or SGL count.
    /// Rejected before any register write.
    InvalidParameter,
    /// Completion word not observed within the wait budget
    Timeout,
    /// Completion word carried the PCI error flag
    PciError,
}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DmaError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DmaError::InvalidParameter => "invalid DMA parameter",
            DmaError::Timeout => "DMA completion timed out",
            DmaError::PciError => "DMA PCI error",
        }
    }
}

// =============================================================================
// Transmit Errors
// =============================================================================

/// Transmit path errors
///
/// `NoDescriptorsAvailable` and `NoCoalesceBuffer` are resource errors: the
/// packet was not sent and nothing was modified, retry after reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// Not enough free ring slots for the packet
    NoDescriptorsAvailable,
    /// Packet needs linearizing but no pooled buffer is large enough
    NoCoalesceBuffer,
    /// Malformed packet descriptor (no fragments, bad lengths, bad LSO info)
    InvalidPacket,
    /// Transmit queue index out of range
    InvalidQueue,
}

impl core::fmt::Display for TxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TxError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TxError::NoDescriptorsAvailable => "no descriptors available",
            TxError::NoCoalesceBuffer => "no coalescing buffer available",
            TxError::InvalidPacket => "invalid packet",
            TxError::InvalidQueue => "invalid transmit queue",
        }
    }

    /// True for errors that clear up once completions are reclaimed
    #[must_use]
    pub const fn is_resource(&self) -> bool {
        matches!(
            self,
            TxError::NoDescriptorsAvailable | TxError::NoCoalesceBuffer
        )
    }
}

/// A packet the transmit path refused, handed back to the caller.
#[derive(Debug)]
pub struct TxRejected {
    /// Why the packet was refused
    pub error: TxError,
    /// The untouched packet
    pub packet: TxPacket,
}

impl TxRejected {
    pub(crate) fn new(error: TxError, packet: TxPacket) -> Self {
        Self { error, packet }
    }
}

impl core::fmt::Display for TxRejected {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "packet {} rejected: {}", self.packet.id, self.error)
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// ```ignore
/// match result {
///     Err(Error::Tx(TxError::NoDescriptorsAvailable)) => { /* retry later */ }
///     Err(Error::Dma(DmaError::Timeout)) => { /* fatal for the caller */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// DMA error
    Dma(DmaError),
    /// Transmit error
    Tx(TxError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Dma(e) => write!(f, "dma: {}", e.as_str()),
            Error::Tx(e) => write!(f, "tx: {}", e.as_str()),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<DmaError> for Error {
    fn from(e: DmaError) -> Self {
        Error::Dma(e)
    }
}

impl From<TxError> for Error {
    fn from(e: TxError) -> Self {
        Error::Tx(e)
    }
}

impl From<TxRejected> for Error {
    fn from(e: TxRejected) -> Self {
        Error::Tx(e.error)
    }
}

/// Result type alias for engine operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for DMA operations
pub type DmaResult<T> = core::result::Result<T, DmaError>;

/// Result type alias for transmit operations
pub type TxResult<T> = core::result::Result<T, TxError>;

// =============================================================================
// Unit Tests
// =============================================================================
