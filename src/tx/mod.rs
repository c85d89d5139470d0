//! Packet transmit path
//!
//! - [`packet`]: the caller-facing packet descriptor and offload metadata
//! - [`coalesce`]: pooled buffers for linearizing over-fragmented packets
//! - [`doorbell`]: rate limiting for doorbell writes on slow silicon
//! - [`queue`]: BD construction, doorbell and completion reclaim

pub mod coalesce;
pub mod doorbell;
pub mod packet;
pub mod queue;

pub use coalesce::{CoalesceBuffer, CoalescePool};
pub use doorbell::DoorbellGate;
pub use packet::{Fragment, LsoParams, OffloadFlags, PacketState, TxPacket, TxReceipt};
pub use queue::{TxQueue, TxStats};
