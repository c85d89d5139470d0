//! Synchronization support
//!
//! - [`CriticalSectionCell`]: ISR-safe interior mutability
//! - [`SharedTxQueue`]: a transmit queue shared with an interrupt handler,
//!   for reclaiming completions from the status-block interrupt
//!
//! Only built with the `critical-section` feature. The critical section
//! implementation is provided by the platform crate.
//!
//! [`Engine`](crate::Engine) serializes queues with spin locks instead; use
//! these types when a queue is driven from interrupt context directly.

mod primitives;
mod shared;

pub use primitives::CriticalSectionCell;
pub use shared::SharedTxQueue;
