//! ISR-safe transmit queue wrapper using critical sections.

use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;

use super::primitives::CriticalSectionCell;
use crate::driver::error::{TxError, TxRejected};
use crate::hal::{DmaMemory, RegisterSpace, StatusBlock};
use crate::tx::{DoorbellGate, TxPacket, TxQueue, TxReceipt};

/// Transmit queue shared between a sending context and an interrupt handler.
///
/// The queue is installed once it has been allocated; until then sends are
/// rejected with `InvalidQueue` and reclaims return nothing.
///
/// # Example
///
/// ```ignore
/// static TXQ0: SharedTxQueue = SharedTxQueue::new();
///
/// TXQ0.install(TxQueue::new(&platform, &chip, &config, 0)?);
///
/// #[interrupt]
/// fn STATUS_BLOCK_IRQ() {
///     let mut done = Vec::new();
///     TXQ0.reclaim(&platform, &mut done);
/// }
/// ```
#[derive(Default)]
pub struct SharedTxQueue {
    inner: CriticalSectionCell<Option<TxQueue>>,
}

impl SharedTxQueue {
    /// Create an empty slot (const, suitable for static initialization).
    pub const fn new() -> Self {
        Self {
            inner: CriticalSectionCell::new(None),
        }
    }

    /// Install `queue`, returning the one it replaces.
    pub fn install(&self, queue: TxQueue) -> Option<TxQueue> {
        self.inner.with(|slot| slot.replace(queue))
    }

    /// Remove the installed queue.
    pub fn take(&self) -> Option<TxQueue> {
        self.inner.with(Option::take)
    }

    /// True once a queue is installed
    pub fn is_installed(&self) -> bool {
        self.inner.with_ref(Option::is_some)
    }

    /// Execute a closure with exclusive access to the queue.
    ///
    /// Interrupts are disabled for the duration of the closure.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut TxQueue) -> R,
    {
        self.inner.with(|slot| slot.as_mut().map(f))
    }

    /// Send `packet` inside a critical section.
    ///
    /// # Errors
    ///
    /// As [`TxQueue::send`], plus `InvalidQueue` when nothing is installed.
    pub fn send<P, D>(
        &self,
        platform: &P,
        gate: &DoorbellGate,
        packet: TxPacket,
        delay: &mut D,
    ) -> Result<TxReceipt, TxRejected>
    where
        P: RegisterSpace + DmaMemory,
        D: DelayNs,
    {
        self.inner.with(|slot| match slot.as_mut() {
            Some(queue) => queue.send(platform, gate, packet, delay),
            None => Err(TxRejected::new(TxError::InvalidQueue, packet)),
        })
    }

    /// Reclaim completed packets into `sent`, returning how many.
    pub fn reclaim<S: StatusBlock>(&self, status: &S, sent: &mut Vec<TxPacket>) -> usize {
        self.inner.with(|slot| match slot.as_mut() {
            Some(queue) => {
                let id = queue.id();
                queue.reclaim(|| status.tx_consumer(id), sent)
            }
            None => 0,
        })
    }
}
