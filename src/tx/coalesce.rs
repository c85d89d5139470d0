//! Coalescing buffer pool
//!
//! Packets with more fragments than the device fetches per packet are copied
//! into one contiguous, pre-allocated buffer first. Buffers rotate through a
//! FIFO free list: a buffer too small for a request goes back to the tail
//! and the next one is tried, so the head of the list drifts toward buffers
//! that fit the traffic.

use alloc::collections::VecDeque;

use super::packet::Fragment;
use crate::driver::error::{ConfigError, ConfigResult};
use crate::hal::{DmaMemory, DmaRegion};
use crate::internal::constants::{COALESCE_BUF_ALIGN, MAX_BD_BYTES};

/// One pooled buffer.
#[derive(Debug)]
pub struct CoalesceBuffer {
    region: DmaRegion,
    used: usize,
}

impl CoalesceBuffer {
    /// Capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Bytes currently held
    #[must_use]
    pub const fn len(&self) -> usize {
        self.used
    }

    /// True when nothing has been copied in
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Device-visible address of the first byte
    #[must_use]
    pub fn device_addr(&self) -> u64 {
        self.region.device_addr()
    }

    /// The held bytes as one fragment
    #[must_use]
    pub fn as_fragment(&self) -> Fragment {
        Fragment::new(self.region.device_addr(), self.used as u32)
    }

    /// Copy `frags` back to back into the buffer.
    ///
    /// The caller guarantees the total fits (`checkout` sized the buffer).
    pub fn linearize<M: DmaMemory + ?Sized>(&mut self, mem: &M, frags: &[Fragment]) -> Fragment {
        let dst = self.region.as_mut_slice();
        let mut off = 0;
        for frag in frags {
            let len = frag.len as usize;
            mem.read_device(frag.addr, &mut dst[off..off + len]);
            off += len;
        }
        self.used = off;
        self.as_fragment()
    }
}

/// FIFO pool of coalescing buffers.
#[derive(Debug)]
pub struct CoalescePool {
    free: VecDeque<CoalesceBuffer>,
    total: usize,
}

impl CoalescePool {
    /// Allocate `count` buffers of `size` bytes each.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` when `size` exceeds what one BD can describe.
    /// - `OutOfMemory` when the platform cannot provide a buffer.
    pub fn new<M: DmaMemory>(mem: &M, count: u16, size: usize) -> ConfigResult<Self> {
        if size > MAX_BD_BYTES as usize {
            return Err(ConfigError::InvalidConfig);
        }
        let mut free = VecDeque::with_capacity(usize::from(count));
        for _ in 0..count {
            let region = mem
                .alloc_dma(size, COALESCE_BUF_ALIGN)
                .ok_or(ConfigError::OutOfMemory)?;
            free.push_back(CoalesceBuffer { region, used: 0 });
        }
        Ok(Self {
            free,
            total: usize::from(count),
        })
    }

    /// Build a pool from existing buffers (mixed sizes allowed)
    pub fn from_regions(regions: impl IntoIterator<Item = DmaRegion>) -> Self {
        let free: VecDeque<_> = regions
            .into_iter()
            .map(|region| CoalesceBuffer { region, used: 0 })
            .collect();
        let total = free.len();
        Self { free, total }
    }

    /// Buffers ready for checkout
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Buffers owned by the pool, checked out or not
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Take the first free buffer of at least `size` bytes.
    ///
    /// Every buffer inspected and found too small moves to the tail.
    pub fn checkout(&mut self, size: usize) -> Option<CoalesceBuffer> {
        for _ in 0..self.free.len() {
            let buf = self.free.pop_front()?;
            if buf.capacity() >= size {
                return Some(buf);
            }
            self.free.push_back(buf);
        }
        None
    }

    /// Return a buffer to the tail of the free list
    pub fn give_back(&mut self, mut buf: CoalesceBuffer) {
        buf.used = 0;
        self.free.push_back(buf);
    }

    /// Largest free buffer
    #[must_use]
    pub fn largest_free(&self) -> usize {
        self.free.iter().map(CoalesceBuffer::capacity).max().unwrap_or(0)
    }
}
