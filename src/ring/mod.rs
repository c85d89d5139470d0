//! Transmit descriptor ring (BD chain)
//!
//! The ring is an arena of fixed-size DMA pages. The last slot of every page
//! is a link BD pointing at the next page (the last page wraps to the first),
//! so the device walks the pages as one circle. Callers never see link slots:
//! they address the ring by a logical position, which the ring translates to
//! a (page, offset) pair.
//!
//! Three counters are kept:
//!
//! - `prod` / `cons`: 16-bit logical indices. Their wrapping difference is the
//!   number of slots in flight and never exceeds [`BdRing::capacity`].
//! - `hw_prod`: the producer as the device counts it, link slots included.
//!   This is the value written to the doorbell.

pub mod bits;
pub mod descriptor;

use alloc::vec::Vec;

use crate::driver::error::{ConfigError, ConfigResult};
use crate::hal::{DmaMemory, DmaRegion};
use crate::internal::constants::{BD_SIZE, MAX_RING_CAPACITY, RING_PAGE_ALIGN};

pub use descriptor::{BdSlot, DataBd, LinkBd, ParseBdE1x, ParseBdE2, ParseFields, StartBd};

/// Handle to a produced slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdPos {
    /// Logical producer index the slot was produced at
    pub index: u16,
    /// Position within the ring, link slots excluded
    pos: usize,
}

/// Circular BD chain over one or more linked pages.
pub struct BdRing {
    pages: Vec<DmaRegion>,
    slots_per_page: usize,
    capacity: usize,
    prod: u16,
    cons: u16,
    hw_prod: u16,
    prod_pos: usize,
    cons_pos: usize,
}

impl BdRing {
    /// Allocate `pages` pages of `slots_per_page` slots and link them.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for zero pages, fewer than two slots per page, or a
    ///   capacity beyond what 16-bit index arithmetic can track.
    /// - `OutOfMemory` when the platform cannot provide a page.
    pub fn new<M: DmaMemory>(mem: &M, pages: u16, slots_per_page: u16) -> ConfigResult<Self> {
        let spp = usize::from(slots_per_page);
        let capacity = usize::from(pages) * spp.saturating_sub(1);
        if pages == 0 || spp < 2 || capacity > MAX_RING_CAPACITY {
            return Err(ConfigError::InvalidConfig);
        }

        let mut regions = Vec::with_capacity(usize::from(pages));
        for _ in 0..pages {
            let region = mem
                .alloc_dma(spp * BD_SIZE, RING_PAGE_ALIGN)
                .ok_or(ConfigError::OutOfMemory)?;
            regions.push(region);
        }

        let ring = Self {
            pages: regions,
            slots_per_page: spp,
            capacity,
            prod: 0,
            cons: 0,
            hw_prod: 0,
            prod_pos: 0,
            cons_pos: 0,
        };
        ring.link_pages();
        Ok(ring)
    }

    fn link_pages(&self) {
        let n = self.pages.len();
        for page in 0..n {
            let next = self.pages[(page + 1) % n].device_addr();
            self.link_slot(page).link().set_next(next);
        }
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Usable slots (link slots excluded)
    #[inline(always)]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages
    #[inline(always)]
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Slots per page, link slot included
    #[inline(always)]
    #[must_use]
    pub const fn slots_per_page(&self) -> usize {
        self.slots_per_page
    }

    /// Device address of the first page (programmed into the queue context)
    #[inline(always)]
    #[must_use]
    pub fn base_addr(&self) -> u64 {
        self.pages[0].device_addr()
    }

    /// Device address of `page`
    #[must_use]
    pub fn page_addr(&self, page: usize) -> u64 {
        self.pages[page].device_addr()
    }

    /// The link BD terminating `page`
    #[must_use]
    pub fn link_slot(&self, page: usize) -> &BdSlot {
        self.raw_slot(page, self.slots_per_page - 1)
    }

    // =========================================================================
    // Indices
    // =========================================================================

    /// Logical producer index
    #[inline(always)]
    #[must_use]
    pub const fn prod_index(&self) -> u16 {
        self.prod
    }

    /// Logical consumer index
    #[inline(always)]
    #[must_use]
    pub const fn cons_index(&self) -> u16 {
        self.cons
    }

    /// Producer as the device counts it (link slots included)
    #[inline(always)]
    #[must_use]
    pub const fn hw_prod(&self) -> u16 {
        self.hw_prod
    }

    /// Slots produced but not yet consumed
    #[inline(always)]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        usize::from(self.prod.wrapping_sub(self.cons))
    }

    /// Slots that can be produced right now
    #[inline(always)]
    #[must_use]
    pub fn avail_slots(&self) -> usize {
        self.capacity.saturating_sub(self.in_flight())
    }

    // =========================================================================
    // Produce / Consume
    // =========================================================================

    /// Take the slot at the producer index and advance.
    ///
    /// Never fails: callers check [`avail_slots`](Self::avail_slots) for the
    /// whole packet beforehand. Producing into a full ring is a bug.
    pub fn produce(&mut self) -> BdPos {
        debug_assert!(self.avail_slots() > 0, "produce on a full BD ring");
        let handle = BdPos {
            index: self.prod,
            pos: self.prod_pos,
        };
        self.prod = self.prod.wrapping_add(1);
        self.hw_prod = self.hw_prod.wrapping_add(1);
        self.prod_pos += 1;
        if self.prod_pos.is_multiple_of(self.slots_per_page - 1) {
            // next page: the device steps over the link BD
            self.hw_prod = self.hw_prod.wrapping_add(1);
        }
        if self.prod_pos == self.capacity {
            self.prod_pos = 0;
        }
        handle
    }

    /// Retire `n` slots at the consumer side
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.in_flight(), "consume past the producer");
        self.cons = self.cons.wrapping_add(n as u16);
        self.cons_pos = (self.cons_pos + n) % self.capacity;
    }

    /// Storage of a produced slot
    #[inline]
    #[must_use]
    pub fn slot(&self, at: BdPos) -> &BdSlot {
        let per_page = self.slots_per_page - 1;
        self.raw_slot(at.pos / per_page, at.pos % per_page)
    }

    /// Slot at logical offset `n` from the consumer index
    #[must_use]
    pub fn slot_from_cons(&self, n: usize) -> &BdSlot {
        let pos = (self.cons_pos + n) % self.capacity;
        self.slot(BdPos {
            index: self.cons.wrapping_add(n as u16),
            pos,
        })
    }

    fn raw_slot(&self, page: usize, offset: usize) -> &BdSlot {
        let region = &self.pages[page];
        assert!((offset + 1) * BD_SIZE <= region.len());
        // SAFETY: in bounds (checked above); the page is RING_PAGE_ALIGN
        // aligned so every 16-byte slot is aligned for `BdSlot`; all fields
        // are volatile cells, so shared references may be written through.
        unsafe { &*region.host_ptr().add(offset * BD_SIZE).cast::<BdSlot>() }
    }
}

// SAFETY: the ring exclusively owns its pages.
unsafe impl Send for BdRing {}
