//! DMA-visible memory.
//!
//! A [`DmaRegion`] is a block the device can address: a host pointer for the
//! CPU side and a device (bus) address for the hardware side. Regions are
//! allocated once at initialization and live as long as the engine; they are
//! never returned to the allocator during normal operation.

use core::ptr::NonNull;
use core::sync::atomic::{Ordering, fence};

/// Platform allocator for DMA-visible memory.
pub trait DmaMemory {
    /// Allocate `size` bytes aligned to `align`, zero-filled.
    ///
    /// Returns `None` when the platform is out of DMA memory.
    fn alloc_dma(&self, size: usize, align: usize) -> Option<DmaRegion>;

    /// Copy bytes starting at device address `addr` into `dst`.
    ///
    /// Used to linearize packet fragments into a coalescing buffer; the
    /// platform maps the device address back to a host view.
    fn read_device(&self, addr: u64, dst: &mut [u8]);

    /// Full memory barrier. Descriptor writes must be visible to the device
    /// before the doorbell.
    #[inline(always)]
    fn barrier(&self) {
        fence(Ordering::SeqCst);
    }
}

impl<T: DmaMemory + ?Sized> DmaMemory for &T {
    fn alloc_dma(&self, size: usize, align: usize) -> Option<DmaRegion> {
        (**self).alloc_dma(size, align)
    }

    fn read_device(&self, addr: u64, dst: &mut [u8]) {
        (**self).read_device(addr, dst);
    }

    #[inline(always)]
    fn barrier(&self) {
        (**self).barrier();
    }
}

/// A block of DMA-visible memory.
#[derive(Debug)]
pub struct DmaRegion {
    host: NonNull<u8>,
    device: u64,
    len: usize,
}

// SAFETY: the region exclusively owns its memory; all shared-state accesses
// go through volatile reads/writes.
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Wrap a platform allocation.
    ///
    /// Returns `None` for a null host pointer or a zero device address.
    ///
    /// # Safety
    ///
    /// `host` must be valid for reads and writes of `len` bytes for the life
    /// of the region, must not be aliased by another `DmaRegion`, and must be
    /// the CPU view of device address `device`.
    pub unsafe fn from_raw(host: *mut u8, device: u64, len: usize) -> Option<Self> {
        if device == 0 {
            return None;
        }
        NonNull::new(host).map(|host| Self { host, device, len })
    }

    /// Device-visible address of the first byte
    #[inline(always)]
    #[must_use]
    pub const fn device_addr(&self) -> u64 {
        self.device
    }

    /// Length in bytes
    #[inline(always)]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length region
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// CPU-visible pointer to the first byte
    #[inline(always)]
    #[must_use]
    pub fn host_ptr(&self) -> *mut u8 {
        self.host.as_ptr()
    }

    #[inline(always)]
    fn check(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "DMA region access out of bounds: {offset}+{len} > {}",
            self.len
        );
    }

    /// Volatile read of the little-endian dword at `offset`
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.check(offset, 4);
        assert!(offset.is_multiple_of(4), "unaligned dword access at {offset}");
        // SAFETY: bounds and alignment checked above.
        u32::from_le(unsafe { core::ptr::read_volatile(self.host_ptr().add(offset).cast::<u32>()) })
    }

    /// Volatile write of a little-endian dword at `offset`
    #[inline]
    pub fn write_u32(&self, offset: usize, value: u32) {
        self.check(offset, 4);
        assert!(offset.is_multiple_of(4), "unaligned dword access at {offset}");
        // SAFETY: bounds and alignment checked above.
        unsafe {
            core::ptr::write_volatile(self.host_ptr().add(offset).cast::<u32>(), value.to_le());
        }
    }

    /// Copy `src` into the region at `offset`
    pub fn write_bytes(&self, offset: usize, src: &[u8]) {
        self.check(offset, src.len());
        // SAFETY: bounds checked; `src` cannot overlap memory we own exclusively.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.host_ptr().add(offset), src.len());
        }
    }

    /// Copy bytes at `offset` out into `dst`
    pub fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
        self.check(offset, dst.len());
        // SAFETY: bounds checked; `dst` cannot overlap memory we own exclusively.
        unsafe {
            core::ptr::copy_nonoverlapping(self.host_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Fill the whole region with `byte`
    pub fn fill(&self, byte: u8) {
        // SAFETY: the region owns `len` writable bytes.
        unsafe { core::ptr::write_bytes(self.host_ptr(), byte, self.len) }
    }

    /// Exclusive byte view. The caller must not hand the region to the
    /// device while the slice is alive.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `&mut self` guarantees no other CPU-side view exists.
        unsafe { core::slice::from_raw_parts_mut(self.host_ptr(), self.len) }
    }
}
