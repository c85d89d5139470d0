//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the engine on the
//! host without hardware access.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use core::cell::{Cell, RefCell};
use std::alloc::{Layout, alloc_zeroed};
use std::collections::{HashMap, VecDeque};
use std::vec::Vec;

use crate::dmae::{DmaeCommand, Endianness};
use crate::dmae::command::opcode;
use crate::hal::{DmaMemory, DmaRegion, RegisterSpace, ResetStatus, StatusBlock};
use crate::internal::constants::{DMAE_CMD_DWORDS, DMAE_CMD_SLOTS, DMAE_PCI_ERR_FLAG};
use crate::internal::register::{dmae_cmd_mem, dmae_go, doorbell};

/// DMA engine block base; identical on every generation
const DMAE_BASE: u32 = 0x10_2000;

/// Doorbell blocks (E1x, E2)
const DOORBELL_BASES: [u32; 2] = [0x20_0000, 0x40_0000];

// =============================================================================
// Mock DMA Memory
// =============================================================================

/// Identity-mapped DMA allocator: the device address of a region is its host
/// pointer.
///
/// Allocations are never freed, so regions stay valid for the whole test even
/// when the allocator itself is dropped first.
#[derive(Debug, Default)]
pub struct MockMemory {
    /// Successful allocations so far
    allocations: Cell<usize>,
    /// Allocations allowed before `alloc_dma` starts failing
    limit: Option<usize>,
}

impl MockMemory {
    /// Create an allocator without a limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that fails after `limit` allocations
    pub fn with_limit(limit: usize) -> Self {
        Self {
            allocations: Cell::new(0),
            limit: Some(limit),
        }
    }

    /// Number of successful allocations
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Allocate a region holding a copy of `bytes`
    pub fn dma_bytes(&self, bytes: &[u8]) -> DmaRegion {
        let region = self
            .alloc_dma(bytes.len(), 8)
            .expect("mock allocation failed");
        region.write_bytes(0, bytes);
        region
    }
}

impl DmaMemory for MockMemory {
    fn alloc_dma(&self, size: usize, align: usize) -> Option<DmaRegion> {
        if self.limit.is_some_and(|l| self.allocations.get() >= l) {
            return None;
        }
        let layout = Layout::from_size_align(size.max(1), align.max(1)).ok()?;
        // SAFETY: non-zero size; the allocation is intentionally leaked.
        let host = unsafe { alloc_zeroed(layout) };
        self.allocations.set(self.allocations.get() + 1);
        // SAFETY: fresh, exclusively owned allocation of `size` bytes.
        unsafe { DmaRegion::from_raw(host, host as u64, size) }
    }

    fn read_device(&self, addr: u64, dst: &mut [u8]) {
        // SAFETY: identity mapping; tests only pass addresses of live regions.
        unsafe { core::ptr::copy_nonoverlapping(addr as *const u8, dst.as_mut_ptr(), dst.len()) }
    }
}

// =============================================================================
// Mock Registers
// =============================================================================

/// Mock register space with a DMA engine model.
///
/// Register values live in a map keyed by byte offset, which doubles as GRC
/// space for DMA transfers. Writes made by the code under test are logged.
///
/// Writing 1 to a DMA "go" register executes the command in that slot's
/// command memory:
/// - PCI addresses are host pointers (see [`MockMemory`])
/// - byte swapping follows the opcode's endianness
/// - completions go to host memory or, for GRC completions, back into the
///   register map, where they can trigger another slot
/// - a slot without source reset continues from where its last run ended
#[derive(Debug)]
pub struct MockRegisters {
    /// Register values by byte offset
    registers: RefCell<HashMap<u32, u32>>,
    /// Writes made by the code under test: (offset, value)
    write_log: RefCell<Vec<(u32, u32)>>,
    /// Commands executed, in order
    executed: RefCell<Vec<DmaeCommand>>,
    /// Slots triggered but not yet executed
    pending: RefCell<VecDeque<u8>>,
    /// Next source address per slot, for slots without source reset
    cursors: RefCell<HashMap<u8, u64>>,
    /// Execute commands on "go"
    simulate: Cell<bool>,
    /// Accept commands but never complete them
    hang: Cell<bool>,
    /// Flag the next completion with the PCI error bit
    pci_error: Cell<bool>,
    /// Value returned by doorbell queue-depth reads
    doorbell_depth: Cell<u32>,
    running: Cell<bool>,
}

impl Default for MockRegisters {
    fn default() -> Self {
        Self {
            registers: RefCell::default(),
            write_log: RefCell::default(),
            executed: RefCell::default(),
            pending: RefCell::default(),
            cursors: RefCell::default(),
            simulate: Cell::new(true),
            hang: Cell::new(false),
            pci_error: Cell::new(false),
            doorbell_depth: Cell::new(0),
            running: Cell::new(false),
        }
    }
}

impl MockRegisters {
    /// Create a register space with DMA simulation enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable command execution on "go"
    pub fn set_dmae_simulation(&self, enabled: bool) {
        self.simulate.set(enabled);
    }

    /// Make the engine swallow commands without completing them
    pub fn set_dmae_hang(&self, hang: bool) {
        self.hang.set(hang);
    }

    /// Report a PCI error on the next completion
    pub fn fail_next_with_pci_error(&self) {
        self.pci_error.set(true);
    }

    /// Set the doorbell queue depth seen by the doorbell gate
    pub fn set_doorbell_depth(&self, depth: u32) {
        self.doorbell_depth.set(depth);
    }

    /// Read a GRC dword (byte address)
    pub fn grc_read(&self, addr: u32) -> u32 {
        self.registers.borrow().get(&addr).copied().unwrap_or(0)
    }

    /// Store consecutive GRC dwords starting at `addr`
    pub fn grc_fill(&self, addr: u32, words: &[u32]) {
        let mut regs = self.registers.borrow_mut();
        for (i, w) in words.iter().enumerate() {
            regs.insert(addr + (i as u32) * 4, *w);
        }
    }

    /// Writes made by the code under test
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.write_log.borrow().clone()
    }

    /// Clear the write log
    pub fn clear_writes(&self) {
        self.write_log.borrow_mut().clear();
    }

    /// Commands executed so far
    pub fn executed(&self) -> Vec<DmaeCommand> {
        self.executed.borrow().clone()
    }

    fn go_slot(offset: u32) -> Option<u8> {
        let rel = offset.checked_sub(DMAE_BASE)?;
        (0..DMAE_CMD_SLOTS).find(|&s| dmae_go(s) == rel)
    }

    fn row_slot(offset: u32) -> Option<u8> {
        let rel = offset.checked_sub(DMAE_BASE + dmae_cmd_mem(0))?;
        let slot = rel / (DMAE_CMD_DWORDS as u32 * 4);
        (slot < u32::from(DMAE_CMD_SLOTS)).then_some(slot as u8)
    }

    /// Store a value, triggering a command for "go" registers
    fn store(&self, offset: u32, value: u32) {
        self.registers.borrow_mut().insert(offset, value);
        if let Some(slot) = Self::go_slot(offset)
            && value == 1
            && self.simulate.get()
            && !self.hang.get()
        {
            self.pending.borrow_mut().push_back(slot);
            self.run_pending();
        }
    }

    fn run_pending(&self) {
        if self.running.replace(true) {
            return;
        }
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(slot) = next else { break };
            self.execute(slot);
        }
        self.running.set(false);
    }

    fn execute(&self, slot: u8) {
        let row = DMAE_BASE + dmae_cmd_mem(slot);
        let mut words = [0u32; DMAE_CMD_DWORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.grc_read(row + (i as u32) * 4);
        }
        let cmd = DmaeCommand::from_words(&words);
        self.executed.borrow_mut().push(cmd);

        let src_grc = cmd.opcode & opcode::SRC_GRC != 0;
        let dst_grc = cmd.opcode & opcode::DST_MASK == opcode::DST_GRC;
        let endianness = Endianness::from_bits(cmd.opcode >> opcode::ENDIANNESS_SHIFT);

        let src = if cmd.opcode & opcode::SRC_RESET == 0 {
            self.cursors.borrow().get(&slot).copied().unwrap_or(cmd.src)
        } else {
            cmd.src
        };
        let len = usize::from(cmd.len32);

        let mut data: Vec<u32> = (0..len)
            .map(|i| {
                if src_grc {
                    self.grc_read(((src as u32) << 2) + (i as u32) * 4)
                } else {
                    // SAFETY: identity-mapped host memory of a live region.
                    unsafe { core::ptr::read_unaligned((src as *const u32).add(i)) }
                }
            })
            .collect();
        if matches!(endianness, Endianness::DwordSwap | Endianness::ByteDwordSwap) {
            for pair in data.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }
        if endianness.swaps_bytes() {
            for w in &mut data {
                *w = w.swap_bytes();
            }
        }

        for (i, w) in data.iter().enumerate() {
            if dst_grc {
                self.store(((cmd.dst as u32) << 2) + (i as u32) * 4, *w);
            } else {
                // SAFETY: identity-mapped host memory of a live region.
                unsafe { core::ptr::write_unaligned((cmd.dst as *mut u32).add(i), *w) }
            }
        }

        let advance = if src_grc { len as u64 } else { len as u64 * 4 };
        self.cursors.borrow_mut().insert(slot, src + advance);

        if cmd.opcode & opcode::C_TYPE_ENABLE == 0 {
            return;
        }
        if cmd.opcode & opcode::C_DST_GRC != 0 {
            self.store((cmd.comp_addr as u32) << 2, cmd.comp_val);
        } else {
            let mut val = cmd.comp_val;
            if self.pci_error.replace(false) {
                val |= DMAE_PCI_ERR_FLAG;
            }
            let val = endianness.completion_value(val);
            // SAFETY: identity-mapped host memory of a live region.
            unsafe { core::ptr::write_unaligned(cmd.comp_addr as *mut u32, val) }
        }
    }
}

impl RegisterSpace for MockRegisters {
    fn read32(&self, offset: u32) -> u32 {
        if DOORBELL_BASES
            .iter()
            .any(|b| offset == b + doorbell::QUEUE_DEPTH)
        {
            return self.doorbell_depth.get();
        }
        self.grc_read(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.write_log.borrow_mut().push((offset, value));
        if let Some(slot) = Self::row_slot(offset) {
            // reprogrammed row: the next run starts from its own source
            self.cursors.borrow_mut().remove(&slot);
        }
        self.store(offset, value);
    }
}

// =============================================================================
// Mock Reset / Status Block
// =============================================================================

/// Scriptable "reset in progress" flag
#[derive(Debug, Default)]
pub struct MockReset {
    queries: Cell<u32>,
    trigger_after: Cell<Option<u32>>,
    active: Cell<bool>,
}

impl MockReset {
    /// Create a flag that never reports a reset
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a reset from the `n`-th query on (zero-based)
    pub fn trigger_after(&self, n: u32) {
        self.queries.set(0);
        self.trigger_after.set(Some(n));
    }

    /// Force the flag on or off
    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    /// Number of queries so far
    pub fn queries(&self) -> u32 {
        self.queries.get()
    }
}

impl ResetStatus for MockReset {
    fn reset_in_progress(&self) -> bool {
        let n = self.queries.get();
        self.queries.set(n + 1);
        self.active.get() || self.trigger_after.get().is_some_and(|k| n >= k)
    }
}

/// Scriptable transmit consumer indices
#[derive(Debug, Default)]
pub struct MockStatusBlock {
    /// Per queue: values still to hand out, then the last one repeats
    scripts: RefCell<HashMap<u8, VecDeque<u16>>>,
    current: RefCell<HashMap<u8, u16>>,
}

impl MockStatusBlock {
    /// Create a status block with every consumer at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `value` for `queue` from now on
    pub fn set_consumer(&self, queue: u8, value: u16) {
        self.scripts.borrow_mut().remove(&queue);
        self.current.borrow_mut().insert(queue, value);
    }

    /// Report `values` for `queue` one read at a time; the last one sticks
    pub fn script(&self, queue: u8, values: &[u16]) {
        self.scripts
            .borrow_mut()
            .insert(queue, values.iter().copied().collect());
    }
}

impl StatusBlock for MockStatusBlock {
    fn tx_consumer(&self, queue: u8) -> u16 {
        let next = self
            .scripts
            .borrow_mut()
            .get_mut(&queue)
            .and_then(VecDeque::pop_front);
        let mut current = self.current.borrow_mut();
        if let Some(v) = next {
            current.insert(queue, v);
        }
        current.get(&queue).copied().unwrap_or(0)
    }
}

// =============================================================================
// Mock Platform
// =============================================================================

/// Every platform seam in one value
#[derive(Debug, Default)]
pub struct MockPlatform {
    pub regs: MockRegisters,
    pub mem: MockMemory,
    pub reset: MockReset,
    pub status: MockStatusBlock,
}

impl MockPlatform {
    /// Create a platform with DMA simulation enabled
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegisterSpace for MockPlatform {
    fn read32(&self, offset: u32) -> u32 {
        self.regs.read32(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.regs.write32(offset, value);
    }
}

impl DmaMemory for MockPlatform {
    fn alloc_dma(&self, size: usize, align: usize) -> Option<DmaRegion> {
        self.mem.alloc_dma(size, align)
    }

    fn read_device(&self, addr: u64, dst: &mut [u8]) {
        self.mem.read_device(addr, dst);
    }
}

impl ResetStatus for MockPlatform {
    fn reset_in_progress(&self) -> bool {
        self.reset.reset_in_progress()
    }
}

impl StatusBlock for MockPlatform {
    fn tx_consumer(&self, queue: u8) -> u16 {
        self.status.tx_consumer(queue)
    }
}

// =============================================================================
// Mock Delay
// =============================================================================

/// Mock delay for testing without actual timing
///
/// Records delays for verification without actually waiting.
#[derive(Debug, Default)]
pub struct MockDelay {
    /// Total nanoseconds delayed
    total_ns: RefCell<u64>,
}

impl MockDelay {
    /// Create a new mock delay
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total nanoseconds that were "delayed"
    pub fn total_ns(&self) -> u64 {
        *self.total_ns.borrow()
    }

    /// Get total microseconds that were "delayed"
    pub fn total_us(&self) -> u64 {
        self.total_ns() / 1_000
    }

    /// Reset the delay counter
    pub fn reset(&self) {
        *self.total_ns.borrow_mut() = 0;
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.total_ns.borrow_mut() += ns as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmae::{Opcode, Space, submit};
    use crate::internal::constants::DMAE_COMPLETION_VAL;

    #[test]
    fn mock_memory_is_identity_mapped() {
        let mem = MockMemory::new();
        let region = mem.dma_bytes(&[1, 2, 3, 4]);
        assert_eq!(region.device_addr(), region.host_ptr() as u64);
        let mut out = [0u8; 2];
        mem.read_device(region.device_addr() + 1, &mut out);
        assert_eq!(out, [2, 3]);
        assert_eq!(mem.allocations(), 1);
    }

    #[test]
    fn mock_memory_limit() {
        let mem = MockMemory::with_limit(1);
        assert!(mem.alloc_dma(8, 8).is_some());
        assert!(mem.alloc_dma(8, 8).is_none());
    }

    #[test]
    fn mock_registers_log_writes() {
        let regs = MockRegisters::new();
        regs.write32(0x10, 5);
        assert_eq!(regs.read32(0x10), 5);
        assert_eq!(regs.writes(), [(0x10, 5)]);
        regs.clear_writes();
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn mock_dmae_grc_to_host() {
        let regs = MockRegisters::new();
        let mem = MockMemory::new();
        let out = mem.alloc_dma(16, 8).unwrap();
        regs.grc_fill(0x100, &[0xAA]);
        let cmd = DmaeCommand::new(
            Opcode::new(Space::Grc, Space::Pci),
            (Space::Grc, 0x100),
            (Space::Pci, out.device_addr() + 8),
            1,
        )
        .with_host_completion(out.device_addr());
        submit(&regs, DMAE_BASE, 0, &cmd).unwrap();
        assert_eq!(out.read_u32(8), 0xAA);
        assert_eq!(out.read_u32(0), DMAE_COMPLETION_VAL);
        assert_eq!(regs.executed(), [cmd]);
    }

    #[test]
    fn mock_reset_triggers_after_queries() {
        let reset = MockReset::new();
        reset.trigger_after(2);
        assert!(!reset.reset_in_progress());
        assert!(!reset.reset_in_progress());
        assert!(reset.reset_in_progress());
        assert_eq!(reset.queries(), 3);
    }

    #[test]
    fn mock_status_block_script_then_sticky() {
        let status = MockStatusBlock::new();
        assert_eq!(status.tx_consumer(0), 0);
        status.script(0, &[1, 4]);
        assert_eq!(status.tx_consumer(0), 1);
        assert_eq!(status.tx_consumer(0), 4);
        assert_eq!(status.tx_consumer(0), 4);
        status.set_consumer(0, 9);
        assert_eq!(status.tx_consumer(0), 9);
    }

    #[test]
    fn mock_delay_tracking() {
        let mut delay = MockDelay::new();

        embedded_hal::delay::DelayNs::delay_ns(&mut delay, 1000);
        embedded_hal::delay::DelayNs::delay_us(&mut delay, 2);

        assert_eq!(delay.total_ns(), 3000);
        assert_eq!(delay.total_us(), 3);
        delay.reset();
        assert_eq!(delay.total_ns(), 0);
    }
}
