//! Transmit queue
//!
//! One [`TxQueue`] owns one BD ring, its coalescing pool and the FIFO of
//! packets the device has not completed yet. A packet is laid out as:
//!
//! ```text
//! [start BD: frag 0] [parsing BD] [data BD: frag 1] ... [data BD: frag n-1]
//! ```
//!
//! With LSO, a fragment that straddles the end of the headers is described
//! by two BDs (header part, payload part) so header BDs never carry payload.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
#[cfg(feature = "log")]
use log::{debug, error};

use super::coalesce::CoalescePool;
use super::doorbell::DoorbellGate;
use super::packet::{Fragment, PacketState, TxPacket, TxReceipt};
use crate::driver::chip::{Block, ChipProfile, ParseBdLayout};
use crate::driver::config::EngineConfig;
use crate::driver::error::{ConfigResult, TxError, TxRejected};
use crate::hal::{DmaMemory, RegisterSpace};
use crate::internal::constants::MAX_BD_BYTES;
use crate::internal::register::doorbell;
use crate::ring::bits::start_flags;
use crate::ring::{BdPos, BdRing, ParseFields};

// =============================================================================
// Planning
// =============================================================================

/// Where the LSO headers end within the fragment list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct HeaderSplit {
    /// Fragments holding header bytes, the boundary fragment included
    pub header_bds: usize,
    /// Header bytes in the boundary fragment when it also carries payload
    pub split_at: Option<(usize, u32)>,
}

/// Walk `frags` until `hdr_len` bytes are covered.
pub(crate) fn header_walk(frags: &[Fragment], hdr_len: usize) -> HeaderSplit {
    let mut covered = 0usize;
    for (i, frag) in frags.iter().enumerate() {
        covered += frag.len as usize;
        if covered >= hdr_len {
            let over = covered - hdr_len;
            let split_at = (over > 0).then(|| (i, frag.len - over as u32));
            return HeaderSplit {
                header_bds: i + 1,
                split_at,
            };
        }
    }
    HeaderSplit {
        header_bds: frags.len(),
        split_at: None,
    }
}

/// Whether the device could fetch too few BDs to build one segment.
///
/// Packets below `fetch_limit` fragments always fit. Non-LSO packets at or
/// above it never do. For LSO, every run of `fetch_limit - header_bds - 2`
/// consecutive payload fragments must carry at least one MSS.
pub(crate) fn needs_coalesce(
    frags: &[Fragment],
    header_bds: usize,
    fetch_limit: usize,
    lso_mss: Option<u16>,
) -> bool {
    if frags.len() < fetch_limit {
        return false;
    }
    let Some(mss) = lso_mss else {
        return true;
    };
    let wnd = fetch_limit as isize - header_bds as isize - 2;
    if wnd <= 0 {
        return true;
    }
    let payload = frags.get(header_bds..).unwrap_or_default();
    payload
        .windows(wnd as usize)
        .any(|w| w.iter().map(|f| f.len as usize).sum::<usize>() < usize::from(mss))
}

// =============================================================================
// Statistics
// =============================================================================

/// Per-queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxStats {
    /// Packets handed to the device
    pub sent: u32,
    /// Packets linearized before sending
    pub coalesced: u32,
    /// Packets with a BD split at the header boundary
    pub split: u32,
    /// Sends refused for lack of ring slots
    pub ring_full: u32,
    /// Sends refused for lack of a coalescing buffer
    pub pool_empty: u32,
    /// Packets reclaimed after completion
    pub reclaimed: u32,
}

// =============================================================================
// Queue
// =============================================================================

/// One transmit queue.
pub struct TxQueue {
    id: u8,
    ring: BdRing,
    pool: CoalescePool,
    in_flight: VecDeque<TxPacket>,
    pkt_prod: u16,
    pkt_cons: u16,
    fetch_limit: usize,
    layout: ParseBdLayout,
    db_offset: u32,
    stats: TxStats,
}

impl TxQueue {
    /// Allocate the ring and coalescing pool for queue `id`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad ring geometry, `OutOfMemory` when the
    /// platform runs out of DMA memory.
    pub fn new<M: DmaMemory, C: ChipProfile>(
        mem: &M,
        chip: &C,
        config: &EngineConfig,
        id: u8,
    ) -> ConfigResult<Self> {
        let ring = BdRing::new(mem, config.ring_pages, config.slots_per_page)?;
        let pool = CoalescePool::new(mem, config.coalesce_buffers, config.coalesce_buf_size)?;
        Ok(Self {
            id,
            ring,
            pool,
            in_flight: VecDeque::new(),
            pkt_prod: 0,
            pkt_cons: 0,
            fetch_limit: config.fetch_limit,
            layout: chip.parse_bd_layout(),
            db_offset: chip.register_base(Block::Doorbell) + u32::from(id) * chip.doorbell_stride(),
            stats: TxStats::default(),
        })
    }

    /// Queue index
    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// The BD ring
    #[must_use]
    pub const fn ring(&self) -> &BdRing {
        &self.ring
    }

    /// The coalescing pool
    #[must_use]
    pub const fn pool(&self) -> &CoalescePool {
        &self.pool
    }

    /// Counters
    #[must_use]
    pub const fn stats(&self) -> TxStats {
        self.stats
    }

    /// Packets sent but not yet reclaimed
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Packet producer counter
    #[must_use]
    pub const fn pkt_prod(&self) -> u16 {
        self.pkt_prod
    }

    /// Packet consumer counter
    #[must_use]
    pub const fn pkt_cons(&self) -> u16 {
        self.pkt_cons
    }

    /// BAR offset of this queue's doorbell
    #[must_use]
    pub const fn doorbell_offset(&self) -> u32 {
        self.db_offset
    }

    /// Put `packet` on the ring and ring the doorbell.
    ///
    /// # Errors
    ///
    /// The packet comes back untouched inside [`TxRejected`]:
    /// - `InvalidPacket` for malformed fragments or offload parameters, or a
    ///   packet that must be linearized but exceeds one BD
    /// - `NoDescriptorsAvailable` when the ring lacks room
    /// - `NoCoalesceBuffer` when the packet must be linearized and no
    ///   pooled buffer is large enough
    ///
    /// Neither the ring nor the pool changes on error.
    pub fn send<P, D>(
        &mut self,
        platform: &P,
        gate: &DoorbellGate,
        mut packet: TxPacket,
        delay: &mut D,
    ) -> Result<TxReceipt, TxRejected>
    where
        P: RegisterSpace + DmaMemory,
        D: DelayNs,
    {
        if let Err(e) = packet.validate() {
            return Err(TxRejected::new(e, packet));
        }

        let lso = packet.flags.lso;
        let hdr_len = packet.lso_header_len();
        let walk = if lso {
            header_walk(packet.fragments(), hdr_len)
        } else {
            HeaderSplit::default()
        };
        let coalesce = needs_coalesce(
            packet.fragments(),
            walk.header_bds,
            self.fetch_limit,
            lso.then_some(packet.lso.mss),
        );
        // a linearized packet travels in one BD
        if coalesce && packet.total_len() > MAX_BD_BYTES as usize {
            return Err(TxRejected::new(TxError::InvalidPacket, packet));
        }

        let nfrags = if coalesce { 1 } else { packet.fragments().len() };
        if self.ring.avail_slots() < nfrags + 2 {
            self.stats.ring_full = self.stats.ring_full.wrapping_add(1);
            #[cfg(feature = "log")]
            debug!("txq {}: ring full, packet {} not sent", self.id, packet.id);
            return Err(TxRejected::new(TxError::NoDescriptorsAvailable, packet));
        }

        let mut single = [Fragment::new(0, 0)];
        let (frags, walk): (&[Fragment], HeaderSplit) = if coalesce {
            let Some(mut buf) = self.pool.checkout(packet.total_len()) else {
                self.stats.pool_empty = self.stats.pool_empty.wrapping_add(1);
                #[cfg(feature = "log")]
                debug!("txq {}: no coalescing buffer for packet {}", self.id, packet.id);
                return Err(TxRejected::new(TxError::NoCoalesceBuffer, packet));
            };
            single[0] = buf.linearize(platform, packet.fragments());
            packet.coalesce = Some(buf);
            let walk = if lso {
                header_walk(&single, hdr_len)
            } else {
                HeaderSplit::default()
            };
            (&single, walk)
        } else {
            (packet.fragments(), walk)
        };

        let prod_before = self.ring.prod_index();
        let hw_before = self.ring.hw_prod();

        // start BD
        let start_pos = self.ring.produce();
        let start = self.ring.slot(start_pos).start();
        let first = frags[0];
        let first_len = match walk.split_at {
            Some((0, head)) => head,
            _ => first.len,
        };
        start.init(first.addr, first_len as u16);
        if packet.flags.vlan {
            start.set_vlan(packet.vlan_tag, true);
        } else {
            start.set_vlan(self.pkt_prod, false);
        }
        start.add_flags(start_bd_flags(&packet));

        // parsing BD, filled once the data BDs are down
        let parse_pos = self.ring.produce();
        self.ring.slot(parse_pos).clear();

        if let Some((0, head)) = walk.split_at {
            self.push_data(first.addr + u64::from(head), first.len - head);
        }
        let mut first_data: Option<BdPos> = None;
        for (i, frag) in frags.iter().enumerate().skip(1) {
            let pos = match walk.split_at {
                Some((at, head)) if at == i => {
                    let pos = self.push_data(frag.addr, head);
                    self.push_data(frag.addr + u64::from(head), frag.len - head);
                    pos
                }
                _ => self.push_data(frag.addr, frag.len),
            };
            first_data.get_or_insert(pos);
        }

        let total_bytes = frags.iter().map(|f| f.len).sum::<u32>();
        if !lso {
            if let Some(pos) = first_data {
                self.ring
                    .slot(pos)
                    .data()
                    .set_total_pkt_bytes(total_bytes as u16);
            }
        }

        self.fill_parse_bd(parse_pos, &packet);

        let nbd = self.ring.hw_prod().wrapping_sub(hw_before);
        let bd_count = self.ring.prod_index().wrapping_sub(prod_before);
        let hdr_nbds = if lso { walk.header_bds } else { 1 };
        let start = self.ring.slot(start_pos).start();
        start.set_nbd(nbd);
        start.set_general(packet.addr_type(), hdr_nbds as u8);

        let split = walk.split_at.is_some();
        let coalesced = packet.is_coalesced();
        packet.state = PacketState::Queued;
        packet.bd_count = bd_count;
        packet.end_index = self.ring.prod_index();
        self.in_flight.push_back(packet);
        self.pkt_prod = self.pkt_prod.wrapping_add(1);

        self.stats.sent = self.stats.sent.wrapping_add(1);
        if coalesced {
            self.stats.coalesced = self.stats.coalesced.wrapping_add(1);
        }
        if split {
            self.stats.split = self.stats.split.wrapping_add(1);
        }

        platform.barrier();
        gate.ring(
            platform,
            delay,
            self.db_offset,
            doorbell::value(self.ring.hw_prod()),
        );

        Ok(TxReceipt {
            bd_count,
            nbd,
            total_bytes,
            coalesced,
            split,
        })
    }

    fn push_data(&mut self, addr: u64, len: u32) -> BdPos {
        let pos = self.ring.produce();
        self.ring.slot(pos).data().init(addr, len as u16);
        pos
    }

    fn fill_parse_bd(&self, pos: BdPos, packet: &TxPacket) {
        let offload = packet.flags.lso || packet.flags.l4_checksum || packet.flags.ip_checksum;
        let fields = ParseFields {
            addr_type: packet.addr_type(),
            dst_mac: packet.dst_mac,
            eth_hlen: packet.eth_hlen(),
            ip_hlen: if offload { packet.ip_hlen } else { 0 },
            tcp_hlen: if offload { packet.l4_hlen } else { 0 },
            llc_snap: packet.flags.llc_snap,
            ipv6_ext: packet.flags.ipv6_ext,
            mss: if packet.flags.lso { packet.lso.mss } else { 0 },
            tcp_seq: packet.lso.tcp_seq,
            ip_id: packet.lso.ip_id,
            tcp_flags: packet.lso.tcp_flags,
            pseudo_csum: packet.pseudo_csum,
        };
        let slot = self.ring.slot(pos);
        match self.layout {
            ParseBdLayout::E1x => slot.parse_e1x().fill(&fields),
            ParseBdLayout::E2 => slot.parse_e2().fill(&fields),
        }
    }

    /// Retire completed packets in send order.
    ///
    /// `hw_cons` returns the device's packet consumer and is re-read after
    /// every packet, so completions that land mid-loop are picked up too.
    /// Returns the number of packets appended to `sent`.
    ///
    /// # Panics
    ///
    /// When the device reports more completions than packets were sent. The
    /// ring and the device no longer agree and nothing sensible can follow.
    pub fn reclaim<F>(&mut self, mut hw_cons: F, sent: &mut Vec<TxPacket>) -> usize
    where
        F: FnMut() -> u16,
    {
        let mut n = 0;
        let mut hw = hw_cons();
        while (hw.wrapping_sub(self.pkt_cons) as i16) > 0 {
            let Some(mut packet) = self.in_flight.pop_front() else {
                #[cfg(feature = "log")]
                error!(
                    "txq {}: completion {} with nothing in flight (pkt_cons {}, pkt_prod {}, bd cons {})",
                    self.id,
                    hw,
                    self.pkt_cons,
                    self.pkt_prod,
                    self.ring.cons_index()
                );
                panic!(
                    "txq {}: hardware consumer {hw} ahead of software producer {}",
                    self.id, self.pkt_prod
                );
            };
            self.ring.consume(usize::from(packet.bd_count));
            if let Some(buf) = packet.coalesce.take() {
                self.pool.give_back(buf);
            }
            packet.state = PacketState::Reclaimed;
            sent.push(packet);
            self.pkt_cons = self.pkt_cons.wrapping_add(1);
            n += 1;
            hw = hw_cons();
        }
        self.stats.reclaimed = self.stats.reclaimed.wrapping_add(n as u32);
        n
    }
}

fn start_bd_flags(packet: &TxPacket) -> u8 {
    let f = packet.flags;
    let mut bits = 0;
    if f.ip_checksum {
        bits |= start_flags::IP_CSUM;
    }
    if f.l4_checksum {
        bits |= start_flags::L4_CSUM;
    }
    if f.udp {
        bits |= start_flags::IS_UDP;
    }
    if f.lso {
        bits |= start_flags::SW_LSO;
    }
    if f.ipv6 {
        bits |= start_flags::IPV6;
    }
    bits
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::driver::chip::{Chip, ChipFamily};
    use crate::hal::DmaRegion;
    use crate::ring::bits::addr_type;
    use crate::test_utils::{MockDelay, MockPlatform};
    use crate::tx::packet::LsoParams;
    use std::vec;
    use std::vec::Vec;

    const DB_E2: u32 = 0x40_0000;

    struct Fixture {
        p: MockPlatform,
        gate: DoorbellGate,
        q: TxQueue,
        delay: MockDelay,
    }

    impl Fixture {
        fn new(config: EngineConfig) -> Self {
            let p = MockPlatform::new();
            let gate = DoorbellGate::new(&config.chip, &config);
            let q = TxQueue::new(&p, &config.chip, &config, 0).unwrap();
            Self {
                p,
                gate,
                q,
                delay: MockDelay::new(),
            }
        }

        fn small() -> Self {
            Self::new(EngineConfig::new().with_ring_geometry(1, 17))
        }

        fn send(&mut self, packet: TxPacket) -> Result<TxReceipt, TxRejected> {
            self.q.send(&self.p, &self.gate, packet, &mut self.delay)
        }

        fn reclaim_to(&mut self, hw: u16) -> Vec<TxPacket> {
            let mut sent = Vec::new();
            self.q.reclaim(|| hw, &mut sent);
            sent
        }

        fn bd_lens(&self, n: usize) -> Vec<u16> {
            // skip the parsing BD at offset 1
            (0..n)
                .filter(|&i| i != 1)
                .map(|i| {
                    let slot = self.q.ring.slot_from_cons(i);
                    if i == 0 {
                        slot.start().nbytes()
                    } else {
                        slot.data().nbytes()
                    }
                })
                .collect()
        }
    }

    fn frags(lens: &[u32]) -> Vec<Fragment> {
        lens.iter()
            .enumerate()
            .map(|(i, &len)| Fragment::new(0x10_0000 * (i as u64 + 1), len))
            .collect()
    }

    fn packet(id: u64, lens: &[u32]) -> TxPacket {
        frags(lens)
            .into_iter()
            .fold(TxPacket::new(id), |p, f| p.with_fragment(f.addr, f.len))
    }

    fn lso(mss: u16) -> LsoParams {
        LsoParams {
            mss,
            tcp_seq: 0x1000_0000,
            ip_id: 0x42,
            tcp_flags: 0x18,
        }
    }

    fn real_fragments(p: &MockPlatform, lens: &[usize]) -> (Vec<DmaRegion>, TxPacket) {
        let regions: Vec<DmaRegion> = lens
            .iter()
            .enumerate()
            .map(|(i, &len)| p.mem.dma_bytes(&vec![i as u8; len]))
            .collect();
        let pkt = regions
            .iter()
            .fold(TxPacket::new(0), |pkt, r| pkt.with_fragment(r.device_addr(), r.len() as u32));
        (regions, pkt)
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    #[test]
    fn header_walk_exact_boundary() {
        let w = header_walk(&frags(&[54, 1000, 1000]), 54);
        assert_eq!(w.header_bds, 1);
        assert_eq!(w.split_at, None);
    }

    #[test]
    fn header_walk_boundary_inside_fragment() {
        let w = header_walk(&frags(&[20, 100, 900]), 54);
        assert_eq!(w.header_bds, 2);
        assert_eq!(w.split_at, Some((1, 34)));
    }

    #[test]
    fn non_lso_coalesces_only_at_fetch_limit() {
        assert!(!needs_coalesce(&frags(&[10; 12]), 0, 13, None));
        assert!(needs_coalesce(&frags(&[10; 13]), 0, 13, None));
    }

    #[test]
    fn lso_window_below_mss_coalesces() {
        let mut lens = vec![54];
        lens.extend([100; 12]);
        // window of 10 payload fragments carries 1000 < 1460 bytes
        assert!(needs_coalesce(&frags(&lens), 1, 13, Some(1460)));

        let mut lens = vec![54];
        lens.extend([1000; 12]);
        assert!(!needs_coalesce(&frags(&lens), 1, 13, Some(1460)));
    }

    #[test]
    fn lso_window_checks_every_position() {
        // one thin stretch late in the packet is enough
        let mut lens = vec![54];
        lens.extend([1000; 4]);
        lens.extend([10; 10]);
        assert!(needs_coalesce(&frags(&lens), 1, 13, Some(1460)));
    }

    #[test]
    fn lso_without_window_room_coalesces() {
        let mut lens = vec![10; 11];
        lens.extend([1000; 2]);
        assert!(needs_coalesce(&frags(&lens), 11, 13, Some(1460)));
    }

    // -------------------------------------------------------------------------
    // Send
    // -------------------------------------------------------------------------

    #[test]
    fn three_fragment_packet() {
        let mut f = Fixture::small();
        assert_eq!(f.q.ring.capacity(), 16);
        let before = f.q.ring.avail_slots();

        let r = f.send(packet(1, &[64, 200, 1400])).unwrap();

        // start BD carries fragment 0, so 4 slots rather than start + parse + 3
        assert_eq!(r.bd_count, 4);
        assert_eq!(r.nbd, 4);
        assert_eq!(r.total_bytes, 1664);
        assert!(!r.coalesced && !r.split);
        assert_eq!(before - f.q.ring.avail_slots(), 4);

        let start = f.q.ring.slot_from_cons(0).start();
        assert_eq!(start.addr(), 0x10_0000);
        assert_eq!(start.nbd(), 4);
        assert_eq!(start.hdr_nbds(), 1);
        assert_ne!(start.flags() & start_flags::START_BD, 0);
        assert_eq!(f.q.ring.slot_from_cons(2).data().total_pkt_bytes(), 1664);
        assert_eq!(f.bd_lens(4), [64, 200, 1400]);
        assert_eq!(f.q.pending(), 1);
        assert_eq!(f.q.pkt_prod(), 1);
    }

    #[test]
    fn doorbell_carries_hw_producer() {
        let mut f = Fixture::small();
        f.send(packet(1, &[64, 200])).unwrap();
        f.send(packet(2, &[60])).unwrap();
        assert_eq!(
            f.p.regs.writes(),
            [(DB_E2, doorbell::value(3)), (DB_E2, doorbell::value(5))]
        );
    }

    #[test]
    fn doorbell_offset_follows_queue_stride() {
        let p = MockPlatform::new();
        let config = EngineConfig::new();
        let q = TxQueue::new(&p, &config.chip, &config, 3).unwrap();
        assert_eq!(q.doorbell_offset(), DB_E2 + 3 * doorbell::STRIDE_E2);
        let e1 = EngineConfig::new().with_chip(Chip::new(ChipFamily::E1H));
        let q = TxQueue::new(&p, &e1.chip, &e1, 1).unwrap();
        assert_eq!(q.doorbell_offset(), 0x20_0000 + doorbell::STRIDE_E1X);
    }

    #[test]
    fn padding_tag_without_vlan() {
        let mut f = Fixture::small();
        f.send(packet(1, &[60])).unwrap();
        f.send(packet(2, &[60])).unwrap();
        let second = f.q.ring.slot_from_cons(2).start();
        assert_eq!(second.vlan(), 1);
        assert_eq!(second.flags() & start_flags::VLAN_MODE_MASK, 0);
    }

    #[test]
    fn vlan_and_checksum_flags() {
        let mut f = Fixture::small();
        let pkt = packet(1, &[60, 100])
            .with_vlan(100)
            .with_checksum(20, 8, true)
            .with_dst_mac([0xFF; 6]);
        f.send(pkt).unwrap();

        let start = f.q.ring.slot_from_cons(0).start();
        assert_eq!(start.vlan(), 100);
        assert_ne!(start.flags() & start_flags::VLAN_MODE_MASK, 0);
        let flags = start.flags();
        assert_ne!(flags & start_flags::IP_CSUM, 0);
        assert_ne!(flags & start_flags::L4_CSUM, 0);
        assert_ne!(flags & start_flags::IS_UDP, 0);
        assert_eq!(flags & start_flags::SW_LSO, 0);
        assert_eq!(start.addr_type(), addr_type::BROADCAST);

        let parse = f.q.ring.slot_from_cons(1).parse_e2();
        assert_eq!(parse.dst_mac(), [0xFF; 6]);
        // 18-byte VLAN Ethernet header + 20-byte IP header
        assert_eq!(parse.l4_hdr_start(), 38);
    }

    #[test]
    fn lso_boundary_on_fragment_edge() {
        let mut f = Fixture::new(EngineConfig::new());
        let pkt = packet(1, &[54, 1000, 1000]).with_lso(20, 20, lso(1460));
        let r = f.send(pkt).unwrap();

        assert_eq!(r.bd_count, 4);
        assert!(!r.split && !r.coalesced);
        let start = f.q.ring.slot_from_cons(0).start();
        assert_eq!(start.hdr_nbds(), 1);
        assert_ne!(start.flags() & start_flags::SW_LSO, 0);
        assert_eq!(f.q.ring.slot_from_cons(1).parse_e2().mss(), 1460);
        // LSO packets carry no total-length annotation
        assert_eq!(f.q.ring.slot_from_cons(2).data().total_pkt_bytes(), 0);
    }

    #[test]
    fn lso_split_in_first_fragment() {
        let mut f = Fixture::new(EngineConfig::new());
        let pkt = packet(1, &[100, 500, 500]).with_lso(20, 20, lso(1460));
        let r = f.send(pkt).unwrap();

        assert!(r.split);
        assert_eq!(r.bd_count, 5);
        assert_eq!(r.nbd, 5);
        assert_eq!(f.bd_lens(5), [54, 46, 500, 500]);
        assert_eq!(f.bd_lens(5).iter().map(|&l| u32::from(l)).sum::<u32>(), 1100);
        let start = f.q.ring.slot_from_cons(0).start();
        assert_eq!(start.nbd(), 5);
        assert_eq!(start.hdr_nbds(), 1);
        assert_eq!(f.q.ring.slot_from_cons(2).data().addr(), 0x10_0000 + 54);
        assert_eq!(f.q.stats().split, 1);
    }

    #[test]
    fn lso_split_in_later_fragment() {
        let mut f = Fixture::new(EngineConfig::new());
        let pkt = packet(1, &[20, 100, 900]).with_lso(20, 20, lso(1460));
        let r = f.send(pkt).unwrap();

        assert!(r.split);
        assert_eq!(f.bd_lens(5), [20, 34, 66, 900]);
        assert_eq!(r.total_bytes, 1020);
        // start BD and the 34-byte head hold the headers
        assert_eq!(f.q.ring.slot_from_cons(0).start().hdr_nbds(), 2);
        assert_eq!(f.q.ring.slot_from_cons(3).data().addr(), 0x20_0000 + 34);
    }

    #[test]
    fn e1x_parsing_bd() {
        let config = EngineConfig::new().with_chip(Chip::new(ChipFamily::E1));
        let mut f = Fixture::new(config);
        let pkt = packet(1, &[54, 3000])
            .with_lso(20, 20, lso(1460))
            .with_pseudo_csum(0xBEEF);
        f.send(pkt).unwrap();

        let parse = f.q.ring.slot_from_cons(1).parse_e1x();
        assert_eq!(parse.total_hlen(), 54);
        assert_eq!(parse.mss(), 1460);
        assert_eq!(parse.tcp_seq(), 0x1000_0000);
        assert_eq!(parse.ip_id(), 0x42);
        assert_eq!(parse.pseudo_csum(), 0xBEEF);
        assert_eq!(parse.addr_type(), addr_type::UNICAST);
    }

    #[test]
    fn nbd_counts_link_bd_crossing() {
        // 2 pages of 4 slots: 3 usable each
        let config = EngineConfig::new()
            .with_ring_geometry(2, 4)
            .with_fetch_limit(4);
        let mut f = Fixture::new(config);
        f.send(packet(1, &[60])).unwrap();
        let r = f.send(packet(2, &[60, 60])).unwrap();
        // BD 2 ends page 0, the next two sit on page 1
        assert_eq!(r.bd_count, 3);
        assert_eq!(r.nbd, 4);
        assert_eq!(f.q.ring.hw_prod(), 6);
    }

    #[test]
    fn ring_full_is_side_effect_free() {
        let mut f = Fixture::small();
        for i in 0..3 {
            f.send(packet(i, &[60, 60, 60])).unwrap();
        }
        assert_eq!(f.q.ring.avail_slots(), 4);
        let writes = f.p.regs.writes().len();
        let prod = f.q.ring.prod_index();

        let err = f.send(packet(9, &[60, 60, 60])).unwrap_err();
        assert_eq!(err.error, TxError::NoDescriptorsAvailable);
        assert_eq!(err.packet.id, 9);
        assert_eq!(err.packet.fragments().len(), 3);
        assert_eq!(f.q.ring.prod_index(), prod);
        assert_eq!(f.p.regs.writes().len(), writes);
        assert_eq!(f.q.pkt_prod(), 3);
        assert_eq!(f.q.stats().ring_full, 1);
    }

    #[test]
    fn invalid_packet_is_returned() {
        let mut f = Fixture::small();
        let err = f.send(TxPacket::new(5)).unwrap_err();
        assert_eq!(err.error, TxError::InvalidPacket);
        assert_eq!(err.packet.id, 5);
        assert!(f.p.regs.writes().is_empty());
    }

    // -------------------------------------------------------------------------
    // Coalescing
    // -------------------------------------------------------------------------

    #[test]
    fn over_fragmented_packet_is_linearized() {
        let config = EngineConfig::new().with_coalesce_pool(1, 2048);
        let mut f = Fixture::new(config);
        let (_frags, pkt) = real_fragments(&f.p, &[10; 13]);

        let r = f.send(pkt).unwrap();
        assert!(r.coalesced);
        assert_eq!(r.bd_count, 2);
        assert_eq!(r.total_bytes, 130);

        let start = f.q.ring.slot_from_cons(0).start();
        assert_eq!(start.nbytes(), 130);
        let mut copy = [0u8; 130];
        f.p.mem.read_device(start.addr(), &mut copy);
        assert!(copy.chunks(10).enumerate().all(|(i, c)| c.iter().all(|&b| b == i as u8)));
        assert_eq!(f.q.pool().available(), 0);
        assert_eq!(f.q.stats().coalesced, 1);
    }

    #[test]
    fn coalesced_lso_splits_its_single_buffer() {
        let config = EngineConfig::new().with_coalesce_pool(1, 4096);
        let mut f = Fixture::new(config);
        let mut lens = vec![54];
        lens.extend([100; 12]);
        let (_frags, pkt) = real_fragments(&f.p, &lens);

        let r = f.send(pkt.with_lso(20, 20, lso(1460))).unwrap();
        assert!(r.coalesced && r.split);
        assert_eq!(f.bd_lens(3), [54, 1200]);
        assert_eq!(f.q.ring.slot_from_cons(0).start().hdr_nbds(), 1);
    }

    #[test]
    fn oversized_coalesced_lso_is_rejected_untouched() {
        // window of ten 10-byte fragments stays below the MSS
        let mut f = Fixture::new(EngineConfig::new().with_coalesce_pool(0, 0));
        let big = f.p.mem.alloc_dma(0x2_0000, 64).unwrap();
        f.q.pool = CoalescePool::from_regions([big]);

        let mut lens = vec![54];
        lens.extend([10; 10]);
        lens.extend([40_000, 40_000]);
        let (_frags, pkt) = real_fragments(&f.p, &lens);
        let pkt = pkt.with_lso(20, 20, lso(1460));
        assert_eq!(pkt.total_len(), 80_154);

        let prod = f.q.ring.prod_index();
        let writes = f.p.regs.writes().len();
        let err = f.send(pkt).unwrap_err();
        assert_eq!(err.error, TxError::InvalidPacket);
        assert_eq!(f.q.ring.prod_index(), prod);
        assert_eq!(f.q.pool().available(), 1);
        assert_eq!(f.p.regs.writes().len(), writes);
    }

    #[test]
    fn coalesced_bd_lengths_sum_to_packet_size() {
        let config = EngineConfig::new().with_coalesce_pool(1, 0xFFFF);
        let mut f = Fixture::new(config);
        let mut lens = vec![54];
        lens.extend([10; 10]);
        lens.extend([30_000, 30_000]);
        let (_frags, pkt) = real_fragments(&f.p, &lens);

        let r = f.send(pkt.with_lso(20, 20, lso(1460))).unwrap();
        assert!(r.coalesced);
        assert_eq!(r.total_bytes, 60_154);
        let sum: u32 = f.bd_lens(3).iter().map(|&l| u32::from(l)).sum();
        assert_eq!(sum, r.total_bytes);
    }

    #[test]
    fn pool_exhaustion_then_recycle() {
        let config = EngineConfig::new().with_coalesce_pool(1, 2048);
        let mut f = Fixture::new(config);
        let (_a, first) = real_fragments(&f.p, &[10; 13]);
        let (_b, second) = real_fragments(&f.p, &[10; 13]);

        f.send(first).unwrap();
        let prod = f.q.ring.prod_index();
        let err = f.send(second).unwrap_err();
        assert_eq!(err.error, TxError::NoCoalesceBuffer);
        assert_eq!(f.q.ring.prod_index(), prod);
        assert_eq!(f.q.stats().pool_empty, 1);

        let done = f.reclaim_to(1);
        assert_eq!(done.len(), 1);
        assert!(!done[0].is_coalesced());
        assert_eq!(f.q.pool().available(), 1);

        let r = f.send(err.packet).unwrap();
        assert!(r.coalesced);
        assert_eq!(f.q.pool().available(), 0);
    }

    #[test]
    fn ring_space_is_checked_before_pool() {
        let config = EngineConfig::new()
            .with_ring_geometry(1, 17)
            .with_coalesce_pool(2, 2048);
        let mut f = Fixture::new(config);
        for i in 0..7 {
            f.send(packet(i, &[60])).unwrap();
        }
        assert_eq!(f.q.ring.avail_slots(), 2);
        let (_frags, pkt) = real_fragments(&f.p, &[10; 13]);
        // coalescing would need 3 slots (start + parse + split reserve)
        let err = f.send(pkt).unwrap_err();
        assert_eq!(err.error, TxError::NoDescriptorsAvailable);
        assert_eq!(f.q.pool().available(), 2);
    }

    // -------------------------------------------------------------------------
    // Reclaim
    // -------------------------------------------------------------------------

    #[test]
    fn round_trip_restores_ring() {
        let mut f = Fixture::small();
        let before = f.q.ring.avail_slots();
        f.send(packet(42, &[64, 200, 1400])).unwrap();

        let done = f.reclaim_to(1);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, 42);
        assert_eq!(done[0].state(), PacketState::Reclaimed);
        assert_eq!(done[0].fragments(), frags(&[64, 200, 1400]).as_slice());
        assert_eq!(f.q.ring.avail_slots(), before);
        assert_eq!(f.q.pending(), 0);
        assert_eq!(f.q.stats().reclaimed, 1);
    }

    #[test]
    fn reclaim_stops_at_hardware_consumer() {
        let mut f = Fixture::small();
        for i in 0..3 {
            f.send(packet(i, &[60])).unwrap();
        }
        let done = f.reclaim_to(2);
        assert_eq!(done.iter().map(|p| p.id).collect::<Vec<_>>(), [0, 1]);
        assert_eq!(f.q.pending(), 1);
        assert!(f.reclaim_to(2).is_empty());
    }

    #[test]
    fn reclaim_rereads_consumer_each_packet() {
        let mut f = Fixture::small();
        for i in 0..3 {
            f.send(packet(i, &[60])).unwrap();
        }
        // device finishes the rest while the first is being retired
        let mut reads = [1u16, 3, 3].into_iter();
        let mut sent = Vec::new();
        let n = f.q.reclaim(|| reads.next().unwrap_or(3), &mut sent);
        assert_eq!(n, 3);
        assert_eq!(f.q.pkt_cons(), 3);
    }

    #[test]
    fn send_reclaim_across_index_wrap() {
        let config = EngineConfig::new()
            .with_ring_geometry(2, 8)
            .with_fetch_limit(4);
        let mut f = Fixture::new(config);
        let cap = f.q.ring.capacity();
        for i in 0..70_000u32 {
            let lens: &[u32] = if i % 3 == 0 { &[60, 60] } else { &[60] };
            f.send(packet(u64::from(i), lens)).unwrap();
            let done = f.reclaim_to(f.q.pkt_prod());
            assert_eq!(done.len(), 1);
            assert_eq!(f.q.ring.avail_slots(), cap);
        }
        assert_eq!(f.q.pkt_prod(), 70_000u32 as u16);
    }

    #[test]
    #[should_panic(expected = "ahead of software producer")]
    fn completion_without_packet_panics() {
        let mut f = Fixture::small();
        f.reclaim_to(1);
    }
}
