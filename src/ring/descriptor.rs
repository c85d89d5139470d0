//! Transmit buffer descriptors
//!
//! Every slot in the BD chain is 16 bytes: four little-endian dwords. What the
//! dwords mean depends on the role of the slot within a packet, so a
//! [`BdSlot`] is raw storage and the typed views ([`StartBd`], [`DataBd`],
//! [`ParseBdE1x`], [`ParseBdE2`], [`LinkBd`]) interpret it.

use super::bits::{
    data_w2, e1x_w0, e1x_w1, e1x_w2, e2_parsing, general, start_flags, start_w2, start_w3,
};

// =============================================================================
// Volatile Cell
// =============================================================================

/// A cell whose every access is volatile.
///
/// BD memory is read by the device behind the compiler's back; plain loads
/// and stores could be merged or elided.
#[repr(transparent)]
pub(crate) struct VolatileCell<T: Copy> {
    value: core::cell::UnsafeCell<T>,
}

// Safety: dword volatile accesses are single bus transactions; ring slots are
// only written by the owning transmit queue.
unsafe impl<T: Copy> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Read the value (volatile read)
    #[inline(always)]
    pub fn get(&self) -> T {
        // SAFETY: the cell always holds an initialized `T`.
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Write a value (volatile write)
    #[inline(always)]
    pub fn set(&self, value: T) {
        // SAFETY: see `get`.
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }

    /// Read-modify-write
    #[inline(always)]
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(T) -> T,
    {
        let old = self.get();
        self.set(f(old));
    }
}

// =============================================================================
// Raw Slot
// =============================================================================

/// One 16-byte ring slot.
#[repr(C, align(16))]
pub struct BdSlot {
    words: [VolatileCell<u32>; 4],
}

impl BdSlot {
    /// Size of a slot in bytes
    pub const SIZE: usize = 16;

    /// Read dword `i` (host order)
    #[inline(always)]
    #[must_use]
    pub fn word(&self, i: usize) -> u32 {
        u32::from_le(self.words[i].get())
    }

    /// Write dword `i` (host order)
    #[inline(always)]
    pub fn set_word(&self, i: usize, value: u32) {
        self.words[i].set(value.to_le());
    }

    #[inline(always)]
    fn update_word(&self, i: usize, f: impl FnOnce(u32) -> u32) {
        self.words[i].update(|raw| f(u32::from_le(raw)).to_le());
    }

    /// Zero all four dwords
    pub fn clear(&self) {
        for w in &self.words {
            w.set(0);
        }
    }

    /// Buffer address held in dwords 0/1 (all BD kinds except parsing BDs)
    #[inline(always)]
    #[must_use]
    pub fn addr(&self) -> u64 {
        (u64::from(self.word(1)) << 32) | u64::from(self.word(0))
    }

    #[inline(always)]
    fn set_addr(&self, addr: u64) {
        self.set_word(0, addr as u32);
        self.set_word(1, (addr >> 32) as u32);
    }

    /// View as a start BD
    #[inline(always)]
    #[must_use]
    pub fn start(&self) -> StartBd<'_> {
        StartBd(self)
    }

    /// View as a data BD
    #[inline(always)]
    #[must_use]
    pub fn data(&self) -> DataBd<'_> {
        DataBd(self)
    }

    /// View as an E1/E1H parsing BD
    #[inline(always)]
    #[must_use]
    pub fn parse_e1x(&self) -> ParseBdE1x<'_> {
        ParseBdE1x(self)
    }

    /// View as an E2 parsing BD
    #[inline(always)]
    #[must_use]
    pub fn parse_e2(&self) -> ParseBdE2<'_> {
        ParseBdE2(self)
    }

    /// View as a page link BD
    #[inline(always)]
    #[must_use]
    pub fn link(&self) -> LinkBd<'_> {
        LinkBd(self)
    }
}

// =============================================================================
// Start BD
// =============================================================================

/// First BD of a packet: first buffer, BD count, flags, header BD count.
#[derive(Clone, Copy)]
pub struct StartBd<'a>(&'a BdSlot);

impl StartBd<'_> {
    /// Write address and length of the first buffer and mark the slot as a
    /// packet start. Every other field is cleared.
    pub fn init(&self, addr: u64, nbytes: u16) {
        self.0.set_addr(addr);
        self.0.set_word(2, u32::from(nbytes) << start_w2::NBYTES_SHIFT);
        self.0
            .set_word(3, u32::from(start_flags::START_BD) << start_w3::FLAGS_SHIFT);
    }

    /// Buffer address
    #[must_use]
    pub fn addr(&self) -> u64 {
        self.0.addr()
    }

    /// First buffer length
    #[must_use]
    pub fn nbytes(&self) -> u16 {
        (self.0.word(2) >> start_w2::NBYTES_SHIFT) as u16
    }

    /// Shrink or grow the first buffer
    pub fn set_nbytes(&self, nbytes: u16) {
        self.0.update_word(2, |w| {
            (w & start_w2::NBD_MASK) | (u32::from(nbytes) << start_w2::NBYTES_SHIFT)
        });
    }

    /// BDs in the packet, link BDs included
    #[must_use]
    pub fn nbd(&self) -> u16 {
        (self.0.word(2) & start_w2::NBD_MASK) as u16
    }

    /// Set the BD count
    pub fn set_nbd(&self, nbd: u16) {
        self.0
            .update_word(2, |w| (w & !start_w2::NBD_MASK) | u32::from(nbd));
    }

    /// VLAN tag or padding tag
    #[must_use]
    pub fn vlan(&self) -> u16 {
        (self.0.word(3) & start_w3::VLAN_MASK) as u16
    }

    /// Store a VLAN tag (with VLAN insertion) or a padding tag
    pub fn set_vlan(&self, tag: u16, insert: bool) {
        use super::bits::vlan_mode;
        let mode = if insert {
            vlan_mode::INSERT
        } else {
            vlan_mode::NONE
        };
        self.0.update_word(3, |w| {
            (w & !start_w3::VLAN_MASK) | u32::from(tag)
        });
        self.update_flags(|f| {
            (f & !start_flags::VLAN_MODE_MASK) | (mode << start_flags::VLAN_MODE_SHIFT)
        });
    }

    /// `bd_flags` byte
    #[must_use]
    pub fn flags(&self) -> u8 {
        (self.0.word(3) >> start_w3::FLAGS_SHIFT) as u8
    }

    /// OR `bits` into `bd_flags`
    pub fn add_flags(&self, bits: u8) {
        self.update_flags(|f| f | bits);
    }

    fn update_flags(&self, f: impl FnOnce(u8) -> u8) {
        self.0.update_word(3, |w| {
            let flags = f((w >> start_w3::FLAGS_SHIFT) as u8);
            (w & !(0xFF << start_w3::FLAGS_SHIFT)) | (u32::from(flags) << start_w3::FLAGS_SHIFT)
        });
    }

    /// Ethernet address type
    #[must_use]
    pub fn addr_type(&self) -> u8 {
        self.general() & general::ADDR_TYPE_MASK
    }

    /// Number of header BDs
    #[must_use]
    pub fn hdr_nbds(&self) -> u8 {
        (self.general() >> general::HDR_NBDS_SHIFT) & general::HDR_NBDS_MASK
    }

    /// Write address type and header BD count
    pub fn set_general(&self, addr_type: u8, hdr_nbds: u8) {
        let data = (addr_type & general::ADDR_TYPE_MASK)
            | ((hdr_nbds & general::HDR_NBDS_MASK) << general::HDR_NBDS_SHIFT);
        self.0.update_word(3, |w| {
            (w & !(0xFF << start_w3::GENERAL_SHIFT)) | (u32::from(data) << start_w3::GENERAL_SHIFT)
        });
    }

    fn general(&self) -> u8 {
        (self.0.word(3) >> start_w3::GENERAL_SHIFT) as u8
    }
}

// =============================================================================
// Data BD
// =============================================================================

/// Continuation buffer of a packet.
#[derive(Clone, Copy)]
pub struct DataBd<'a>(&'a BdSlot);

impl DataBd<'_> {
    /// Write address and length; clears the total-bytes annotation
    pub fn init(&self, addr: u64, nbytes: u16) {
        self.0.set_addr(addr);
        self.0.set_word(2, u32::from(nbytes) << data_w2::NBYTES_SHIFT);
        self.0.set_word(3, 0);
    }

    /// Buffer address
    #[must_use]
    pub fn addr(&self) -> u64 {
        self.0.addr()
    }

    /// Buffer length
    #[must_use]
    pub fn nbytes(&self) -> u16 {
        (self.0.word(2) >> data_w2::NBYTES_SHIFT) as u16
    }

    /// Total packet length annotation (first data BD of non-LSO packets)
    #[must_use]
    pub fn total_pkt_bytes(&self) -> u16 {
        (self.0.word(2) & data_w2::TOTAL_MASK) as u16
    }

    /// Set the total packet length annotation
    pub fn set_total_pkt_bytes(&self, total: u16) {
        self.0
            .update_word(2, |w| (w & !data_w2::TOTAL_MASK) | u32::from(total));
    }
}

// =============================================================================
// Parsing BDs
// =============================================================================

/// Offload metadata written into a parsing BD.
///
/// Offsets and lengths are in bytes here; each layout converts them to the
/// units it stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseFields {
    /// Ethernet address type of the destination
    pub addr_type: u8,
    /// Destination MAC (E2 only)
    pub dst_mac: [u8; 6],
    /// Ethernet header length, VLAN and LLC/SNAP included
    pub eth_hlen: u16,
    /// IP header length
    pub ip_hlen: u16,
    /// TCP header length
    pub tcp_hlen: u16,
    /// LLC/SNAP framing present
    pub llc_snap: bool,
    /// IPv6 packet carrying extension headers
    pub ipv6_ext: bool,
    /// LSO segment size, zero without LSO
    pub mss: u16,
    /// Initial TCP sequence number
    pub tcp_seq: u32,
    /// Initial IP identification
    pub ip_id: u16,
    /// TCP flags of the template header
    pub tcp_flags: u8,
    /// Pseudo-header checksum
    pub pseudo_csum: u16,
}

/// E1/E1H parsing BD.
#[derive(Clone, Copy)]
pub struct ParseBdE1x<'a>(&'a BdSlot);

impl ParseBdE1x<'_> {
    /// Populate every field from `p`
    pub fn fill(&self, p: &ParseFields) {
        let mut global = u32::from(p.eth_hlen / 2) & e1x_w0::IP_HDR_START_MASK;
        global |= u32::from(p.addr_type) << e1x_w0::ADDR_TYPE_SHIFT;
        if p.llc_snap {
            global |= e1x_w0::LLC_SNAP_EN;
        }
        if p.mss != 0 {
            global |= e1x_w0::PSEUDO_CS_WITHOUT_LEN;
        }
        self.0.set_word(
            0,
            global
                | (u32::from(p.tcp_flags) << e1x_w0::TCP_FLAGS_SHIFT)
                | (u32::from(p.ip_hlen / 2) << e1x_w0::IP_HLEN_SHIFT),
        );
        let total_hlen_w = (p.eth_hlen + p.ip_hlen + p.tcp_hlen) / 2;
        self.0.set_word(
            1,
            u32::from(total_hlen_w) | (u32::from(p.pseudo_csum) << e1x_w1::PSEUDO_CSUM_SHIFT),
        );
        self.0
            .set_word(2, u32::from(p.mss) | (u32::from(p.ip_id) << e1x_w2::IP_ID_SHIFT));
        self.0.set_word(3, p.tcp_seq);
    }

    /// Total header length in bytes
    #[must_use]
    pub fn total_hlen(&self) -> u16 {
        ((self.0.word(1) & e1x_w1::TOTAL_HLEN_MASK) as u16) * 2
    }

    /// LSO segment size
    #[must_use]
    pub fn mss(&self) -> u16 {
        (self.0.word(2) & e1x_w2::MSS_MASK) as u16
    }

    /// IP identification
    #[must_use]
    pub fn ip_id(&self) -> u16 {
        (self.0.word(2) >> e1x_w2::IP_ID_SHIFT) as u16
    }

    /// Initial TCP sequence number
    #[must_use]
    pub fn tcp_seq(&self) -> u32 {
        self.0.word(3)
    }

    /// Pseudo-header checksum
    #[must_use]
    pub fn pseudo_csum(&self) -> u16 {
        (self.0.word(1) >> e1x_w1::PSEUDO_CSUM_SHIFT) as u16
    }

    /// Ethernet address type
    #[must_use]
    pub fn addr_type(&self) -> u8 {
        ((self.0.word(0) >> e1x_w0::ADDR_TYPE_SHIFT) & 0x3) as u8
    }
}

/// E2 parsing BD.
#[derive(Clone, Copy)]
pub struct ParseBdE2<'a>(&'a BdSlot);

impl ParseBdE2<'_> {
    /// Populate every field from `p`
    pub fn fill(&self, p: &ParseFields) {
        let m = p.dst_mac;
        let hi = u16::from_be_bytes([m[0], m[1]]);
        let mid = u16::from_be_bytes([m[2], m[3]]);
        let lo = u16::from_be_bytes([m[4], m[5]]);
        self.0
            .set_word(0, u32::from(lo) | (u32::from(mid) << 16));
        self.0.set_word(1, u32::from(hi));
        self.0.set_word(2, 0);

        let mut parsing = u32::from((p.eth_hlen + p.ip_hlen) / 2) & e2_parsing::L4_HDR_START_MASK;
        parsing |= (u32::from(p.tcp_hlen / 4) & e2_parsing::TCP_HDR_LEN_MASK)
            << e2_parsing::TCP_HDR_LEN_SHIFT;
        if p.ipv6_ext {
            parsing |= e2_parsing::IPV6_WITH_EXT_HDR;
        }
        parsing |= (u32::from(p.mss) & e2_parsing::LSO_MSS_MASK) << e2_parsing::LSO_MSS_SHIFT;
        parsing |= u32::from(p.addr_type & 0x3) << e2_parsing::ADDR_TYPE_SHIFT;
        self.0.set_word(3, parsing);
    }

    /// Destination MAC
    #[must_use]
    pub fn dst_mac(&self) -> [u8; 6] {
        let w0 = self.0.word(0);
        let hi = (self.0.word(1) as u16).to_be_bytes();
        let mid = ((w0 >> 16) as u16).to_be_bytes();
        let lo = (w0 as u16).to_be_bytes();
        [hi[0], hi[1], mid[0], mid[1], lo[0], lo[1]]
    }

    /// LSO segment size
    #[must_use]
    pub fn mss(&self) -> u16 {
        ((self.0.word(3) >> e2_parsing::LSO_MSS_SHIFT) & e2_parsing::LSO_MSS_MASK) as u16
    }

    /// L4 header start offset in bytes
    #[must_use]
    pub fn l4_hdr_start(&self) -> u16 {
        ((self.0.word(3) & e2_parsing::L4_HDR_START_MASK) as u16) * 2
    }

    /// Ethernet address type
    #[must_use]
    pub fn addr_type(&self) -> u8 {
        (self.0.word(3) >> e2_parsing::ADDR_TYPE_SHIFT) as u8
    }
}

// =============================================================================
// Link BD
// =============================================================================

/// Last slot of a ring page: device address of the next page.
#[derive(Clone, Copy)]
pub struct LinkBd<'a>(&'a BdSlot);

impl LinkBd<'_> {
    /// Point at the page starting at `next`
    pub fn set_next(&self, next: u64) {
        self.0.set_addr(next);
        self.0.set_word(2, 0);
        self.0.set_word(3, 0);
    }

    /// Device address of the next page
    #[must_use]
    pub fn next(&self) -> u64 {
        self.0.addr()
    }
}
