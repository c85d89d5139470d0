//! Outbound packet descriptors
//!
//! A [`TxPacket`] is a list of device-visible fragments plus the offload
//! metadata the device needs to build wire frames. The caller owns it until
//! `send`; the transmit queue owns it until reclaim hands it back.

use alloc::vec::Vec;

use super::coalesce::CoalesceBuffer;
use crate::driver::error::{TxError, TxResult};
use crate::internal::constants::{
    ETH_HEADER_SIZE, LLC_SNAP_SIZE, MAC_ADDR_LEN, MAX_BD_BYTES, VLAN_TAG_SIZE,
};
use crate::ring::bits::addr_type;

/// One contiguous piece of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fragment {
    /// Device-visible address
    pub addr: u64,
    /// Length in bytes
    pub len: u32,
}

impl Fragment {
    /// Fragment at `addr` of `len` bytes
    #[must_use]
    pub const fn new(addr: u64, len: u32) -> Self {
        Self { addr, len }
    }
}

/// Offloads requested for a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffloadFlags {
    /// Insert `vlan_tag`
    pub vlan: bool,
    /// Compute the IPv4 header checksum
    pub ip_checksum: bool,
    /// Compute the TCP/UDP checksum
    pub l4_checksum: bool,
    /// L4 protocol is UDP
    pub udp: bool,
    /// Large segmentation offload
    pub lso: bool,
    /// IPv6 packet
    pub ipv6: bool,
    /// IPv6 packet with extension headers
    pub ipv6_ext: bool,
    /// 802.2 LLC/SNAP framing
    pub llc_snap: bool,
}

/// Template values for large segmentation offload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LsoParams {
    /// Maximum segment size
    pub mss: u16,
    /// Initial TCP sequence number
    pub tcp_seq: u32,
    /// Initial IP identification
    pub ip_id: u16,
    /// TCP flags of the template header
    pub tcp_flags: u8,
}

/// Lifecycle of a packet inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketState {
    /// Owned by the caller, not yet sent
    #[default]
    Building,
    /// On the ring, waiting for completion
    Queued,
    /// Completed and handed back
    Reclaimed,
}

/// What a successful `send` produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxReceipt {
    /// Ring slots used
    pub bd_count: u16,
    /// BD count written to the start BD (link BDs included)
    pub nbd: u16,
    /// Bytes described by the BDs
    pub total_bytes: u32,
    /// Packet was linearized into a coalescing buffer
    pub coalesced: bool,
    /// A BD was split at the header boundary
    pub split: bool,
}

/// An outbound packet.
#[derive(Debug)]
pub struct TxPacket {
    /// Caller-chosen identifier, carried through to completion
    pub id: u64,
    /// Offloads requested
    pub flags: OffloadFlags,
    /// VLAN tag (with `flags.vlan`)
    pub vlan_tag: u16,
    /// IP header length in bytes (checksum offload and LSO)
    pub ip_hlen: u16,
    /// TCP/UDP header length in bytes (checksum offload and LSO)
    pub l4_hlen: u16,
    /// LSO template (with `flags.lso`)
    pub lso: LsoParams,
    /// TCP/UDP pseudo-header checksum
    pub pseudo_csum: u16,
    /// Destination MAC (address-type classification, E2 parsing BD)
    pub dst_mac: [u8; MAC_ADDR_LEN],
    frags: Vec<Fragment>,
    pub(crate) state: PacketState,
    pub(crate) coalesce: Option<CoalesceBuffer>,
    pub(crate) bd_count: u16,
    pub(crate) end_index: u16,
}

impl TxPacket {
    /// Empty packet with identifier `id`
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            flags: OffloadFlags::default(),
            vlan_tag: 0,
            ip_hlen: 0,
            l4_hlen: 0,
            lso: LsoParams::default(),
            pseudo_csum: 0,
            dst_mac: [0; MAC_ADDR_LEN],
            frags: Vec::new(),
            state: PacketState::Building,
            coalesce: None,
            bd_count: 0,
            end_index: 0,
        }
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Append a fragment
    #[must_use]
    pub fn with_fragment(mut self, addr: u64, len: u32) -> Self {
        self.push_fragment(addr, len);
        self
    }

    /// Append a fragment in place
    pub fn push_fragment(&mut self, addr: u64, len: u32) {
        self.frags.push(Fragment::new(addr, len));
    }

    /// Insert a VLAN tag
    #[must_use]
    pub fn with_vlan(mut self, tag: u16) -> Self {
        self.flags.vlan = true;
        self.vlan_tag = tag;
        self
    }

    /// Request checksum offload for the given header lengths
    #[must_use]
    pub fn with_checksum(mut self, ip_hlen: u16, l4_hlen: u16, udp: bool) -> Self {
        self.flags.ip_checksum = !self.flags.ipv6;
        self.flags.l4_checksum = true;
        self.flags.udp = udp;
        self.ip_hlen = ip_hlen;
        self.l4_hlen = l4_hlen;
        self
    }

    /// Request LSO. Header lengths are in bytes.
    #[must_use]
    pub fn with_lso(mut self, ip_hlen: u16, tcp_hlen: u16, params: LsoParams) -> Self {
        self.flags.lso = true;
        self.flags.ip_checksum = !self.flags.ipv6;
        self.flags.l4_checksum = true;
        self.flags.udp = false;
        self.ip_hlen = ip_hlen;
        self.l4_hlen = tcp_hlen;
        self.lso = params;
        self
    }

    /// Mark as IPv6 (no IP header checksum)
    #[must_use]
    pub fn with_ipv6(mut self, extension_headers: bool) -> Self {
        self.flags.ipv6 = true;
        self.flags.ipv6_ext = extension_headers;
        self.flags.ip_checksum = false;
        self
    }

    /// Frame uses LLC/SNAP encapsulation
    #[must_use]
    pub fn with_llc_snap(mut self) -> Self {
        self.flags.llc_snap = true;
        self
    }

    /// Destination MAC
    #[must_use]
    pub fn with_dst_mac(mut self, mac: [u8; MAC_ADDR_LEN]) -> Self {
        self.dst_mac = mac;
        self
    }

    /// Pseudo-header checksum seed
    #[must_use]
    pub fn with_pseudo_csum(mut self, csum: u16) -> Self {
        self.pseudo_csum = csum;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Caller fragments, as given
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.frags
    }

    /// Sum of fragment lengths
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.frags.iter().map(|f| f.len as usize).sum()
    }

    /// Lifecycle state
    #[must_use]
    pub const fn state(&self) -> PacketState {
        self.state
    }

    /// Ring slots the packet occupies (valid once queued)
    #[must_use]
    pub const fn bd_count(&self) -> u16 {
        self.bd_count
    }

    /// Logical ring index one past the packet's last BD
    #[must_use]
    pub const fn end_index(&self) -> u16 {
        self.end_index
    }

    /// True while the packet holds a coalescing buffer
    #[must_use]
    pub const fn is_coalesced(&self) -> bool {
        self.coalesce.is_some()
    }

    /// Ethernet header length, VLAN tag and LLC/SNAP included
    #[must_use]
    pub const fn eth_hlen(&self) -> u16 {
        let mut len = ETH_HEADER_SIZE;
        if self.flags.vlan {
            len += VLAN_TAG_SIZE;
        }
        if self.flags.llc_snap {
            len += LLC_SNAP_SIZE;
        }
        len as u16
    }

    /// Full LSO header length (Ethernet + IP + TCP)
    #[must_use]
    pub const fn lso_header_len(&self) -> usize {
        self.eth_hlen() as usize + self.ip_hlen as usize + self.l4_hlen as usize
    }

    /// Address class of the destination MAC
    #[must_use]
    pub fn addr_type(&self) -> u8 {
        if self.dst_mac == [0xFF; MAC_ADDR_LEN] {
            addr_type::BROADCAST
        } else if self.dst_mac[0] & 0x01 != 0 {
            addr_type::MULTICAST
        } else {
            addr_type::UNICAST
        }
    }

    /// Reject packets the ring cannot describe.
    pub(crate) fn validate(&self) -> TxResult<()> {
        if self.frags.is_empty()
            || self
                .frags
                .iter()
                .any(|f| f.len == 0 || f.len > MAX_BD_BYTES)
        {
            return Err(TxError::InvalidPacket);
        }
        let total = self.total_len();
        if self.flags.lso {
            if self.lso.mss == 0
                || self.ip_hlen == 0
                || self.l4_hlen == 0
                || self.lso_header_len() > total
            {
                return Err(TxError::InvalidPacket);
            }
        } else if total > MAX_BD_BYTES as usize {
            return Err(TxError::InvalidPacket);
        }
        Ok(())
    }
}
