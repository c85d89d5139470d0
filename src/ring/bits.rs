//! Transmit BD bit field constants.
//!
//! Word numbering follows the little-endian dword order the device fetches.

#![allow(dead_code)]

// =============================================================================
// Start BD
// =============================================================================

/// Start BD word 2: `nbd` (low half) and `nbytes` (high half)
pub mod start_w2 {
    /// Number of BDs in the packet, link BDs included
    pub const NBD_MASK: u32 = 0xFFFF;
    /// Byte count of the first buffer
    pub const NBYTES_SHIFT: u32 = 16;
}

/// Start BD word 3: VLAN/padding tag, flags, general data
pub mod start_w3 {
    /// VLAN tag or padding tag
    pub const VLAN_MASK: u32 = 0xFFFF;
    /// `bd_flags` byte
    pub const FLAGS_SHIFT: u32 = 16;
    /// `general_data` byte
    pub const GENERAL_SHIFT: u32 = 24;
}

/// Start BD `bd_flags` bits
pub mod start_flags {
    /// Compute the IP header checksum
    pub const IP_CSUM: u8 = 1 << 0;
    /// Compute the L4 checksum
    pub const L4_CSUM: u8 = 1 << 1;
    /// VLAN insertion mode field
    pub const VLAN_MODE_MASK: u8 = 0x3 << 2;
    /// VLAN mode shift
    pub const VLAN_MODE_SHIFT: u8 = 2;
    /// First BD of a packet
    pub const START_BD: u8 = 1 << 4;
    /// L4 protocol is UDP
    pub const IS_UDP: u8 = 1 << 5;
    /// Software large segmentation offload
    pub const SW_LSO: u8 = 1 << 6;
    /// IPv6 packet
    pub const IPV6: u8 = 1 << 7;
}

/// Start BD VLAN insertion modes
pub mod vlan_mode {
    /// Field carries the padding tag
    pub const NONE: u8 = 0;
    /// Field carries a VLAN tag to insert
    pub const INSERT: u8 = 1;
}

/// Start BD `general_data` fields
pub mod general {
    /// Ethernet address type
    pub const ADDR_TYPE_MASK: u8 = 0x3;
    /// Number of header BDs
    pub const HDR_NBDS_SHIFT: u8 = 2;
    /// Header BD count mask (after shift)
    pub const HDR_NBDS_MASK: u8 = 0x3F;
}

/// Ethernet destination address classes
pub mod addr_type {
    /// Unicast destination
    pub const UNICAST: u8 = 1;
    /// Multicast destination
    pub const MULTICAST: u8 = 2;
    /// Broadcast destination
    pub const BROADCAST: u8 = 3;
}

// =============================================================================
// Data BD
// =============================================================================

/// Data BD word 2: `total_pkt_bytes` (low half) and `nbytes` (high half)
pub mod data_w2 {
    /// Total packet length annotation
    pub const TOTAL_MASK: u32 = 0xFFFF;
    /// Byte count of this buffer
    pub const NBYTES_SHIFT: u32 = 16;
}

// =============================================================================
// Parsing BD (E1/E1H)
// =============================================================================

/// E1x parsing BD word 0: `global_data` (u16), `tcp_flags` (u8), `ip_hlen_w` (u8)
pub mod e1x_w0 {
    /// IP header start offset, in 16-bit words
    pub const IP_HDR_START_MASK: u32 = 0xF;
    /// Ethernet address type shift
    pub const ADDR_TYPE_SHIFT: u32 = 4;
    /// Pseudo checksum computed without the length field
    pub const PSEUDO_CS_WITHOUT_LEN: u32 = 1 << 6;
    /// LLC/SNAP framing present
    pub const LLC_SNAP_EN: u32 = 1 << 7;
    /// TCP flags byte
    pub const TCP_FLAGS_SHIFT: u32 = 16;
    /// IP header length in 16-bit words
    pub const IP_HLEN_SHIFT: u32 = 24;
}

/// E1x parsing BD word 1: `total_hlen_w` (u16), `tcp_pseudo_csum` (u16)
pub mod e1x_w1 {
    /// Total header length in 16-bit words
    pub const TOTAL_HLEN_MASK: u32 = 0xFFFF;
    /// Pseudo-header checksum
    pub const PSEUDO_CSUM_SHIFT: u32 = 16;
}

/// E1x parsing BD word 2: `lso_mss` (u16), `ip_id` (u16)
pub mod e1x_w2 {
    /// LSO maximum segment size
    pub const MSS_MASK: u32 = 0xFFFF;
    /// IP identification
    pub const IP_ID_SHIFT: u32 = 16;
}

// =============================================================================
// Parsing BD (E2)
// =============================================================================

/// E2 parsing BD word 3: `parsing_data`
pub mod e2_parsing {
    /// L4 header start offset, in 16-bit words
    pub const L4_HDR_START_MASK: u32 = 0x7FF;
    /// TCP header length in dwords
    pub const TCP_HDR_LEN_SHIFT: u32 = 11;
    /// TCP header length mask (after shift)
    pub const TCP_HDR_LEN_MASK: u32 = 0xF;
    /// IPv6 with extension headers
    pub const IPV6_WITH_EXT_HDR: u32 = 1 << 15;
    /// LSO MSS shift
    pub const LSO_MSS_SHIFT: u32 = 16;
    /// LSO MSS mask (after shift)
    pub const LSO_MSS_MASK: u32 = 0x3FFF;
    /// Ethernet address type shift
    pub const ADDR_TYPE_SHIFT: u32 = 30;
}
