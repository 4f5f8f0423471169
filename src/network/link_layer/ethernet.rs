//! Ethernet (IEEE 802.3) header parsing
//!
//! Handles DLT_EN10MB frames with a 14-byte header:
//! - Destination MAC (6 bytes)
//! - Source MAC (6 bytes)
//! - EtherType, or payload length for 802.3/LLC frames (2 bytes)

use crate::network::error::FormatError;

pub const HEADER_LEN: usize = 14;
pub const MAC_LEN: usize = 6;

/// Values below this are an 802.3 payload length rather than an EtherType.
pub const ETHERTYPE_MIN: u16 = 0x0600;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_QINQ: u16 = 0x88a8;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

/// Meaning of the two bytes following the MAC addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherField {
    /// Ethernet II frame
    Type(u16),
    /// 802.3 frame carrying an LLC payload of the given length
    Length(u16),
}

impl EtherField {
    pub fn from_wire(value: u16) -> Self {
        if value < ETHERTYPE_MIN {
            EtherField::Length(value)
        } else {
            EtherField::Type(value)
        }
    }
}

/// Decoded Ethernet header borrowing its addresses from the captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader<'a> {
    pub dst_mac: &'a [u8],
    pub src_mac: &'a [u8],
    pub field: EtherField,
}

/// Split a frame into its Ethernet header and the bytes that follow it.
///
/// For 802.3 frames the payload is cut to the length field, dropping whatever
/// padding the sender appended. A length field larger than the captured data is
/// kept as-is and the short payload is returned.
pub fn parse(data: &[u8]) -> Result<(EthernetHeader<'_>, &[u8]), FormatError> {
    if data.len() < HEADER_LEN {
        log::debug!("Ethernet frame too small: {} bytes", data.len());
        return Err(FormatError::FrameTooShort(data.len()));
    }

    let field = EtherField::from_wire(u16::from_be_bytes([data[12], data[13]]));
    let mut payload = &data[HEADER_LEN..];

    if let EtherField::Length(len) = field {
        let len = len as usize;
        if payload.len() > len {
            payload = &payload[..len];
        } else if payload.len() < len {
            log::trace!(
                "Ethernet: 802.3 length {} exceeds captured payload {}",
                len,
                payload.len()
            );
        }
    }

    let header = EthernetHeader {
        dst_mac: &data[0..6],
        src_mac: &data[6..12],
        field,
    };
    Ok((header, payload))
}
