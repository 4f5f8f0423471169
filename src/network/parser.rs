// network/parser.rs - Ethernet frame decoding down to the transport ports
use crate::network::error::FormatError;
use crate::network::link_layer::ethernet::{
    self, ETHERTYPE_IPV4, ETHERTYPE_IPV6, ETHERTYPE_QINQ, ETHERTYPE_VLAN, EtherField,
    EthernetHeader,
};

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// Transport layer found in a frame. Only TCP and UDP flows can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
    Other,
}

impl Transport {
    /// (source, destination) ports for TCP and UDP.
    pub fn ports(&self) -> Option<(u16, u16)> {
        match *self {
            Transport::Tcp { src_port, dst_port } | Transport::Udp { src_port, dst_port } => {
                Some((src_port, dst_port))
            }
            Transport::Other => None,
        }
    }
}

/// A captured frame split into the pieces the rebuilder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub ethernet: EthernetHeader<'a>,
    /// Every byte belonging to layers after the Ethernet header, without the
    /// link-layer padding of the original frame.
    pub payload: &'a [u8],
    pub transport: Transport,
}

/// Decode an Ethernet frame.
///
/// Only a frame too short to hold an Ethernet header is an error. Anything the
/// decoder does not understand past that point is carried through untouched
/// with `Transport::Other`.
pub fn decode(data: &[u8]) -> Result<DecodedFrame<'_>, FormatError> {
    let (header, rest) = ethernet::parse(data)?;

    let (payload, transport) = match header.field {
        EtherField::Type(ether_type) => decode_network(ether_type, rest),
        EtherField::Length(_) => (rest, Transport::Other),
    };

    Ok(DecodedFrame {
        ethernet: header,
        payload,
        transport,
    })
}

/// Returns the payload with any trailing padding removed, plus the transport.
fn decode_network(mut ether_type: u16, data: &[u8]) -> (&[u8], Transport) {
    let mut offset = 0;

    if (ether_type == ETHERTYPE_VLAN || ether_type == ETHERTYPE_QINQ)
        && data.len() >= VLAN_TAG_LEN
    {
        ether_type = u16::from_be_bytes([data[2], data[3]]);
        offset = VLAN_TAG_LEN;
        log::trace!("Ethernet: 802.1Q tag, inner EtherType 0x{:04x}", ether_type);
    }

    let ip_data = &data[offset..];
    let parsed = match ether_type {
        ETHERTYPE_IPV4 => parse_ipv4(ip_data),
        ETHERTYPE_IPV6 => parse_ipv6(ip_data),
        _ => {
            log::trace!("Ethernet: EtherType 0x{:04x} passed through", ether_type);
            None
        }
    };

    match parsed {
        Some((ip_len, transport)) => (&data[..offset + ip_len], transport),
        None => (data, Transport::Other),
    }
}

/// Returns the IP datagram length (clamped to what was captured) and transport.
fn parse_ipv4(ip_data: &[u8]) -> Option<(usize, Transport)> {
    if ip_data.len() < IPV4_MIN_HEADER_LEN || ip_data[0] >> 4 != 4 {
        return None;
    }

    let header_len = ((ip_data[0] & 0x0F) as usize) * 4;
    if header_len < IPV4_MIN_HEADER_LEN || ip_data.len() < header_len {
        return None;
    }

    let total_len = u16::from_be_bytes([ip_data[2], ip_data[3]]) as usize;
    let ip_len = if total_len >= header_len {
        total_len.min(ip_data.len())
    } else {
        ip_data.len()
    };

    // Only the first fragment carries transport ports
    let flags_fragment = u16::from_be_bytes([ip_data[6], ip_data[7]]);
    let more_fragments = flags_fragment & 0x2000 != 0;
    let fragment_offset = flags_fragment & 0x1FFF;
    if more_fragments || fragment_offset != 0 {
        return Some((ip_len, Transport::Other));
    }

    let protocol = ip_data[9];
    let transport = parse_transport(protocol, &ip_data[header_len..ip_len]);
    Some((ip_len, transport))
}

fn parse_ipv6(ip_data: &[u8]) -> Option<(usize, Transport)> {
    if ip_data.len() < IPV6_HEADER_LEN || ip_data[0] >> 4 != 6 {
        return None;
    }

    let payload_len = u16::from_be_bytes([ip_data[4], ip_data[5]]) as usize;
    // Zero payload length means a jumbogram; keep everything
    let ip_len = if payload_len == 0 {
        ip_data.len()
    } else {
        (IPV6_HEADER_LEN + payload_len).min(ip_data.len())
    };

    let ext_data = &ip_data[IPV6_HEADER_LEN..ip_len];
    let (next_header, transport_offset) = skip_ipv6_extension_headers(ip_data[6], ext_data);
    let transport = match transport_offset {
        Some(offset) if offset <= ext_data.len() => {
            parse_transport(next_header, &ext_data[offset..])
        }
        _ => Transport::Other,
    };
    Some((ip_len, transport))
}

/// Walk IPv6 extension headers. Returns the final next-header value and the
/// transport offset, or `None` when the transport header is unreachable
/// (fragment, ESP, or a truncated chain).
fn skip_ipv6_extension_headers(mut next_header: u8, data: &[u8]) -> (u8, Option<usize>) {
    const HOP_BY_HOP: u8 = 0;
    const ROUTING: u8 = 43;
    const FRAGMENT: u8 = 44;
    const ENCAPSULATING_SECURITY: u8 = 50;
    const AUTHENTICATION: u8 = 51;
    const DESTINATION_OPTIONS: u8 = 60;

    let mut offset = 0;
    loop {
        match next_header {
            HOP_BY_HOP | ROUTING | DESTINATION_OPTIONS => {
                if data.len() < offset + 2 {
                    return (next_header, None);
                }
                next_header = data[offset];
                offset += ((data[offset + 1] as usize) + 1) * 8;
            }
            AUTHENTICATION => {
                if data.len() < offset + 2 {
                    return (next_header, None);
                }
                next_header = data[offset];
                offset += ((data[offset + 1] as usize) + 2) * 4;
            }
            FRAGMENT | ENCAPSULATING_SECURITY => return (next_header, None),
            _ => return (next_header, Some(offset)),
        }
    }
}

fn parse_transport(protocol: u8, data: &[u8]) -> Transport {
    let ports = || {
        (
            u16::from_be_bytes([data[0], data[1]]),
            u16::from_be_bytes([data[2], data[3]]),
        )
    };

    match protocol {
        IPPROTO_TCP if data.len() >= TCP_MIN_HEADER_LEN => {
            let (src_port, dst_port) = ports();
            Transport::Tcp { src_port, dst_port }
        }
        IPPROTO_UDP if data.len() >= UDP_HEADER_LEN => {
            let (src_port, dst_port) = ports();
            Transport::Udp { src_port, dst_port }
        }
        IPPROTO_TCP | IPPROTO_UDP => {
            log::debug!(
                "Truncated transport header (protocol {}, {} bytes)",
                protocol,
                data.len()
            );
            Transport::Other
        }
        _ => Transport::Other,
    }
}
