//! Re-framing of captured packets with a process trailer
//!
//! Output layout:
//!
//! ```text
//! dst(6) | src(6) | type/len(2) | payload | zero padding to 60 | trailer | 0000
//! ```
//!
//! Padding comes before the trailer so analyzers never read the trailer as frame
//! padding. The four zero bytes sit where an FCS would be, so tools that strip a
//! trailing checksum eat those instead of trailer content.

use super::error::FormatError;
use super::link_layer::ethernet::{ETHERTYPE_MIN, EthernetHeader, EtherField, HEADER_LEN, MAC_LEN};

/// Minimum Ethernet frame size without FCS.
pub const MIN_FRAME_LEN: usize = 60;
pub const FCS_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    /// Recompute the 802.3 length field from the payload actually written.
    pub fix_lengths: bool,
}

/// A rebuilt frame ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedFrame {
    bytes: Vec<u8>,
    trailer_offset: usize,
}

impl EnrichedFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Header, payload and padding: everything before the trailer.
    pub fn body(&self) -> &[u8] {
        &self.bytes[..self.trailer_offset]
    }

    pub fn trailer(&self) -> &[u8] {
        &self.bytes[self.trailer_offset..self.bytes.len() - FCS_LEN]
    }
}

fn check_mac(mac: &[u8], which: &'static str) -> Result<(), FormatError> {
    if mac.len() != MAC_LEN {
        return Err(FormatError::InvalidMac {
            which,
            len: mac.len(),
        });
    }
    Ok(())
}

/// Build an Ethernet frame from the original header, the bytes of every layer
/// after it, and the encoded trailer.
pub fn rebuild(
    header: &EthernetHeader<'_>,
    payload: &[u8],
    trailer: &[u8],
    options: RebuildOptions,
) -> Result<EnrichedFrame, FormatError> {
    check_mac(header.dst_mac, "destination")?;
    check_mac(header.src_mac, "source")?;

    let type_or_len = match header.field {
        EtherField::Type(ether_type) => ether_type,
        EtherField::Length(len) => {
            let len = if options.fix_lengths {
                payload.len()
            } else {
                len as usize
            };
            if len >= ETHERTYPE_MIN as usize {
                return Err(FormatError::InvalidLength(len));
            }
            len as u16
        }
    };

    let body_len = (HEADER_LEN + payload.len()).max(MIN_FRAME_LEN);
    let mut bytes = Vec::with_capacity(body_len + trailer.len() + FCS_LEN);
    bytes.extend_from_slice(header.dst_mac);
    bytes.extend_from_slice(header.src_mac);
    bytes.extend_from_slice(&type_or_len.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes.resize(body_len, 0);

    let trailer_offset = bytes.len();
    bytes.extend_from_slice(trailer);
    bytes.extend_from_slice(&[0u8; FCS_LEN]);

    Ok(EnrichedFrame {
        bytes,
        trailer_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::link_layer::ethernet::ETHERTYPE_IPV4;

    const DST: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    const SRC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn header(field: EtherField) -> EthernetHeader<'static> {
        EthernetHeader {
            dst_mac: &DST,
            src_mac: &SRC,
            field,
        }
    }

    #[test]
    fn test_short_frame_padded_to_60() {
        let payload = [0x45u8; 20];
        let trailer = [1, 2, 3];
        let frame = rebuild(
            &header(EtherField::Type(ETHERTYPE_IPV4)),
            &payload,
            &trailer,
            RebuildOptions::default(),
        )
        .unwrap();

        assert_eq!(frame.body().len(), MIN_FRAME_LEN);
        assert_eq!(&frame.body()[..6], &DST);
        assert_eq!(&frame.body()[6..12], &SRC);
        assert_eq!(&frame.body()[12..14], &[0x08, 0x00]);
        assert_eq!(&frame.body()[14..34], &payload);
        assert!(frame.body()[34..].iter().all(|&b| b == 0));
        assert_eq!(frame.trailer(), &trailer);
        assert_eq!(&frame.as_bytes()[frame.len() - 4..], &[0, 0, 0, 0]);
        assert_eq!(frame.len(), 60 + 3 + 4);
    }

    #[test]
    fn test_long_frame_not_padded() {
        let payload = vec![0x5a; 100];
        let frame = rebuild(
            &header(EtherField::Type(ETHERTYPE_IPV4)),
            &payload,
            &[9; 11],
            RebuildOptions::default(),
        )
        .unwrap();
        assert_eq!(frame.body().len(), 114);
        assert_eq!(frame.len(), 114 + 11 + 4);
    }

    #[test]
    fn test_exactly_60_bytes_not_padded() {
        let payload = vec![0x01; 46];
        let frame = rebuild(
            &header(EtherField::Type(ETHERTYPE_IPV4)),
            &payload,
            &[],
            RebuildOptions::default(),
        )
        .unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&DST);
        expected.extend_from_slice(&SRC);
        expected.extend_from_slice(&[0x08, 0x00]);
        expected.extend_from_slice(&payload);
        assert_eq!(frame.body(), expected.as_slice());
    }

    #[test]
    fn test_length_field_kept_without_fixing() {
        let frame = rebuild(
            &header(EtherField::Length(3)),
            &[0x42, 0x42, 0x03, 0x99],
            &[],
            RebuildOptions::default(),
        )
        .unwrap();
        assert_eq!(&frame.body()[12..14], &[0x00, 0x03]);
    }

    #[test]
    fn test_length_field_fixed_from_payload() {
        let frame = rebuild(
            &header(EtherField::Length(3)),
            &[0x42, 0x42, 0x03, 0x99],
            &[],
            RebuildOptions { fix_lengths: true },
        )
        .unwrap();
        assert_eq!(&frame.body()[12..14], &[0x00, 0x04]);
    }

    #[test]
    fn test_oversized_length_field_rejected() {
        let payload = vec![0u8; 1600];
        let result = rebuild(
            &header(EtherField::Length(3)),
            &payload,
            &[],
            RebuildOptions { fix_lengths: true },
        );
        assert_eq!(result, Err(FormatError::InvalidLength(1600)));
    }

    #[test]
    fn test_invalid_mac_rejected() {
        let bad = EthernetHeader {
            dst_mac: &DST[..5],
            src_mac: &SRC,
            field: EtherField::Type(ETHERTYPE_IPV4),
        };
        assert_eq!(
            rebuild(&bad, &[], &[], RebuildOptions::default()),
            Err(FormatError::InvalidMac {
                which: "destination",
                len: 5
            })
        );

        let bad = EthernetHeader {
            dst_mac: &DST,
            src_mac: &[],
            field: EtherField::Type(ETHERTYPE_IPV4),
        };
        assert!(matches!(
            rebuild(&bad, &[], &[], RebuildOptions::default()),
            Err(FormatError::InvalidMac { which: "source", .. })
        ));
    }
}
