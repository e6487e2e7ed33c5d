use bytes::{Buf, BufMut};
use rand::RngExt;

use crate::error::{ParseErrorKind, Result, RtspError};

/// An RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                     CSRC identifiers ....                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// [`build`](Self::build) always emits version 2 with padding and extension
/// bits clear. [`parse`](Self::parse) skips over an extension header when
/// the X bit is set; padding is not handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Marker bit; usage depends on the payload type.
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    /// 16-bit sequence number (the wire only ever carries the low 16 bits
    /// of whatever counter the sender maintains).
    pub sequence: u16,
    /// 32-bit timestamp field.
    pub timestamp: u32,
    /// Synchronization source identifier.
    pub ssrc: u32,
    /// Contributing sources, 0..=15 entries.
    pub csrc: Vec<u32>,
    /// Opaque payload carried after the header.
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Fixed header length without CSRC entries.
    pub const HEADER_LEN: usize = 12;

    /// Serialize to the binary wire format (network byte order).
    pub fn build(&self) -> Vec<u8> {
        let cc = self.csrc.len().min(15) as u8;
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + cc as usize * 4 + self.payload.len());

        buf.put_u8(2 << 6 | cc);
        buf.put_u8((self.marker as u8) << 7 | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in self.csrc.iter().take(15) {
            buf.put_u32(*csrc);
        }
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a packet from the binary wire format.
    ///
    /// The padding bit is ignored; an extension header (X bit) is skipped
    /// without interpretation. Anything shorter than its declared header
    /// is a [`ParseErrorKind::PacketTooShort`] error.
    pub fn parse(packet: &[u8]) -> Result<Self> {
        let too_short = || RtspError::Parse {
            kind: ParseErrorKind::PacketTooShort,
        };

        let mut buf = packet;
        if buf.remaining() < Self::HEADER_LEN {
            return Err(too_short());
        }

        let first = buf.get_u8();
        let version = first >> 6;
        if version != 2 {
            tracing::warn!(version, "RTP packet with unexpected version");
        }
        let has_extension = first & 0x10 != 0;
        let csrc_count = (first & 0x0F) as usize;

        let second = buf.get_u8();
        let marker = second & 0x80 != 0;
        let payload_type = second & 0x7F;

        let sequence = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < csrc_count * 4 {
            return Err(too_short());
        }
        let mut csrc = Vec::with_capacity(csrc_count);
        for _ in 0..csrc_count {
            csrc.push(buf.get_u32());
        }

        if has_extension {
            // RFC 3550 §5.3.1: 16-bit profile id, 16-bit length in words.
            if buf.remaining() < 4 {
                return Err(too_short());
            }
            buf.advance(2);
            let words = buf.get_u16() as usize;
            if buf.remaining() < words * 4 {
                return Err(too_short());
            }
            buf.advance(words * 4);
        }

        Ok(RtpPacket {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrc,
            payload: buf.to_vec(),
        })
    }
}

/// Random SSRC per RFC 3550 §8.1, chosen once per sender lifetime.
pub fn generate_ssrc() -> u32 {
    rand::rng().random()
}

/// Random initial sequence number (RFC 3550 §5.1 recommends an
/// unpredictable starting point).
pub fn generate_initial_sequence() -> u32 {
    rand::rng().random_range(1..10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet() -> RtpPacket {
        RtpPacket {
            marker: false,
            payload_type: 33,
            sequence: 4711,
            timestamp: 4711,
            ssrc: 0xAABBCCDD,
            csrc: Vec::new(),
            payload: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn version_is_2() {
        let buf = make_packet().build();
        assert_eq!(buf[0] >> 6, 2);
    }

    #[test]
    fn marker_bit() {
        let mut p = make_packet();
        let no_marker = p.build();
        assert_eq!(no_marker[1] & 0x80, 0);

        p.marker = true;
        let with_marker = p.build();
        assert_eq!(with_marker[1] & 0x80, 0x80);
    }

    #[test]
    fn payload_type_mp2t() {
        let buf = make_packet().build();
        assert_eq!(buf[1] & 0x7F, 33);
    }

    #[test]
    fn round_trip() {
        let p = make_packet();
        let parsed = RtpPacket::parse(&p.build()).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn round_trip_with_csrc() {
        let mut p = make_packet();
        p.csrc = vec![0x11111111, 0x22222222, 0x33333333];
        let buf = p.build();
        assert_eq!(buf[0] & 0x0F, 3);
        let parsed = RtpPacket::parse(&buf).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn parse_skips_extension_header() {
        // Rebuild the packet with the X bit set and a one-word extension
        // between header and payload.
        let p = make_packet();
        let built = p.build();
        let mut buf = built[..RtpPacket::HEADER_LEN].to_vec();
        buf[0] |= 0x10;
        buf.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01, 0xDE, 0xAD, 0xBE, 0xEF]);
        buf.extend_from_slice(&p.payload);

        let parsed = RtpPacket::parse(&buf).unwrap();
        assert_eq!(parsed.payload, p.payload);
        assert_eq!(parsed.sequence, p.sequence);
    }

    #[test]
    fn parse_rejects_short_packet() {
        assert!(RtpPacket::parse(&[0x80, 33, 0, 1]).is_err());
    }

    #[test]
    fn parse_rejects_truncated_csrc_list() {
        let mut p = make_packet();
        p.csrc = vec![1, 2];
        let buf = p.build();
        assert!(RtpPacket::parse(&buf[..RtpPacket::HEADER_LEN + 4]).is_err());
    }

    #[test]
    fn random_ssrc_differs() {
        assert_ne!(generate_ssrc(), generate_ssrc());
    }

    #[test]
    fn initial_sequence_in_range() {
        for _ in 0..100 {
            let seq = generate_initial_sequence();
            assert!((1..10_000).contains(&seq));
        }
    }
}
