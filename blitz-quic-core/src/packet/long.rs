// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::ConnectionId,
    packet::number::{PacketNumberSpace, TruncatedPacketNumber},
    varint::VarInt,
};
use blitz_codec::{decoder_invariant, DecoderBuffer, DecoderError, EncoderBuffer};
use core::ops::Range;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# Long Header Packet {
//#   Header Form (1) = 1,
//#   Fixed Bit (1) = 1,
//#   Long Packet Type (2),
//#   Type-Specific Bits (4),
//#   Version (32),
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..160),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..160),
//# }

pub(crate) const FORM_MASK: u8 = 0x80;
pub(crate) const PACKET_TYPE_MASK: u8 = 0x30;
const PACKET_TYPE_OFFSET: u8 = 4;
const FIXED_BITS: u8 = 0b1100_0000;

/// The only version this endpoint speaks
pub const QUIC_VERSION: u32 = 0x0000_0001;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# In this version of QUIC, the following packet types with the long
//# header are defined:
//#
//#                 +======+===========+================+
//#                 | Type | Name      | Section        |
//#                 +======+===========+================+
//#                 | 0x00 | Initial   | Section 17.2.2 |
//#                 +------+-----------+----------------+
//#                 | 0x01 | 0-RTT     | Section 17.2.3 |
//#                 +------+-----------+----------------+
//#                 | 0x02 | Handshake | Section 17.2.4 |
//#                 +------+-----------+----------------+
//#                 | 0x03 | Retry     | Section 17.2.5 |
//#                 +------+-----------+----------------+

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Initial = 0x0,
    ZeroRtt = 0x1,
    Handshake = 0x2,
    Retry = 0x3,
}

impl PacketType {
    #[inline]
    pub const fn into_bits(self) -> u8 {
        ((self as u8) << PACKET_TYPE_OFFSET) & PACKET_TYPE_MASK
    }

    #[inline]
    pub fn from_tag(tag: u8) -> Self {
        match (tag & PACKET_TYPE_MASK) >> PACKET_TYPE_OFFSET {
            0x0 => Self::Initial,
            0x1 => Self::ZeroRtt,
            0x2 => Self::Handshake,
            _ => Self::Retry,
        }
    }

    /// The packet number space the type is protected in, if any
    #[inline]
    pub fn space(self) -> Option<PacketNumberSpace> {
        match self {
            Self::Initial => Some(PacketNumberSpace::Initial),
            Self::Handshake => Some(PacketNumberSpace::Handshake),
            Self::ZeroRtt => Some(PacketNumberSpace::ApplicationData),
            Self::Retry => None,
        }
    }
}

/// A parsed long header, with offsets into the datagram it came from.
///
/// `header_len` is the packet number offset; `payload_len` is the value of
/// the Length field, i.e. packet number plus ciphertext plus tag. For an
/// unsupported version only the fields up to the source connection ID are
/// meaningful, which is exactly what a Version Negotiation response needs.
#[derive(Clone, Debug)]
pub struct LongHeader {
    pub packet_type: PacketType,
    pub version: u32,
    pub destination_connection_id: ConnectionId,
    pub source_connection_id: ConnectionId,
    pub token: Range<usize>,
    pub header_len: usize,
    pub payload_len: usize,
}

impl LongHeader {
    /// Parses one long header from the front of `packet`.
    ///
    /// `packet` may contain further coalesced packets past
    /// [`Self::packet_len`]; they are not touched.
    pub fn decode(packet: &[u8]) -> Result<Self, DecoderError> {
        let buffer = DecoderBuffer::new(packet);
        let (tag, buffer) = buffer.decode::<u8>()?;
        decoder_invariant!(tag & FORM_MASK != 0, "not a long header");

        let (version, buffer) = buffer.decode::<u32>()?;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
        //# Endpoints that receive a version 1 long header with a value
        //# larger than 20 MUST drop the packet.
        let (dcid, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
        let destination_connection_id = ConnectionId::try_from(dcid)
            .map_err(|_| DecoderError::InvariantViolation("destination cid exceeds max length"))?;

        let (scid, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
        let source_connection_id = ConnectionId::try_from(scid)
            .map_err(|_| DecoderError::InvariantViolation("source cid exceeds max length"))?;

        let packet_type = PacketType::from_tag(tag);

        let mut header = Self {
            packet_type,
            version,
            destination_connection_id,
            source_connection_id,
            token: 0..0,
            header_len: packet.len() - buffer.len(),
            payload_len: buffer.len(),
        };

        // Unknown versions are parsed no further; the caller answers with a
        // Version Negotiation packet built from the fields above.
        if version != QUIC_VERSION {
            return Ok(header);
        }

        let buffer = match packet_type {
            PacketType::Initial => {
                //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.2
                //# Token Length:  A variable-length integer specifying the
                //# length of the Token field, in bytes.  This value is 0 if no
                //# token is present.
                let (token, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
                let token_end = packet.len() - buffer.len();
                header.token = token_end - token.len()..token_end;
                buffer
            }
            // Retry carries neither a Length field nor a packet number; the
            // server never receives one, so the caller drops it by type.
            PacketType::Retry => {
                header.header_len = packet.len() - buffer.len();
                header.payload_len = buffer.len();
                return Ok(header);
            }
            _ => buffer,
        };

        //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
        //# Length:  This is the length of the remainder of the packet (that
        //# is, the Packet Number and Payload fields) in bytes, encoded as a
        //# variable-length integer (Section 16).
        let (payload_len, buffer) = buffer.decode::<VarInt>()?;
        let payload_len = usize::try_from(payload_len)
            .map_err(|_| DecoderError::InvariantViolation("payload length exceeds usize"))?;
        decoder_invariant!(payload_len <= buffer.len(), "payload length exceeds datagram");

        header.header_len = packet.len() - buffer.len();
        header.payload_len = payload_len;

        Ok(header)
    }

    /// The total length of this packet within its datagram
    #[inline]
    pub fn packet_len(&self) -> usize {
        self.header_len + self.payload_len
    }
}

/// Assembles unprotected server packets: Initial (with an empty token) and
/// Handshake.
#[derive(Clone, Copy, Debug)]
pub struct LongHeaderBuilder {
    pub packet_type: PacketType,
    pub destination_connection_id: ConnectionId,
    pub source_connection_id: ConnectionId,
}

impl LongHeaderBuilder {
    /// Encodes the header including the truncated packet number.
    ///
    /// `ciphertext_len` is the final payload length including the AEAD tag.
    /// Returns the packet number offset.
    pub fn encode(
        &self,
        packet_number: TruncatedPacketNumber,
        ciphertext_len: usize,
        encoder: &mut EncoderBuffer,
    ) -> usize {
        debug_assert!(matches!(
            self.packet_type,
            PacketType::Initial | PacketType::Handshake
        ));

        let tag = FIXED_BITS | self.packet_type.into_bits() | packet_number.len().into_packet_tag_mask();
        encoder.encode(&tag);
        encoder.encode(&QUIC_VERSION);

        encoder.encode(&(self.destination_connection_id.len() as u8));
        encoder.write_slice(self.destination_connection_id.as_bytes());
        encoder.encode(&(self.source_connection_id.len() as u8));
        encoder.write_slice(self.source_connection_id.as_bytes());

        if self.packet_type == PacketType::Initial {
            // this endpoint issues no retry tokens
            encoder.encode(&VarInt::ZERO);
        }

        let length = VarInt::try_from(packet_number.len().bytesize() + ciphertext_len)
            .expect("packet fits a datagram slot");
        encoder.encode(&length);

        let header_len = encoder.len();
        packet_number.encode(encoder);
        header_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::number::PacketNumberSpace;
    use crate::varint::VarInt;

    fn cid(bytes: &[u8]) -> ConnectionId {
        ConnectionId::try_from_bytes(bytes).unwrap()
    }

    #[test]
    fn round_trip_test() {
        let builder = LongHeaderBuilder {
            packet_type: PacketType::Initial,
            destination_connection_id: cid(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]),
            source_connection_id: cid(&[0xf0, 0x67, 0xa5, 0x50, 0x2a, 0x42, 0x62, 0xb5]),
        };

        let packet_number = PacketNumberSpace::Initial
            .new_packet_number(VarInt::from_u8(1))
            .truncate(PacketNumberSpace::Initial.new_packet_number(VarInt::ZERO))
            .unwrap();

        let ciphertext = [0u8; 48];
        let mut slot = [0u8; 128];
        let mut encoder = EncoderBuffer::new(&mut slot);
        let header_len = builder.encode(packet_number, ciphertext.len(), &mut encoder);
        encoder.write_slice(&ciphertext);
        let len = encoder.len();

        let header = LongHeader::decode(&slot[..len]).unwrap();
        assert_eq!(header.packet_type, PacketType::Initial);
        assert_eq!(header.version, QUIC_VERSION);
        assert_eq!(
            header.destination_connection_id,
            builder.destination_connection_id
        );
        assert_eq!(header.source_connection_id, builder.source_connection_id);
        assert!(header.token.is_empty());
        assert_eq!(header.header_len, header_len);
        assert_eq!(
            header.payload_len,
            packet_number.len().bytesize() + ciphertext.len()
        );
        assert_eq!(header.packet_len(), len);
    }

    #[test]
    fn oversized_cid_test() {
        // 21-byte DCID must be rejected
        let mut packet = vec![0xc0, 0, 0, 0, 1, 21];
        packet.extend_from_slice(&[0u8; 21]);
        packet.extend_from_slice(&[0, 0, 0]);
        assert!(LongHeader::decode(&packet).is_err());
    }

    #[test]
    fn truncated_datagram_test() {
        // shorter than any well-formed long header
        for len in 0..7 {
            let packet = vec![0xc0; len];
            assert!(LongHeader::decode(&packet).is_err());
        }
    }

    #[test]
    fn length_overrun_test() {
        // length field promises more bytes than the datagram holds
        let packet = [
            0xc0, 0x00, 0x00, 0x00, 0x01, // tag + version
            0x01, 0xaa, // dcid
            0x01, 0xbb, // scid
            0x00, // token length
            0x40, 0xff, // length = 255
            0x00, 0x00,
        ];
        assert!(LongHeader::decode(&packet).is_err());
    }

    #[test]
    fn foreign_version_test() {
        let packet = [
            0xc3, 0xde, 0xad, 0xbe, 0xef, // tag + unknown version
            0x02, 0xaa, 0xab, // dcid
            0x01, 0xbb, // scid
            0x99, 0x99, // opaque remainder
        ];
        let header = LongHeader::decode(&packet).unwrap();
        assert_eq!(header.version, 0xdead_beef);
        assert_eq!(header.destination_connection_id.as_bytes(), &[0xaa, 0xab]);
        assert_eq!(header.source_connection_id.as_bytes(), &[0xbb]);
    }
}
