// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::long::{LongHeader, QUIC_VERSION};
use blitz_codec::{decoder_invariant, DecoderBuffer, DecoderError, EncoderBuffer, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.1
//# Version Negotiation Packet {
//#   Header Form (1) = 1,
//#   Unused (7),
//#   Version (32) = 0,
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..2040),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..2040),
//#   Supported Version (32) ...,
//# }

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.1
//# Where QUIC
//# might be multiplexed with other protocols (see [RFC7983]), servers
//# SHOULD set the most significant bit of this field (0x40) to 1 so that
//# Version Negotiation packets appear to have the Fixed Bit field.
const ENCODING_TAG: u8 = 0b1100_0000;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.1
//# The Version field of a Version Negotiation packet MUST be set to
//# 0x00000000.
const VERSION: u32 = 0x0000_0000;

pub const SUPPORTED_VERSIONS: &[u32] = &[QUIC_VERSION];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionNegotiation<'a> {
    pub destination_connection_id: &'a [u8],
    pub source_connection_id: &'a [u8],
    pub supported_versions: &'a [u32],
}

impl<'a> VersionNegotiation<'a> {
    /// Builds the response to a long header carrying an unsupported version.
    ///
    /// The connection IDs are flipped because this packet travels in the
    /// opposite direction.
    pub fn from_long_header(header: &'a LongHeader) -> Self {
        Self {
            destination_connection_id: header.source_connection_id.as_bytes(),
            source_connection_id: header.destination_connection_id.as_bytes(),
            supported_versions: SUPPORTED_VERSIONS,
        }
    }

    /// Decodes a Version Negotiation packet, yielding the raw (big-endian)
    /// supported-version list.
    pub fn decode(packet: &'a [u8]) -> Result<(Self, &'a [u8]), DecoderError> {
        let buffer = DecoderBuffer::new(packet);
        let (tag, buffer) = buffer.decode::<u8>()?;
        decoder_invariant!(tag & 0x80 != 0, "not a long header");

        let (version, buffer) = buffer.decode::<u32>()?;
        decoder_invariant!(version == VERSION, "not a version negotiation packet");

        let (destination_connection_id, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
        let (source_connection_id, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;

        let versions = buffer.into_less_safe_slice();
        decoder_invariant!(!versions.is_empty(), "missing at least one version");
        decoder_invariant!(versions.len() % 4 == 0, "invalid version list length");

        Ok((
            Self {
                destination_connection_id,
                source_connection_id,
                supported_versions: &[],
            },
            versions,
        ))
    }
}

impl EncoderValue for VersionNegotiation<'_> {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&ENCODING_TAG);
        encoder.encode(&VERSION);
        encoder.encode(&(self.destination_connection_id.len() as u8));
        encoder.write_slice(self.destination_connection_id);
        encoder.encode(&(self.source_connection_id.len() as u8));
        encoder.write_slice(self.source_connection_id);
        for version in self.supported_versions {
            encoder.encode(version);
        }
    }

    fn encoding_size(&self) -> usize {
        1 + 4
            + 1
            + self.destination_connection_id.len()
            + 1
            + self.source_connection_id.len()
            + self.supported_versions.len() * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use crate::packet::long::PacketType;

    #[test]
    fn flipped_cids_test() {
        let header = LongHeader {
            packet_type: PacketType::Initial,
            version: 0xdead_beef,
            destination_connection_id: ConnectionId::try_from_bytes(&[1, 2, 3]).unwrap(),
            source_connection_id: ConnectionId::try_from_bytes(&[4, 5, 6, 7]).unwrap(),
            token: 0..0,
            header_len: 0,
            payload_len: 0,
        };

        let packet = VersionNegotiation::from_long_header(&header);

        let mut slot = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut slot);
        encoder.encode(&packet);
        assert_eq!(encoder.len(), packet.encoding_size());
        let len = encoder.len();

        let (decoded, versions) = VersionNegotiation::decode(&slot[..len]).unwrap();
        assert_eq!(decoded.destination_connection_id, &[4, 5, 6, 7]);
        assert_eq!(decoded.source_connection_id, &[1, 2, 3]);
        assert_eq!(versions, &[0x00, 0x00, 0x00, 0x01]);
    }
}
