// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{connection::ConnectionId, packet::long::FORM_MASK};
use blitz_codec::{decoder_invariant, DecoderBuffer, DecoderError};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
//# 1-RTT Packet {
//#   Header Form (1) = 0,
//#   Fixed Bit (1) = 1,
//#   Spin Bit (1),
//#   Reserved Bits (2),
//#   Key Phase (1),
//#   Packet Number Length (2),
//#   Destination Connection ID (0..160),
//#   Packet Number (8..32),
//#   Packet Payload (8..),
//# }

/// A 1-RTT short header.
///
/// The destination connection ID has no length prefix; the receiver knows
/// the length of the IDs it hands out. This endpoint only routes short
/// headers — the 1-RTT data plane belongs to the layer above.
#[derive(Clone, Debug)]
pub struct ShortHeader {
    pub destination_connection_id: ConnectionId,
    pub header_len: usize,
}

impl ShortHeader {
    pub fn decode(packet: &[u8], local_cid_len: usize) -> Result<Self, DecoderError> {
        let buffer = DecoderBuffer::new(packet);
        let (tag, buffer) = buffer.decode::<u8>()?;
        decoder_invariant!(tag & FORM_MASK == 0, "not a short header");

        let (dcid, buffer) = buffer.decode_slice(local_cid_len)?;
        let destination_connection_id = ConnectionId::try_from(dcid)
            .map_err(|_| DecoderError::InvariantViolation("destination cid exceeds max length"))?;

        Ok(Self {
            destination_connection_id,
            header_len: packet.len() - buffer.len(),
        })
    }
}
