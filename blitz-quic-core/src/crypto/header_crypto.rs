// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    crypto::payload::{EncryptedPayload, ProtectedPayload},
    packet::number::{PacketNumberSpace, TruncatedPacketNumber},
};
use blitz_codec::{DecoderBuffer, DecoderError};

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# The output of this algorithm is a 5 byte mask that is applied to the
//# protected header fields using exclusive OR.
pub const HEADER_PROTECTION_MASK_LEN: usize = 5;
pub type HeaderProtectionMask = [u8; HEADER_PROTECTION_MASK_LEN];

/// Produces header protection masks for one encryption level.
///
/// The mask derivation is keyed separately from the packet protection key,
/// so the two concerns travel as separate traits.
pub trait HeaderKey: Send {
    /// Derives a mask for opening a packet from a ciphertext sample
    fn opening_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    fn opening_sample_len(&self) -> usize;

    /// Derives a mask for sealing a packet from a ciphertext sample
    fn sealing_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    fn sealing_sample_len(&self) -> usize;
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# mask = header_protection(hp_key, sample)
//#
//# pn_length = (packet[0] & 0x03) + 1
//# if (packet[0] & 0x80) == 0x80:
//#    # Long header: 4 bits masked
//#    packet[0] ^= mask[0] & 0x0f
//# else:
//#    # Short header: 5 bits masked
//#    packet[0] ^= mask[0] & 0x1f
//#
//# # pn_offset is the start of the Packet Number field.
//# packet[pn_offset:pn_offset+pn_length] ^= mask[1:1+pn_length]

const LONG_HEADER_TAG: u8 = 0x80;
const LONG_HEADER_MASK: u8 = 0x0f;
const SHORT_HEADER_MASK: u8 = 0x1f;

#[inline(always)]
fn mask_from_packet_tag(tag: u8) -> u8 {
    if tag & LONG_HEADER_TAG == LONG_HEADER_TAG {
        LONG_HEADER_MASK
    } else {
        SHORT_HEADER_MASK
    }
}

#[inline(always)]
fn xor_packet_number(packet_number_bytes: &mut [u8], mask: &HeaderProtectionMask) {
    for (byte, mask_byte) in packet_number_bytes.iter_mut().zip(&mask[1..]) {
        *byte ^= mask_byte;
    }
}

/// Masks the first byte and packet number of a sealed payload
#[inline]
pub(crate) fn apply_header_protection<'a>(
    mask: HeaderProtectionMask,
    payload: EncryptedPayload<'a>,
) -> ProtectedPayload<'a> {
    let header_len = payload.header_len;
    let packet_number_len = payload.packet_number_len;
    let buffer = payload.buffer;

    buffer[0] ^= mask[0] & mask_from_packet_tag(buffer[0]);

    let header_with_pn_len = header_len + packet_number_len.bytesize();
    xor_packet_number(&mut buffer[header_len..header_with_pn_len], &mask);

    ProtectedPayload::new(header_len, buffer)
}

/// Unmasks the first byte, reads the packet number length out of it, and
/// unmasks the packet number
#[inline]
pub(crate) fn remove_header_protection<'a>(
    space: PacketNumberSpace,
    mask: HeaderProtectionMask,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), DecoderError> {
    let header_len = payload.header_len;
    let buffer = payload.buffer;

    buffer[0] ^= mask[0] & mask_from_packet_tag(buffer[0]);
    let packet_number_len = space.new_packet_number_len(buffer[0]);

    let header_with_pn_len = header_len + packet_number_len.bytesize();
    if buffer.len() < header_with_pn_len {
        return Err(DecoderError::UnexpectedEof(header_with_pn_len - buffer.len()));
    }

    let packet_number = {
        let packet_number_bytes = &mut buffer[header_len..header_with_pn_len];
        xor_packet_number(packet_number_bytes, &mask);

        let (packet_number, _) = packet_number_len
            .decode_truncated_packet_number(DecoderBuffer::new(packet_number_bytes), space)?;
        packet_number
    };

    Ok((
        packet_number,
        EncryptedPayload::new(header_len, packet_number_len, buffer),
    ))
}
