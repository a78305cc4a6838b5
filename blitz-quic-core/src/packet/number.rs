// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use blitz_codec::{DecoderBuffer, DecoderError, EncoderBuffer};

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# The packet number is an integer in the range 0 to 2^62-1.  This
//# number is used in determining the cryptographic nonce for packet
//# protection.  Each endpoint maintains a separate packet number for
//# sending and receiving.

/// The packet number len is the two least significant bits of the packet tag
pub(crate) const PACKET_NUMBER_LEN_MASK: u8 = 0b11;

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# *  Initial space: All Initial packets (Section 17.2.2) are in this
//#    space.
//#
//# *  Handshake space: All Handshake packets (Section 17.2.4) are in
//#    this space.
//#
//# *  Application data space: All 0-RTT (Section 17.2.3) and 1-RTT
//#    (Section 17.3) encrypted packets are in this space.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketNumberSpace {
    Initial,
    Handshake,
    ApplicationData,
}

impl PacketNumberSpace {
    #[inline]
    pub fn new_packet_number(self, value: VarInt) -> PacketNumber {
        PacketNumber { space: self, value }
    }

    /// Reads the packet number length out of an unprotected packet tag
    #[inline]
    pub fn new_packet_number_len(self, packet_tag: u8) -> PacketNumberLen {
        PacketNumberLen {
            bytes: (packet_tag & PACKET_NUMBER_LEN_MASK) + 1,
        }
    }
}

/// The 1-4 byte length of a packet number on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketNumberLen {
    bytes: u8,
}

impl PacketNumberLen {
    pub const MAX_LEN: usize = 4;

    #[inline]
    pub const fn bytesize(self) -> usize {
        self.bytes as usize
    }

    #[inline]
    pub const fn bitsize(self) -> usize {
        self.bytes as usize * 8
    }

    /// The two tag bits encoding this length
    #[inline]
    pub const fn into_packet_tag_mask(self) -> u8 {
        self.bytes - 1
    }

    /// The smallest length whose usable bits can represent `value`
    #[inline]
    fn from_varint(value: VarInt) -> Option<Self> {
        let bytes = match value.as_u64() {
            v if v <= u8::MAX as u64 => 1,
            v if v <= u16::MAX as u64 => 2,
            v if v <= 0x00ff_ffff => 3,
            v if v <= u32::MAX as u64 => 4,
            _ => return None,
        };
        Some(Self { bytes })
    }

    #[inline]
    pub(crate) fn decode_truncated_packet_number<'a>(
        self,
        buffer: DecoderBuffer<'a>,
        space: PacketNumberSpace,
    ) -> Result<(TruncatedPacketNumber, DecoderBuffer<'a>), DecoderError> {
        let (slice, buffer) = buffer.decode_slice(self.bytesize())?;
        let mut bytes = [0u8; 4];
        bytes[4 - slice.len()..].copy_from_slice(slice);
        let value = u32::from_be_bytes(bytes);
        Ok((
            TruncatedPacketNumber {
                space,
                len: self,
                value,
            },
            buffer,
        ))
    }
}

/// A full 62-bit packet number in a specific packet number space
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PacketNumber {
    space: PacketNumberSpace,
    value: VarInt,
}

impl PacketNumber {
    #[inline]
    pub const fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.value.as_u64()
    }

    /// The value mixed into the AEAD nonce
    #[inline]
    pub const fn as_crypto_nonce(self) -> u64 {
        self.value.as_u64()
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //# the sender MUST use a packet number size able to represent more than
    //# twice as large a range than the difference between the largest
    //# acknowledged packet and packet number being sent.
    #[inline]
    pub fn truncate(self, largest_acknowledged: PacketNumber) -> Option<TruncatedPacketNumber> {
        debug_assert_eq!(self.space, largest_acknowledged.space);

        let len = self
            .value
            .checked_sub(largest_acknowledged.value)
            .and_then(|range| range.checked_add(range))
            .and_then(PacketNumberLen::from_varint)?;

        Some(TruncatedPacketNumber {
            space: self.space,
            len,
            value: (self.as_u64() & (u32::MAX as u64 >> (32 - len.bitsize()))) as u32,
        })
    }
}

/// A packet number as it appears on the wire: the least significant
/// 8-32 bits of the full value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TruncatedPacketNumber {
    space: PacketNumberSpace,
    len: PacketNumberLen,
    value: u32,
}

impl TruncatedPacketNumber {
    #[inline]
    pub const fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub const fn len(self) -> PacketNumberLen {
        self.len
    }

    #[inline]
    pub const fn bitsize(self) -> usize {
        self.len.bitsize()
    }

    #[inline]
    pub fn encode(self, encoder: &mut EncoderBuffer) {
        let bytes = self.value.to_be_bytes();
        encoder.write_slice(&bytes[4 - self.len.bytesize()..]);
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.3
    //# DecodePacketNumber(largest_pn, truncated_pn, pn_nbits):
    //#    expected_pn  = largest_pn + 1
    //#    pn_win       = 1 << pn_nbits
    //#    pn_hwin      = pn_win / 2
    //#    pn_mask      = pn_win - 1
    //#    // The incoming packet number should be greater than
    //#    // expected_pn - pn_hwin and less than or equal to
    //#    // expected_pn + pn_hwin
    //#    //
    //#    // This means we cannot just strip the trailing bits from
    //#    // expected_pn and add the truncated_pn because that might
    //#    // yield a value outside the window.
    //#    //
    //#    // The following code calculates a candidate value and
    //#    // makes sure it's within the packet number window.
    //#    // Note the extra checks to prevent overflow and underflow.
    //#    candidate_pn = (expected_pn & ~pn_mask) | truncated_pn
    //#    if candidate_pn <= expected_pn - pn_hwin and
    //#       candidate_pn < (1 << 62) - pn_win:
    //#       return candidate_pn + pn_win
    //#    if candidate_pn > expected_pn + pn_hwin and
    //#       candidate_pn >= pn_win:
    //#       return candidate_pn - pn_win
    //#    return candidate_pn
    #[inline]
    pub fn expand(self, largest_received: PacketNumber) -> PacketNumber {
        debug_assert_eq!(self.space, largest_received.space);

        let expected_pn = largest_received.as_u64() + 1;
        let pn_win = 1u64 << self.bitsize();
        let pn_hwin = pn_win / 2;
        let pn_mask = pn_win - 1;

        let candidate_pn = (expected_pn & !pn_mask) | self.value as u64;

        let value = if expected_pn
            .checked_sub(pn_hwin)
            .is_some_and(|edge| candidate_pn <= edge)
            && candidate_pn < (1u64 << 62) - pn_win
        {
            candidate_pn + pn_win
        } else if candidate_pn > expected_pn + pn_hwin && candidate_pn >= pn_win {
            candidate_pn - pn_win
        } else {
            candidate_pn
        };

        self.space
            .new_packet_number(VarInt::new(value).unwrap_or(VarInt::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    fn new(value: u64) -> PacketNumber {
        PacketNumberSpace::Initial.new_packet_number(VarInt::new(value).unwrap())
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# For example, if an endpoint has received an acknowledgment for packet
    //# 0xabe8b3, and is sending a packet with a number of 0xac5c02, there are
    //# 29,519 (0x734f) outstanding packet numbers.  In order to represent at
    //# least twice this range (59,038 packets, or 0xe69e), 16 bits are
    //# required.
    #[test]
    fn truncation_len_example_test() {
        let largest_acknowledged = new(0x00ab_e8b3);

        assert_eq!(
            new(0x00ac_5c02)
                .truncate(largest_acknowledged)
                .unwrap()
                .bitsize(),
            16,
        );
        assert_eq!(
            new(0x00ac_e8fe)
                .truncate(largest_acknowledged)
                .unwrap()
                .bitsize(),
            24,
        );
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# For example, if the highest successfully
    //# authenticated packet had a packet number of 0xa82f30ea, then a packet
    //# containing a 16-bit value of 0x9b32 will be decoded as 0xa82f9b32.
    #[test]
    fn expansion_example_test() {
        let largest_received = new(0xa82f_30ea);
        let truncated = TruncatedPacketNumber {
            space: PacketNumberSpace::Initial,
            len: PacketNumberLen { bytes: 2 },
            value: 0x9b32,
        };
        assert_eq!(truncated.expand(largest_received), new(0xa82f_9b32));
    }

    #[test]
    fn truncate_expand_round_trip_test() {
        check!()
            .with_type::<(u64, u64)>()
            .cloned()
            .for_each(|(largest, packet_number)| {
                let (Ok(largest), Ok(packet_number)) =
                    (VarInt::new(largest), VarInt::new(packet_number))
                else {
                    return;
                };
                let largest = PacketNumberSpace::Initial.new_packet_number(largest);
                let packet_number = PacketNumberSpace::Initial.new_packet_number(packet_number);

                if let Some(truncated) = packet_number.truncate(largest) {
                    assert_eq!(truncated.expand(largest), packet_number);
                }
            });
    }

    /// Follows the RFC pseudocode as closely as possible so the shipped
    /// decoder can be diffed against it.
    fn rfc_decoder(largest_pn: u64, truncated_pn: u64, pn_nbits: usize) -> u64 {
        use std::panic::catch_unwind as catch;

        let expected_pn = largest_pn + 1;
        let pn_win = 1u64 << pn_nbits;
        let pn_hwin = pn_win / 2;
        let pn_mask = pn_win - 1;

        let candidate_pn = (expected_pn & !pn_mask) | truncated_pn;
        if catch(|| {
            candidate_pn <= expected_pn.checked_sub(pn_hwin).unwrap()
                && candidate_pn < (1u64 << 62).checked_sub(pn_win).unwrap()
        })
        .unwrap_or_default()
        {
            return candidate_pn + pn_win;
        }

        if catch(|| {
            candidate_pn > expected_pn.checked_add(pn_hwin).unwrap() && candidate_pn >= pn_win
        })
        .unwrap_or_default()
        {
            return candidate_pn - pn_win;
        }

        candidate_pn
    }

    #[test]
    fn rfc_differential_test() {
        check!()
            .with_type::<(u64, u32, u8)>()
            .cloned()
            .for_each(|(largest, value, len)| {
                let Ok(largest) = VarInt::new(largest) else {
                    return;
                };
                let bytes = (len % 4) + 1;
                let value = value & (u32::MAX >> (32 - bytes as usize * 8));

                let largest = PacketNumberSpace::Initial.new_packet_number(largest);
                let truncated = TruncatedPacketNumber {
                    space: PacketNumberSpace::Initial,
                    len: PacketNumberLen { bytes },
                    value,
                };

                let expected = rfc_decoder(largest.as_u64(), value as u64, bytes as usize * 8)
                    .min(VarInt::MAX.as_u64());

                assert_eq!(truncated.expand(largest).as_u64(), expected);
            });
    }

    #[test]
    fn wire_round_trip_test() {
        for (value, bytes) in [(0x2u32, 1u8), (0x1234, 2), (0x12_3456, 3), (0x1234_5678, 4)] {
            let truncated = TruncatedPacketNumber {
                space: PacketNumberSpace::Handshake,
                len: PacketNumberLen { bytes },
                value,
            };

            let mut slot = [0u8; 4];
            let mut encoder = EncoderBuffer::new(&mut slot);
            truncated.encode(&mut encoder);
            assert_eq!(encoder.len(), bytes as usize);

            let len = PacketNumberLen { bytes };
            let (decoded, _) = len
                .decode_truncated_packet_number(
                    DecoderBuffer::new(&slot[..bytes as usize]),
                    PacketNumberSpace::Handshake,
                )
                .unwrap();
            assert_eq!(decoded, truncated);
        }
    }
}
