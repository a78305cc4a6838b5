// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use blitz_codec::{DecoderBuffer, DecoderResult, DecoderValue, EncoderBuffer, EncoderValue};
use core::{fmt, ops::Deref};

//= https://www.rfc-editor.org/rfc/rfc9000#section-16
//# The QUIC variable-length integer encoding reserves the two most
//# significant bits of the first byte to encode the base 2 logarithm of
//# the integer encoding length in bytes.  The integer value is encoded
//# on the remaining bits, in network byte order.

//= https://www.rfc-editor.org/rfc/rfc9000#section-16
//# This means that integers are encoded on 1, 2, 4, or 8 bytes and can
//# encode 6-, 14-, 30-, or 62-bit values, respectively.

pub const MAX_VARINT_VALUE: u64 = 4_611_686_018_427_387_903;

#[derive(Debug)]
pub struct VarIntError;

impl fmt::Display for VarIntError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "varint range exceeded")
    }
}

impl std::error::Error for VarIntError {}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct VarInt(u64);

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl VarInt {
    pub const MAX: Self = Self(MAX_VARINT_VALUE);

    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn new(value: u64) -> Result<Self, VarIntError> {
        if value > MAX_VARINT_VALUE {
            return Err(VarIntError);
        }
        Ok(Self(value))
    }

    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u16(value: u16) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn checked_add(self, value: Self) -> Option<Self> {
        Self::new(self.0.checked_add(value.0)?).ok()
    }

    #[inline]
    pub fn checked_add_usize(self, value: usize) -> Option<Self> {
        let value = Self::try_from(value).ok()?;
        self.checked_add(value)
    }

    #[inline]
    #[must_use]
    pub fn saturating_add(self, value: Self) -> Self {
        Self::new(self.0.saturating_add(value.0)).unwrap_or(Self::MAX)
    }

    #[inline]
    pub fn checked_sub(self, value: Self) -> Option<Self> {
        Some(Self(self.0.checked_sub(value.0)?))
    }

    /// The number of bytes the shortest encoding of this value occupies
    #[inline]
    pub const fn encoding_size(self) -> usize {
        match self.0 {
            0..=63 => 1,
            64..=16_383 => 2,
            16_384..=1_073_741_823 => 4,
            _ => 8,
        }
    }
}

impl Deref for VarInt {
    type Target = u64;

    #[inline]
    fn deref(&self) -> &u64 {
        &self.0
    }
}

impl From<u8> for VarInt {
    #[inline]
    fn from(value: u8) -> Self {
        Self(value as u64)
    }
}

impl From<u16> for VarInt {
    #[inline]
    fn from(value: u16) -> Self {
        Self(value as u64)
    }
}

impl From<u32> for VarInt {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value as u64)
    }
}

impl From<VarInt> for u64 {
    #[inline]
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl TryFrom<u64> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value as u64)
    }
}

impl TryFrom<VarInt> for usize {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: VarInt) -> Result<Self, Self::Error> {
        usize::try_from(value.0).map_err(|_| VarIntError)
    }
}

impl<'a> DecoderValue<'a> for VarInt {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
        let first = buffer.peek_byte(0)?;
        let len = 1usize << (first >> 6);
        let (slice, buffer) = buffer.decode_slice(len)?;

        let mut bytes = [0u8; 8];
        bytes[8 - len..].copy_from_slice(slice);
        // clear the two length bits
        bytes[8 - len] &= 0b0011_1111;

        Ok((Self(u64::from_be_bytes(bytes)), buffer))
    }
}

impl EncoderValue for VarInt {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        match self.encoding_size() {
            1 => encoder.encode(&(self.0 as u8)),
            2 => encoder.encode(&(self.0 as u16 | 0b01u16 << 14)),
            4 => encoder.encode(&(self.0 as u32 | 0b10u32 << 30)),
            _ => encoder.encode(&(self.0 | 0b11u64 << 62)),
        }
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        VarInt::encoding_size(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    fn round_trip(value: VarInt) -> VarInt {
        let mut slot = [0u8; 8];
        let mut encoder = EncoderBuffer::new(&mut slot);
        encoder.encode(&value);
        let written = encoder.len();
        assert_eq!(written, value.encoding_size());

        let (decoded, remaining) = DecoderBuffer::new(&slot[..written])
            .decode::<VarInt>()
            .unwrap();
        assert!(remaining.is_empty());
        decoded
    }

    #[test]
    fn round_trip_test() {
        check!().with_type::<u64>().cloned().for_each(|value| {
            if let Ok(value) = VarInt::new(value) {
                assert_eq!(value, round_trip(value));
            }
        });
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.1
    //= type=test
    //# For example, the eight-byte sequence 0xc2197c5eff14e88c decodes to
    //# the decimal value 151,288,809,941,952,652; the four-byte sequence
    //# 0x9d7f3e7d decodes to 494,878,333; the two-byte sequence 0x7bbd
    //# decodes to 15,293; and the single byte 0x25 decodes to 37
    #[test]
    fn rfc_example_test() {
        let examples: &[(&[u8], u64)] = &[
            (&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c], 151_288_809_941_952_652),
            (&[0x9d, 0x7f, 0x3e, 0x7d], 494_878_333),
            (&[0x7b, 0xbd], 15_293),
            (&[0x25], 37),
        ];

        for (bytes, expected) in examples {
            let (value, remaining) = DecoderBuffer::new(bytes).decode::<VarInt>().unwrap();
            assert!(remaining.is_empty());
            assert_eq!(value.as_u64(), *expected);
        }
    }

    #[test]
    fn truncated_test() {
        // the two length bits promise four bytes; only two are present
        let bytes = [0x9d, 0x7f];
        assert!(DecoderBuffer::new(&bytes).decode::<VarInt>().is_err());
    }

    #[test]
    fn shortest_form_test() {
        assert_eq!(VarInt::from_u8(63).encoding_size(), 1);
        assert_eq!(VarInt::from_u8(64).encoding_size(), 2);
        assert_eq!(VarInt::from_u16(16_383).encoding_size(), 2);
        assert_eq!(VarInt::from_u16(16_384).encoding_size(), 4);
        assert_eq!(VarInt::from_u32(1_073_741_823).encoding_size(), 4);
        assert_eq!(VarInt::new(1_073_741_824).unwrap().encoding_size(), 8);
        assert_eq!(VarInt::MAX.encoding_size(), 8);
    }
}
