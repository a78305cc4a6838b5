// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// The result of a decode operation: the value plus the remaining buffer.
pub type DecoderResult<'a, T> = Result<(T, DecoderBuffer<'a>), DecoderError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderError {
    /// The buffer ended before the requested number of bytes was available
    UnexpectedEof(usize),
    /// A length prefix described more bytes than the buffer holds
    LengthPrefixTooLarge(usize),
    /// The input violated a protocol invariant
    InvariantViolation(&'static str),
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnexpectedEof(len) => write!(f, "unexpected eof: needed {len} more bytes"),
            Self::LengthPrefixTooLarge(len) => {
                write!(f, "length prefix of {len} bytes exceeds buffer")
            }
            Self::InvariantViolation(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for DecoderError {}

/// Returns a [`DecoderError::InvariantViolation`] from the enclosing
/// function when the condition does not hold.
#[macro_export]
macro_rules! decoder_invariant {
    ($condition:expr, $message:expr) => {
        if !($condition) {
            return Err($crate::DecoderError::InvariantViolation($message).into());
        }
    };
}

/// A value which can be decoded from the front of a [`DecoderBuffer`]
pub trait DecoderValue<'a>: Sized {
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self>;
}

/// A panic-free cursor for look-ahead decoding of untrusted input
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecoderBuffer<'a> {
    bytes: &'a [u8],
}

impl<'a> DecoderBuffer<'a> {
    #[inline]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the byte at `index` without consuming anything
    #[inline]
    pub fn peek_byte(&self, index: usize) -> Result<u8, DecoderError> {
        self.bytes
            .get(index)
            .copied()
            .ok_or_else(|| DecoderError::UnexpectedEof(index + 1 - self.bytes.len()))
    }

    /// Splits off the first `len` bytes
    #[inline]
    pub fn decode_slice(self, len: usize) -> DecoderResult<'a, &'a [u8]> {
        if len > self.bytes.len() {
            return Err(DecoderError::UnexpectedEof(len - self.bytes.len()));
        }
        let (slice, remaining) = self.bytes.split_at(len);
        Ok((slice, Self::new(remaining)))
    }

    /// Advances the buffer by `len` bytes
    #[inline]
    pub fn skip(self, len: usize) -> Result<DecoderBuffer<'a>, DecoderError> {
        let (_, remaining) = self.decode_slice(len)?;
        Ok(remaining)
    }

    /// Decodes a value of type `T` from the front of the buffer
    #[inline]
    pub fn decode<T: DecoderValue<'a>>(self) -> DecoderResult<'a, T> {
        T::decode(self)
    }

    /// Decodes a `Len`-prefixed slice, e.g. a connection ID or token
    #[inline]
    pub fn decode_slice_with_len_prefix<Len>(self) -> DecoderResult<'a, &'a [u8]>
    where
        Len: DecoderValue<'a> + Into<u64>,
    {
        let (len, buffer) = self.decode::<Len>()?;
        let len: u64 = len.into();
        let len = usize::try_from(len).map_err(|_| DecoderError::LengthPrefixTooLarge(usize::MAX))?;
        if len > buffer.len() {
            return Err(DecoderError::LengthPrefixTooLarge(len));
        }
        buffer.decode_slice(len)
    }

    /// Moves out the buffer's slice, discarding the bounds-checking wrapper
    #[inline]
    pub const fn into_less_safe_slice(self) -> &'a [u8] {
        self.bytes
    }

    /// Borrows the remaining bytes without consuming them
    #[inline]
    pub const fn peek(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<'a> From<&'a [u8]> for DecoderBuffer<'a> {
    #[inline]
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

macro_rules! decoder_value_be {
    ($ty:ty) => {
        impl<'a> DecoderValue<'a> for $ty {
            #[inline]
            fn decode(buffer: DecoderBuffer<'a>) -> DecoderResult<'a, Self> {
                let (slice, buffer) = buffer.decode_slice(core::mem::size_of::<$ty>())?;
                let mut bytes = [0u8; core::mem::size_of::<$ty>()];
                bytes.copy_from_slice(slice);
                Ok((<$ty>::from_be_bytes(bytes), buffer))
            }
        }
    };
}

decoder_value_be!(u8);
decoder_value_be!(u16);
decoder_value_be!(u32);
decoder_value_be!(u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_network_order() {
        let buffer = DecoderBuffer::new(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        let (value, buffer) = buffer.decode::<u32>().unwrap();
        assert_eq!(value, 0x0102_0304);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.decode::<u16>().is_err());
    }

    #[test]
    fn len_prefix() {
        let buffer = DecoderBuffer::new(&[0x02, 0xaa, 0xbb, 0xcc]);
        let (slice, buffer) = buffer.decode_slice_with_len_prefix::<u8>().unwrap();
        assert_eq!(slice, &[0xaa, 0xbb]);
        assert_eq!(buffer.len(), 1);

        // a prefix that overruns the buffer must not panic
        let buffer = DecoderBuffer::new(&[0x09, 0xaa]);
        assert!(matches!(
            buffer.decode_slice_with_len_prefix::<u8>(),
            Err(DecoderError::LengthPrefixTooLarge(9))
        ));
    }
}
