// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// A value which can be encoded into an [`EncoderBuffer`]
pub trait EncoderValue {
    fn encode(&self, encoder: &mut EncoderBuffer);

    /// The exact number of bytes `encode` will write
    fn encoding_size(&self) -> usize;
}

/// A positional cursor over a caller-provided output slot.
///
/// Packet assembly happens into fixed-size datagram slots, so running out
/// of capacity is a sizing bug in the caller rather than an input-dependent
/// condition; writes past the end panic.
#[derive(Debug)]
pub struct EncoderBuffer<'a> {
    bytes: &'a mut [u8],
    position: usize,
}

impl<'a> EncoderBuffer<'a> {
    #[inline]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The number of bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.position
    }

    /// Repositions the cursor, e.g. to patch a reserved length field
    #[inline]
    pub fn set_position(&mut self, position: usize) {
        debug_assert!(position <= self.capacity());
        self.position = position;
    }

    #[inline]
    pub fn write_slice(&mut self, slice: &[u8]) {
        let end = self.position + slice.len();
        self.bytes[self.position..end].copy_from_slice(slice);
        self.position = end;
    }

    #[inline]
    pub fn write_zerofill(&mut self, len: usize) {
        let end = self.position + len;
        self.bytes[self.position..end].fill(0);
        self.position = end;
    }

    #[inline]
    pub fn encode<T: EncoderValue + ?Sized>(&mut self, value: &T) {
        value.encode(self)
    }

    /// The bytes written so far
    #[inline]
    pub fn as_written(&self) -> &[u8] {
        &self.bytes[..self.position]
    }

    /// Splits the buffer into the written prefix and the unused suffix
    #[inline]
    pub fn split_written_mut(self) -> (&'a mut [u8], &'a mut [u8]) {
        self.bytes.split_at_mut(self.position)
    }
}

macro_rules! encoder_value_be {
    ($ty:ty) => {
        impl EncoderValue for $ty {
            #[inline]
            fn encode(&self, encoder: &mut EncoderBuffer) {
                encoder.write_slice(&self.to_be_bytes());
            }

            #[inline]
            fn encoding_size(&self) -> usize {
                core::mem::size_of::<$ty>()
            }
        }
    };
}

encoder_value_be!(u8);
encoder_value_be!(u16);
encoder_value_be!(u32);
encoder_value_be!(u64);

impl EncoderValue for [u8] {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_slice(self);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        self.len()
    }
}

impl<T: EncoderValue + ?Sized> EncoderValue for &T {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        (*self).encode(encoder)
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        (*self).encoding_size()
    }
}
