// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::number::PacketNumberLen;
use blitz_codec::DecoderError;
use core::fmt;

/// The number of bytes between the packet number offset and the header
/// protection sample
//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
//# in sampling packet ciphertext for header protection, the Packet Number
//# field is assumed to be 4 bytes long
const SAMPLE_OFFSET: usize = PacketNumberLen::MAX_LEN;

/// A payload that is both sealed and header-protected.
///
/// `header_len` is the packet number offset; nothing past the first byte's
/// invariant bits can be trusted until protection is removed.
pub struct ProtectedPayload<'a> {
    pub(crate) header_len: usize,
    pub(crate) buffer: &'a mut [u8],
}

impl<'a> ProtectedPayload<'a> {
    #[inline]
    pub fn new(header_len: usize, buffer: &'a mut [u8]) -> Self {
        debug_assert!(buffer.len() >= header_len, "header_len is too large");
        Self { header_len, buffer }
    }

    pub(crate) fn header_protection_sample(
        &self,
        sample_len: usize,
    ) -> Result<&[u8], DecoderError> {
        header_protection_sample(self.buffer, self.header_len, sample_len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl fmt::Debug for ProtectedPayload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedPayload")
            .field("header_len", &self.header_len)
            .field("buffer_len", &(self.buffer.len() - self.header_len))
            .finish()
    }
}

/// A sealed payload whose header protection has been removed (inbound) or
/// not yet applied (outbound)
pub struct EncryptedPayload<'a> {
    pub(crate) header_len: usize,
    pub(crate) packet_number_len: PacketNumberLen,
    pub(crate) buffer: &'a mut [u8],
}

impl<'a> EncryptedPayload<'a> {
    #[inline]
    pub fn new(header_len: usize, packet_number_len: PacketNumberLen, buffer: &'a mut [u8]) -> Self {
        debug_assert!(
            buffer.len() >= header_len + packet_number_len.bytesize(),
            "header and packet number do not fit the buffer"
        );
        Self {
            header_len,
            packet_number_len,
            buffer,
        }
    }

    pub(crate) fn header_protection_sample(
        &self,
        sample_len: usize,
    ) -> Result<&[u8], DecoderError> {
        header_protection_sample(self.buffer, self.header_len, sample_len)
    }
}

impl fmt::Debug for EncryptedPayload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("header_len", &self.header_len)
            .field("packet_number_len", &self.packet_number_len)
            .field("buffer_len", &(self.buffer.len() - self.header_len))
            .finish()
    }
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
//# An endpoint MUST discard packets that are not long enough to contain a
//# complete sample.
fn header_protection_sample(
    buffer: &[u8],
    header_len: usize,
    sample_len: usize,
) -> Result<&[u8], DecoderError> {
    let start = header_len + SAMPLE_OFFSET;
    let end = start
        .checked_add(sample_len)
        .ok_or(DecoderError::UnexpectedEof(sample_len))?;

    buffer
        .get(start..end)
        .ok_or(DecoderError::UnexpectedEof(end.saturating_sub(buffer.len())))
}
