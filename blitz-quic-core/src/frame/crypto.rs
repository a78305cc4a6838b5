// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::tag, varint::VarInt};
use blitz_codec::{DecoderBuffer, DecoderError, EncoderBuffer, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# CRYPTO Frame {
//#   Type (i) = 0x06,
//#   Offset (i),
//#   Length (i),
//#   Crypto Data (..),
//# }

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# Offset:  A variable-length integer specifying the byte offset in the
//#    stream for the data in this CRYPTO frame.
//#
//# Length:  A variable-length integer specifying the length of the
//#    Crypto Data field in this CRYPTO frame.

#[derive(Debug, PartialEq, Eq)]
pub struct Crypto<'a> {
    /// The byte offset in the crypto stream for the data in this frame
    pub offset: VarInt,

    /// The cryptographic message data
    pub data: &'a [u8],
}

impl<'a> Crypto<'a> {
    pub(crate) fn decode(
        buffer: DecoderBuffer<'a>,
    ) -> Result<(Self, DecoderBuffer<'a>), DecoderError> {
        let (offset, buffer) = buffer.decode::<VarInt>()?;
        let (data, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
        Ok((Self { offset, data }, buffer))
    }

    /// The most data bytes a CRYPTO frame at `offset` can carry within
    /// `capacity` bytes of payload, accounting for its own framing.
    pub fn max_data_len(offset: VarInt, capacity: usize) -> usize {
        let fixed = 1 + offset.encoding_size();
        let Some(remaining) = capacity.checked_sub(fixed) else {
            return 0;
        };

        // the length prefix grows with the data it describes
        for (prefix, max_value) in [(1usize, 63usize), (2, 16_383), (4, 1_073_741_823)] {
            let Some(data) = remaining.checked_sub(prefix) else {
                return 0;
            };
            if data <= max_value {
                return data;
            }
        }
        0
    }
}

impl EncoderValue for Crypto<'_> {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&tag::CRYPTO);
        encoder.encode(&self.offset);
        encoder.encode(&VarInt::try_from(self.data.len()).expect("crypto data fits a packet"));
        encoder.write_slice(self.data);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        1 + self.offset.encoding_size()
            + VarInt::try_from(self.data.len())
                .expect("crypto data fits a packet")
                .encoding_size()
            + self.data.len()
    }
}
