// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::tag, varint::VarInt};
use blitz_codec::{DecoderBuffer, DecoderError, EncoderBuffer, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.19
//# CONNECTION_CLOSE Frame {
//#   Type (i) = 0x1c..0x1d,
//#   Error Code (i),
//#   [Frame Type (i)],
//#   Reason Phrase Length (i),
//#   Reason Phrase (..),
//# }

#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionClose<'a> {
    pub error_code: VarInt,

    /// The frame type that triggered the error; `None` for the 0x1d
    /// (application) variant
    pub frame_type: Option<VarInt>,

    pub reason: &'a [u8],
}

impl<'a> ConnectionClose<'a> {
    pub fn new(error_code: VarInt, reason: &'a [u8]) -> Self {
        Self {
            error_code,
            frame_type: Some(VarInt::ZERO),
            reason,
        }
    }

    pub(crate) fn decode(
        frame_tag: u8,
        buffer: DecoderBuffer<'a>,
    ) -> Result<(Self, DecoderBuffer<'a>), DecoderError> {
        let (error_code, buffer) = buffer.decode::<VarInt>()?;

        let (frame_type, buffer) = if frame_tag == tag::CONNECTION_CLOSE {
            let (frame_type, buffer) = buffer.decode::<VarInt>()?;
            (Some(frame_type), buffer)
        } else {
            (None, buffer)
        };

        let (reason, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;

        Ok((
            Self {
                error_code,
                frame_type,
                reason,
            },
            buffer,
        ))
    }
}

impl EncoderValue for ConnectionClose<'_> {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&tag::CONNECTION_CLOSE);
        encoder.encode(&self.error_code);
        encoder.encode(&self.frame_type.unwrap_or(VarInt::ZERO));
        encoder.encode(&VarInt::try_from(self.reason.len()).expect("reason fits a packet"));
        encoder.write_slice(self.reason);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        1 + self.error_code.encoding_size()
            + self.frame_type.unwrap_or(VarInt::ZERO).encoding_size()
            + VarInt::try_from(self.reason.len())
                .expect("reason fits a packet")
                .encoding_size()
            + self.reason.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameIter};

    #[test]
    fn round_trip_test() {
        let frame = ConnectionClose::new(VarInt::from_u16(0x010a), b"handshake failed");

        let mut slot = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut slot);
        encoder.encode(&frame);
        assert_eq!(encoder.len(), frame.encoding_size());
        let len = encoder.len();

        let frames: Vec<_> = FrameIter::new(&slot[..len])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames, vec![Frame::ConnectionClose(frame)]);
    }

    #[test]
    fn application_variant_test() {
        // 0x1d omits the frame type field
        let payload = [0x1d, 0x07, 0x02, b'n', b'o'];
        let frames: Vec<_> = FrameIter::new(&payload)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            frames,
            vec![Frame::ConnectionClose(ConnectionClose {
                error_code: VarInt::from_u8(7),
                frame_type: None,
                reason: b"no",
            })]
        );
    }
}
