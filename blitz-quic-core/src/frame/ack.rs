// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::tag, varint::VarInt};
use blitz_codec::{decoder_invariant, DecoderBuffer, DecoderError, EncoderBuffer, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# ACK Frame {
//#   Type (i) = 0x02..0x03,
//#   Largest Acknowledged (i),
//#   ACK Delay (i),
//#   ACK Range Count (i),
//#   First ACK Range (i),
//#   ACK Range (..) ...,
//#   [ECN Counts (..)],
//# }

/// An ACK frame, reduced to the fields the handshake layer looks at.
///
/// Additional ACK ranges and ECN counts are validated and skipped during
/// decode; loss recovery is out of scope for the handshake core, which is
/// free to re-send CRYPTO data at the same offsets instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack {
    pub largest_acknowledged: VarInt,
    pub ack_delay: VarInt,
    pub first_ack_range: VarInt,
}

impl Ack {
    /// Acknowledges exactly the largest received packet number
    pub fn new(largest_acknowledged: VarInt) -> Self {
        Self {
            largest_acknowledged,
            ack_delay: VarInt::ZERO,
            first_ack_range: VarInt::ZERO,
        }
    }

    pub(crate) fn decode(
        frame_tag: u8,
        buffer: DecoderBuffer<'_>,
    ) -> Result<(Self, DecoderBuffer<'_>), DecoderError> {
        let (largest_acknowledged, buffer) = buffer.decode::<VarInt>()?;
        let (ack_delay, buffer) = buffer.decode::<VarInt>()?;
        let (ack_range_count, buffer) = buffer.decode::<VarInt>()?;
        let (first_ack_range, buffer) = buffer.decode::<VarInt>()?;

        decoder_invariant!(
            first_ack_range <= largest_acknowledged,
            "first ack range exceeds largest acknowledged"
        );

        let mut buffer = buffer;
        for _ in 0..ack_range_count.as_u64() {
            let (_gap, remaining) = buffer.decode::<VarInt>()?;
            let (_len, remaining) = remaining.decode::<VarInt>()?;
            buffer = remaining;
        }

        if frame_tag == tag::ACK_ECN {
            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.2
            //# ECN Counts {
            //#   ECT0 Count (i),
            //#   ECT1 Count (i),
            //#   ECN-CE Count (i),
            //# }
            let (_ect0, remaining) = buffer.decode::<VarInt>()?;
            let (_ect1, remaining) = remaining.decode::<VarInt>()?;
            let (_ce, remaining) = remaining.decode::<VarInt>()?;
            buffer = remaining;
        }

        Ok((
            Self {
                largest_acknowledged,
                ack_delay,
                first_ack_range,
            },
            buffer,
        ))
    }
}

impl EncoderValue for Ack {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&tag::ACK);
        encoder.encode(&self.largest_acknowledged);
        encoder.encode(&self.ack_delay);
        encoder.encode(&VarInt::ZERO);
        encoder.encode(&self.first_ack_range);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        1 + self.largest_acknowledged.encoding_size()
            + self.ack_delay.encoding_size()
            + VarInt::ZERO.encoding_size()
            + self.first_ack_range.encoding_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameIter};

    #[test]
    fn round_trip_test() {
        let frame = Ack::new(VarInt::from_u8(7));

        let mut slot = [0u8; 16];
        let mut encoder = EncoderBuffer::new(&mut slot);
        encoder.encode(&frame);
        assert_eq!(encoder.len(), frame.encoding_size());
        let len = encoder.len();

        let frames: Vec<_> = FrameIter::new(&slot[..len])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames, vec![Frame::Ack(frame)]);
    }

    #[test]
    fn multi_range_decode_test() {
        // largest 10, delay 0, 2 extra ranges, first range 1,
        // then (gap, len) pairs
        let payload = [0x02, 0x0a, 0x00, 0x02, 0x01, 0x00, 0x01, 0x02, 0x00];
        let frames: Vec<_> = FrameIter::new(&payload)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            frames,
            vec![Frame::Ack(Ack {
                largest_acknowledged: VarInt::from_u8(10),
                ack_delay: VarInt::ZERO,
                first_ack_range: VarInt::from_u8(1),
            })]
        );
    }

    #[test]
    fn ecn_decode_test() {
        let payload = [0x03, 0x0a, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03];
        assert!(FrameIter::new(&payload).next().unwrap().is_ok());
    }

    #[test]
    fn invalid_range_test() {
        // first range larger than largest acknowledged
        let payload = [0x02, 0x02, 0x00, 0x00, 0x05];
        assert!(FrameIter::new(&payload).next().unwrap().is_err());
    }
}
