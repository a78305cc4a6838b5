// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The handshake-era frame set: PADDING, PING, ACK, CRYPTO and
//! CONNECTION_CLOSE.
//!
//! A packet payload is a sequence of frames with no framing between them;
//! [`FrameIter`] walks one payload. An unknown frame type ends the walk
//! with an error — the caller drops the rest of the payload but keeps the
//! connection (RFC 9000 §12.4 handshake subset).

use blitz_codec::{DecoderBuffer, DecoderError, EncoderBuffer, EncoderValue};

pub mod ack;
pub mod connection_close;
pub mod crypto;

pub use ack::Ack;
pub use connection_close::ConnectionClose;
pub use crypto::Crypto;

pub type Tag = u8;

pub(crate) mod tag {
    pub const PADDING: u8 = 0x00;
    pub const PING: u8 = 0x01;
    pub const ACK: u8 = 0x02;
    pub const ACK_ECN: u8 = 0x03;
    pub const CRYPTO: u8 = 0x06;
    pub const CONNECTION_CLOSE: u8 = 0x1c;
    pub const CONNECTION_CLOSE_APPLICATION: u8 = 0x1d;
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.1
//# A PADDING frame (type=0x00) has no semantic value.  PADDING frames
//# can be used to increase the size of a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Padding {
    pub length: usize,
}

impl EncoderValue for Padding {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.write_zerofill(self.length);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        self.length
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.2
//# Endpoints can use PING frames (type=0x01) to verify that their peers
//# are still alive or to check reachability to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ping;

impl EncoderValue for Ping {
    #[inline]
    fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&tag::PING);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        1
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Padding(Padding),
    Ping(Ping),
    Ack(Ack),
    Crypto(Crypto<'a>),
    ConnectionClose(ConnectionClose<'a>),
}

/// Walks the frames of one decrypted packet payload
pub struct FrameIter<'a> {
    buffer: DecoderBuffer<'a>,
    errored: bool,
}

impl<'a> FrameIter<'a> {
    #[inline]
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            buffer: DecoderBuffer::new(payload),
            errored: false,
        }
    }

    fn decode_frame(&mut self) -> Result<Frame<'a>, DecoderError> {
        let tag = self.buffer.peek_byte(0)?;
        match tag {
            tag::PADDING => {
                // padding arrives in runs; collapse the run into one frame
                let length = self
                    .buffer
                    .peek()
                    .iter()
                    .take_while(|byte| **byte == tag::PADDING)
                    .count();
                self.buffer = self.buffer.skip(length)?;
                Ok(Frame::Padding(Padding { length }))
            }
            tag::PING => {
                self.buffer = self.buffer.skip(1)?;
                Ok(Frame::Ping(Ping))
            }
            tag::ACK | tag::ACK_ECN => {
                let (frame, buffer) = Ack::decode(tag, self.buffer.skip(1)?)?;
                self.buffer = buffer;
                Ok(Frame::Ack(frame))
            }
            tag::CRYPTO => {
                let (frame, buffer) = Crypto::decode(self.buffer.skip(1)?)?;
                self.buffer = buffer;
                Ok(Frame::Crypto(frame))
            }
            tag::CONNECTION_CLOSE | tag::CONNECTION_CLOSE_APPLICATION => {
                let (frame, buffer) = ConnectionClose::decode(tag, self.buffer.skip(1)?)?;
                self.buffer = buffer;
                Ok(Frame::ConnectionClose(frame))
            }
            _ => Err(DecoderError::InvariantViolation("unknown frame type")),
        }
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<Frame<'a>, DecoderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.buffer.is_empty() {
            return None;
        }

        let result = self.decode_frame();
        if result.is_err() {
            self.errored = true;
        }
        Some(result)
    }
}
