// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use blitz_quic_core::{
    crypto::{
        stream::ReassemblyBuffer,
        tls::{self, Level},
    },
    transport,
    varint::VarInt,
};

/// Progress of the server handshake.
///
/// `ServerHelloSent` and `HandshakeSent` track which flights have been
/// handed to the packet layer; completion is reported by the TLS engine
/// once the client's Finished verifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    ClientHelloReceived,
    ServerHelloSent,
    HandshakeSent,
    Complete,
    Errored,
}

/// Binds the per-level crypto streams to a TLS session.
///
/// Inbound CRYPTO frames reassemble into the level's stream; the contiguous
/// prefix feeds the engine; engine output queues per level until the packet
/// layer drains it into CRYPTO frames. Output offsets only ever move
/// forward — without loss recovery, re-sending the same bytes at the same
/// offset is the retransmission story.
pub struct Driver<S: tls::Session> {
    session: S,
    state: State,
    streams: [ReassemblyBuffer; 2],
    /// queued engine output and the stream offset of its first byte
    pending: [(Vec<u8>, u64); 2],
}

fn stream_index(level: Level) -> Option<usize> {
    match level {
        Level::Initial => Some(0),
        Level::Handshake => Some(1),
        // 1-RTT handshake data (tickets) belongs to the layer above
        Level::OneRtt => None,
    }
}

impl<S: tls::Session> Driver<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            state: State::Idle,
            streams: [ReassemblyBuffer::new(), ReassemblyBuffer::new()],
            pending: [(Vec::new(), 0), (Vec::new(), 0)],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_errored(&self) -> bool {
        self.state == State::Errored
    }

    /// Reassembles one inbound CRYPTO frame and feeds any newly contiguous
    /// bytes to the TLS engine
    pub fn on_crypto_frame(
        &mut self,
        level: Level,
        offset: VarInt,
        data: &[u8],
    ) -> Result<(), transport::Error> {
        let Some(index) = stream_index(level) else {
            return Ok(());
        };

        if let Err(error) = self.process_crypto_frame(level, index, offset, data) {
            self.state = State::Errored;
            return Err(error);
        }

        if self.state == State::Idle && self.streams[0].consumed_offset() > 0 {
            self.state = State::ClientHelloReceived;
        }
        if self.session.is_complete() && self.state != State::Errored {
            self.state = State::Complete;
        }

        Ok(())
    }

    fn process_crypto_frame(
        &mut self,
        level: Level,
        index: usize,
        offset: VarInt,
        data: &[u8],
    ) -> Result<(), transport::Error> {
        self.streams[index].append(offset, data)?;

        let prefix_len = self.streams[index].contiguous_prefix().len();
        if prefix_len == 0 {
            return Ok(());
        }

        self.session
            .on_handshake_data(level, self.streams[index].contiguous_prefix())?;
        self.streams[index].consume(prefix_len);

        Ok(())
    }

    /// The bytes waiting to be packetized at `level` and the crypto stream
    /// offset of their first byte
    pub fn pending_output(&mut self, level: Level) -> Option<(&[u8], u64)> {
        let index = stream_index(level)?;

        if let Some(bytes) = self.session.take_transmission(level) {
            self.pending[index].0.extend_from_slice(&bytes);
        }

        let (bytes, offset) = &self.pending[index];
        if bytes.is_empty() {
            return None;
        }
        Some((bytes, *offset))
    }

    /// Records that the packet layer consumed `len` bytes of pending
    /// output at `level`
    pub fn advance_output(&mut self, level: Level, len: usize) {
        let Some(index) = stream_index(level) else {
            return;
        };

        let (bytes, offset) = &mut self.pending[index];
        debug_assert!(len <= bytes.len());
        bytes.drain(..len);
        *offset += len as u64;

        match level {
            Level::Initial if self.state == State::ClientHelloReceived => {
                self.state = State::ServerHelloSent;
            }
            Level::Handshake if self.state == State::ServerHelloSent && bytes.is_empty() => {
                self.state = State::HandshakeSent;
            }
            _ => {}
        }

        if self.session.is_complete() && self.state != State::Errored {
            self.state = State::Complete;
        }
    }

    pub fn take_handshake_keys(&mut self) -> Option<tls::KeyPair> {
        self.session.take_handshake_keys()
    }

    pub fn take_one_rtt_keys(&mut self) -> Option<tls::KeyPair> {
        self.session.take_one_rtt_keys()
    }

    pub fn peer_transport_parameters(&mut self) -> Option<Vec<u8>> {
        self.session.peer_transport_parameters()
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn alert(&self) -> Option<u8> {
        self.session.alert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn driver_with_output(output: &[u8]) -> Driver<testing::Session> {
        let mut session = testing::Session::default();
        session
            .outputs
            .push_back((Level::Initial, output.to_vec()));
        Driver::new(session)
    }

    #[test]
    fn state_machine_test() {
        let mut driver = driver_with_output(b"server hello");
        assert_eq!(driver.state(), State::Idle);

        driver
            .on_crypto_frame(Level::Initial, VarInt::ZERO, b"client hello")
            .unwrap();
        assert_eq!(driver.state(), State::ClientHelloReceived);

        let (bytes, offset) = driver.pending_output(Level::Initial).unwrap();
        assert_eq!(bytes, b"server hello");
        assert_eq!(offset, 0);

        driver.advance_output(Level::Initial, 6);
        assert_eq!(driver.state(), State::ServerHelloSent);

        // the rest is re-offered at the advanced offset
        let (bytes, offset) = driver.pending_output(Level::Initial).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(offset, 6);
    }

    #[test]
    fn reordered_fragments_reach_the_engine_in_order_test() {
        let mut driver = driver_with_output(b"");

        // second half first; nothing is contiguous yet
        driver
            .on_crypto_frame(Level::Initial, VarInt::from_u8(5), b"hello")
            .unwrap();
        assert!(driver.session.received.is_empty());
        assert_eq!(driver.state(), State::Idle);

        driver
            .on_crypto_frame(Level::Initial, VarInt::ZERO, b"quic ")
            .unwrap();
        assert_eq!(
            driver.session.received,
            vec![(Level::Initial, b"quic hello".to_vec())]
        );
        assert_eq!(driver.state(), State::ClientHelloReceived);
    }

    #[test]
    fn engine_failure_test() {
        let mut session = testing::Session::default();
        session.fail = true;
        let mut driver = Driver::new(session);

        let error = driver
            .on_crypto_frame(Level::Initial, VarInt::ZERO, b"hello")
            .unwrap_err();
        assert!(driver.is_errored());
        // handshake_failure(40) mapped into the CRYPTO_ERROR space
        assert_eq!(error.code.as_u64(), 0x0128);
    }

    #[test]
    fn completion_test() {
        let mut driver = driver_with_output(b"");
        driver.session.complete = true;
        driver
            .on_crypto_frame(Level::Handshake, VarInt::ZERO, b"finished")
            .unwrap();
        assert!(driver.is_complete());
    }
}
