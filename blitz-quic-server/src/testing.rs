// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scripted TLS stand-ins for exercising the transport without a real
//! engine.

use blitz_quic_core::{
    crypto::tls::{self, Level},
    transport,
};
use std::collections::VecDeque;

/// Replays a fixed set of per-level outputs and records what it was fed
#[derive(Default)]
pub(crate) struct Session {
    pub received: Vec<(Level, Vec<u8>)>,
    pub outputs: VecDeque<(Level, Vec<u8>)>,
    pub complete: bool,
    pub fail: bool,
}

impl tls::Session for Session {
    fn on_handshake_data(&mut self, level: Level, data: &[u8]) -> Result<(), transport::Error> {
        if self.fail {
            return Err(transport::Error::crypto_error(40));
        }
        self.received.push((level, data.to_vec()));
        Ok(())
    }

    fn take_transmission(&mut self, level: Level) -> Option<Vec<u8>> {
        if self.outputs.front()?.0 == level {
            self.outputs.pop_front().map(|(_, bytes)| bytes)
        } else {
            None
        }
    }

    fn take_handshake_keys(&mut self) -> Option<tls::KeyPair> {
        None
    }

    fn take_one_rtt_keys(&mut self) -> Option<tls::KeyPair> {
        None
    }

    fn peer_transport_parameters(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn alert(&self) -> Option<u8> {
        self.fail.then_some(40)
    }
}

/// Mints [`Session`]s that echo `output` on the Initial level
#[derive(Default)]
pub(crate) struct Provider {
    pub initial_output: Vec<u8>,
}

impl tls::Endpoint for Provider {
    type Session = Session;

    fn new_server_session(
        &mut self,
        _transport_parameters: &[u8],
    ) -> Result<Self::Session, transport::Error> {
        let mut session = Session::default();
        if !self.initial_output.is_empty() {
            session
                .outputs
                .push_back((Level::Initial, self.initial_output.clone()));
        }
        Ok(session)
    }
}
