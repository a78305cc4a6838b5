// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The contract between the QUIC core and a TLS 1.3 engine.
//!
//! QUIC removes the TLS record layer: the core shuttles raw handshake
//! bytes per encryption level and receives packet protection keys as the
//! engine derives them. Any RFC 8446 implementation with a QUIC epoch
//! output API can sit behind [`Session`].

use crate::{
    crypto::{HeaderKey, Key},
    transport,
};
use core::fmt;

/// An encryption level carrying handshake bytes
//= https://www.rfc-editor.org/rfc/rfc9001#section-2.1
//# Data is protected using a number of encryption levels:
//#
//# *  Initial keys
//# *  Early data (0-RTT) keys
//# *  Handshake keys
//# *  1-RTT keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    Initial,
    Handshake,
    OneRtt,
}

/// Packet protection keys for one level: a sealer/opener [`Key`] and the
/// matching header protection key
pub struct KeyPair {
    pub key: Box<dyn Key>,
    pub header_key: Box<dyn HeaderKey>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").finish()
    }
}

/// One server-side TLS 1.3 handshake in progress
pub trait Session: Send {
    /// Feeds handshake bytes received at `level`.
    ///
    /// The input is the contiguous prefix of that level's crypto stream;
    /// the engine buffers internally, so every call consumes the entire
    /// input or fails the handshake.
    fn on_handshake_data(&mut self, level: Level, data: &[u8]) -> Result<(), transport::Error>;

    /// Drains handshake bytes the engine wants transmitted at `level`
    fn take_transmission(&mut self, level: Level) -> Option<Vec<u8>>;

    /// Hands over the Handshake-level keys once the engine derived them
    fn take_handshake_keys(&mut self) -> Option<KeyPair>;

    /// Hands over the 1-RTT keys once the engine derived them
    fn take_one_rtt_keys(&mut self) -> Option<KeyPair>;

    /// The peer's raw transport parameters extension, once seen
    fn peer_transport_parameters(&mut self) -> Option<Vec<u8>>;

    //= https://www.rfc-editor.org/rfc/rfc9001#section-4.1.1
    //# The TLS handshake is considered complete when the
    //# TLS stack has reported that the handshake is complete.
    fn is_complete(&self) -> bool;

    /// The TLS alert that failed the handshake, if one was raised
    fn alert(&self) -> Option<u8>;
}

/// A TLS engine that can mint server sessions.
///
/// Holds certificate and signing material; the core never sees either. An
/// engine is handed to the connection table at construction instead of
/// living in process-global state.
pub trait Endpoint: 'static + Send {
    type Session: Session;

    /// Starts a server handshake advertising `transport_parameters`
    /// (already encoded) in the quic_transport_parameters extension
    fn new_server_session(
        &mut self,
        transport_parameters: &[u8],
    ) -> Result<Self::Session, transport::Error>;
}
