// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::keys;
use blitz_quic_core::{
    crypto::tls::{self, Level},
    transport,
};
use rustls::quic;

/// One server handshake driven through rustls's QUIC API.
///
/// `write_hs` emits bytes for the current write level and reports a
/// `KeyChange` when subsequent output moves to the next level; the session
/// buffers output per level so the packet layer can drain each epoch
/// independently.
pub struct Session {
    connection: quic::ServerConnection,
    transmissions: [Vec<u8>; 3],
    write_level: Level,
    handshake_keys: Option<tls::KeyPair>,
    one_rtt_keys: Option<tls::KeyPair>,
}

fn level_index(level: Level) -> usize {
    match level {
        Level::Initial => 0,
        Level::Handshake => 1,
        Level::OneRtt => 2,
    }
}

impl Session {
    pub(crate) fn new(connection: quic::ServerConnection) -> Self {
        Self {
            connection,
            transmissions: [Vec::new(), Vec::new(), Vec::new()],
            write_level: Level::Initial,
            handshake_keys: None,
            one_rtt_keys: None,
        }
    }

    fn drain_output(&mut self) {
        loop {
            let mut chunk = Vec::new();
            let key_change = self.connection.write_hs(&mut chunk);

            if chunk.is_empty() && key_change.is_none() {
                return;
            }

            if !chunk.is_empty() {
                self.transmissions[level_index(self.write_level)].extend_from_slice(&chunk);
            }

            match key_change {
                Some(quic::KeyChange::Handshake { keys }) => {
                    self.handshake_keys = Some(keys::key_pair(keys));
                    self.write_level = Level::Handshake;
                }
                Some(quic::KeyChange::OneRtt { keys, .. }) => {
                    self.one_rtt_keys = Some(keys::key_pair(keys));
                    self.write_level = Level::OneRtt;
                }
                None => {}
            }
        }
    }

    fn handshake_error(&self) -> transport::Error {
        match self.connection.alert() {
            //= https://www.rfc-editor.org/rfc/rfc9001#section-4.8
            //# Alert descriptions are added to 0x0100 to produce a QUIC error
            //# code from the range reserved for CRYPTO_ERROR.
            Some(alert) => transport::Error::crypto_error(u8::from(alert))
                .with_reason("the tls handshake raised an alert"),
            None => transport::Error::INTERNAL_ERROR.with_reason("tls handshake failure"),
        }
    }
}

impl tls::Session for Session {
    fn on_handshake_data(&mut self, _level: Level, data: &[u8]) -> Result<(), transport::Error> {
        // rustls tracks the read level internally and rejects data that
        // arrives at the wrong one
        self.connection
            .read_hs(data)
            .map_err(|_| self.handshake_error())?;
        self.drain_output();
        Ok(())
    }

    fn take_transmission(&mut self, level: Level) -> Option<Vec<u8>> {
        self.drain_output();

        let buffer = &mut self.transmissions[level_index(level)];
        if buffer.is_empty() {
            None
        } else {
            Some(core::mem::take(buffer))
        }
    }

    fn take_handshake_keys(&mut self) -> Option<tls::KeyPair> {
        self.drain_output();
        self.handshake_keys.take()
    }

    fn take_one_rtt_keys(&mut self) -> Option<tls::KeyPair> {
        self.drain_output();
        self.one_rtt_keys.take()
    }

    fn peer_transport_parameters(&mut self) -> Option<Vec<u8>> {
        self.connection
            .quic_transport_parameters()
            .map(|params| params.to_vec())
    }

    fn is_complete(&self) -> bool {
        !self.connection.is_handshaking()
    }

    fn alert(&self) -> Option<u8> {
        self.connection.alert().map(u8::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Server;
    use blitz_quic_core::crypto::tls::Endpoint as _;
    use blitz_quic_core::crypto::tls::Session as _;
    use blitz_quic_core::crypto::Key as _;
    use rustls::quic::{ClientConnection, KeyChange, Version};
    use rustls::{ClientConfig, RootCertStore};
    use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer, ServerName};
    use std::sync::Arc;

    fn server() -> (Server, CertificateDer<'static>) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert = certified.cert.der().clone();
        let key = PrivateKeyDer::try_from(certified.key_pair.serialize_der()).unwrap();
        let server = Server::new(vec![cert.clone()], key).unwrap();
        (server, cert)
    }

    fn client(root: CertificateDer<'static>, params: &[u8]) -> ClientConnection {
        let mut roots = RootCertStore::empty();
        roots.add(root).unwrap();

        let mut config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h3".to_vec()];

        ClientConnection::new(
            Arc::new(config),
            Version::V1,
            ServerName::try_from("localhost").unwrap(),
            params.to_vec(),
        )
        .unwrap()
    }

    /// PEM parsing is part of the server binary's surface; keep the
    /// round-trip honest here.
    #[test]
    fn pem_key_round_trip_test() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let pem = certified.key_pair.serialize_pem();
        assert!(PrivateKeyDer::from_pem_slice(pem.as_bytes()).is_ok());
    }

    #[test]
    fn full_handshake_test() {
        let (mut server, cert) = server();
        let mut session = server.new_server_session(b"\x01\x02\x00\x05").unwrap();
        let mut client = client(cert, b"\x03\x04\x00\x06");

        // ClientHello
        let mut client_hello = Vec::new();
        assert!(client.write_hs(&mut client_hello).is_none());
        assert!(!client_hello.is_empty());

        session
            .on_handshake_data(Level::Initial, &client_hello)
            .unwrap();

        // ServerHello at the Initial level
        let server_hello = session.take_transmission(Level::Initial).unwrap();
        assert_eq!(server_hello[0], 0x02, "expected a ServerHello");

        // EncryptedExtensions..Finished at the Handshake level
        let server_flight = session.take_transmission(Level::Handshake).unwrap();
        assert!(!server_flight.is_empty());
        let handshake_keys = session.take_handshake_keys().unwrap();
        assert_eq!(handshake_keys.key.tag_len(), 16);

        // the server is not complete until the client's Finished arrives
        assert!(!session.is_complete());

        // drive the client through the server flight
        client.read_hs(&server_hello).unwrap();
        let mut client_flight = Vec::new();
        assert!(matches!(
            client.write_hs(&mut client_flight),
            Some(KeyChange::Handshake { .. })
        ));
        client.read_hs(&server_flight).unwrap();
        let mut client_finished = Vec::new();
        assert!(matches!(
            client.write_hs(&mut client_finished),
            Some(KeyChange::OneRtt { .. })
        ));
        client_flight.extend_from_slice(&client_finished);
        assert!(!client_flight.is_empty());

        session
            .on_handshake_data(Level::Handshake, &client_flight)
            .unwrap();

        assert!(session.is_complete());
        assert!(session.take_one_rtt_keys().is_some());
        assert_eq!(
            session.peer_transport_parameters().unwrap(),
            b"\x03\x04\x00\x06"
        );
    }

    #[test]
    fn garbage_client_hello_test() {
        let (mut server, _cert) = server();
        let mut session = server.new_server_session(&[]).unwrap();

        let error = session
            .on_handshake_data(Level::Initial, &[0xff; 64])
            .unwrap_err();
        // the failure maps into the CRYPTO_ERROR range when an alert exists
        assert!(session.alert().is_some() || error.code.as_u64() < 0x0200);
    }
}
