// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Drives a real rustls client against the endpoint through actual QUIC
//! packets: Initial key derivation, header protection, AEAD, CRYPTO
//! reassembly and the handshake state machine all sit on this path.

use blitz_codec::{EncoderBuffer, EncoderValue};
use blitz_quic_core::{
    connection::ConnectionId,
    crypto::{
        self,
        stream::ReassemblyBuffer,
        tls::{KeyPair, Level},
        HeaderKey, InitialKey as _, Key,
    },
    frame::{Crypto, Frame, FrameIter, Padding},
    packet::{
        long::{LongHeader, LongHeaderBuilder, PacketType, QUIC_VERSION},
        number::PacketNumberSpace,
    },
    transport::parameters::TransportParameters,
    varint::VarInt,
};
use blitz_quic_crypto::{InitialHeaderKey, InitialKey, TAG_LEN};
use blitz_quic_server::{endpoint::Endpoint, Config};
use rustls::quic::{ClientConnection, KeyChange, Version};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Instant;

fn peer() -> SocketAddr {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, 40_000).into()
}

fn server_endpoint(alpn: &[u8]) -> (Endpoint<blitz_quic_rustls::Server>, CertificateDer<'static>) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::try_from(certified.key_pair.serialize_der()).unwrap();

    let tls = blitz_quic_rustls::Server::new(vec![cert.clone()], key)
        .unwrap()
        .with_application_protocols([alpn.to_vec()]);

    (Endpoint::new(Config::default(), tls), cert)
}

/// A minimal QUIC client: enough state to complete one handshake
struct TestClient {
    tls: ClientConnection,
    initial_key: InitialKey,
    initial_header_key: InitialHeaderKey,
    handshake_keys: Option<KeyPair>,
    reached_one_rtt: bool,
    streams: [ReassemblyBuffer; 2],
    initial_dcid: ConnectionId,
    scid: ConnectionId,
    /// the server's CID, learned from its first Initial
    server_cid: Option<ConnectionId>,
    /// handshake bytes rustls wants sent, not yet packetized
    pending_tx: Vec<u8>,
    next_tx: [u64; 2],
    saw_server_hello: bool,
    saw_ack: bool,
    close_code: Option<u64>,
}

impl TestClient {
    fn new(root: CertificateDer<'static>, initial_dcid: &[u8], scid: &[u8]) -> Self {
        let mut roots = RootCertStore::empty();
        roots.add(root).unwrap();

        let mut config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h3".to_vec()];

        let scid = ConnectionId::try_from_bytes(scid).unwrap();

        let mut parameters = TransportParameters::default();
        parameters.initial_source_connection_id = Some(scid);
        let mut encoded = vec![0u8; parameters.encoding_size()];
        EncoderBuffer::new(&mut encoded).encode(&parameters);

        let tls = ClientConnection::new(
            Arc::new(config),
            Version::V1,
            ServerName::try_from("localhost").unwrap(),
            encoded,
        )
        .unwrap();

        let (initial_key, initial_header_key) = InitialKey::new_client(initial_dcid);

        Self {
            tls,
            initial_key,
            initial_header_key,
            handshake_keys: None,
            reached_one_rtt: false,
            streams: [ReassemblyBuffer::new(), ReassemblyBuffer::new()],
            initial_dcid: ConnectionId::try_from_bytes(initial_dcid).unwrap(),
            scid,
            server_cid: None,
            pending_tx: Vec::new(),
            next_tx: [0, 0],
            saw_server_hello: false,
            saw_ack: false,
            close_code: None,
        }
    }

    /// Wraps `crypto_data` into a protected long-header packet
    fn seal_packet(
        &mut self,
        packet_type: PacketType,
        dcid: ConnectionId,
        crypto_data: &[u8],
        pad_to: Option<usize>,
    ) -> Vec<u8> {
        let (key, header_key): (&dyn Key, &dyn HeaderKey) = match packet_type {
            PacketType::Initial => (&self.initial_key, &self.initial_header_key),
            _ => {
                let keys = self.handshake_keys.as_ref().unwrap();
                (keys.key.as_ref(), keys.header_key.as_ref())
            }
        };

        let (space, space_index) = match packet_type {
            PacketType::Initial => (PacketNumberSpace::Initial, 0),
            _ => (PacketNumberSpace::Handshake, 1),
        };
        let packet_number =
            space.new_packet_number(VarInt::new(self.next_tx[space_index]).unwrap());
        self.next_tx[space_index] += 1;
        let truncated = packet_number
            .truncate(space.new_packet_number(VarInt::ZERO))
            .unwrap();

        let crypto_frame = Crypto {
            offset: VarInt::ZERO,
            data: crypto_data,
        };

        let header_overhead = 1
            + 4
            + (1 + dcid.len())
            + (1 + self.scid.len())
            + usize::from(packet_type == PacketType::Initial)
            + 2
            + truncated.len().bytesize();
        let natural = header_overhead + crypto_frame.encoding_size() + TAG_LEN;
        let total = pad_to.map_or(natural, |target| natural.max(target));
        let padding = total - natural;

        let builder = LongHeaderBuilder {
            packet_type,
            destination_connection_id: dcid,
            source_connection_id: self.scid,
        };

        let mut datagram = vec![0u8; total];
        let mut encoder = EncoderBuffer::new(&mut datagram);
        let payload_len = crypto_frame.encoding_size() + padding;
        let header_len = builder.encode(truncated, payload_len + TAG_LEN, &mut encoder);
        encoder.encode(&crypto_frame);
        if padding > 0 {
            encoder.encode(&Padding { length: padding });
        }
        encoder.write_zerofill(TAG_LEN);
        assert_eq!(encoder.len(), total);

        let mut payload =
            crypto::EncryptedPayload::new(header_len, truncated.len(), &mut datagram[..]);
        crypto::encrypt(key, packet_number, &mut payload).unwrap();
        crypto::protect(header_key, payload).unwrap();

        datagram
    }

    fn initial_flight(&mut self) -> Vec<u8> {
        let mut client_hello = Vec::new();
        assert!(self.tls.write_hs(&mut client_hello).is_none());

        let dcid = self.initial_dcid;
        self.seal_packet(PacketType::Initial, dcid, &client_hello, Some(1200))
    }

    /// Opens every packet of one server datagram and feeds CRYPTO data to
    /// the client TLS engine
    fn on_datagram(&mut self, datagram: &mut [u8]) {
        let mut offset = 0;
        while offset < datagram.len() {
            let remaining = &mut datagram[offset..];
            let header = LongHeader::decode(remaining).unwrap();
            assert_eq!(header.version, QUIC_VERSION);
            let packet_len = header.packet_len();

            self.on_packet(&header, &mut remaining[..packet_len]);
            offset += packet_len;
        }
    }

    fn on_packet(&mut self, header: &LongHeader, packet: &mut [u8]) {
        let (level, space, stream_index): (_, _, usize) = match header.packet_type {
            PacketType::Initial => (Level::Initial, PacketNumberSpace::Initial, 0),
            PacketType::Handshake => (Level::Handshake, PacketNumberSpace::Handshake, 1),
            other => panic!("unexpected packet type {other:?}"),
        };

        if self.server_cid.is_none() {
            self.server_cid = Some(header.source_connection_id);
        }

        let (key, header_key): (&dyn Key, &dyn HeaderKey) = match level {
            Level::Initial => (&self.initial_key, &self.initial_header_key),
            _ => {
                let keys = self.handshake_keys.as_ref().expect("handshake keys");
                (keys.key.as_ref(), keys.header_key.as_ref())
            }
        };

        let payload = crypto::ProtectedPayload::new(header.header_len, packet);
        let (truncated, encrypted) = crypto::unprotect(header_key, space, payload).unwrap();
        let packet_number = truncated.expand(space.new_packet_number(VarInt::ZERO));
        let (_, cleartext) = crypto::decrypt(key, packet_number, encrypted).unwrap();

        for frame in FrameIter::new(cleartext) {
            match frame.unwrap() {
                Frame::Crypto(frame) => {
                    if stream_index == 0 && frame.offset == VarInt::ZERO {
                        // the first byte of the initial stream is the TLS
                        // ServerHello message type
                        self.saw_server_hello = frame.data.first() == Some(&0x02);
                    }
                    self.streams[stream_index]
                        .append(frame.offset, frame.data)
                        .unwrap();
                }
                Frame::Ack(_) => self.saw_ack = true,
                Frame::ConnectionClose(close) => {
                    self.close_code = Some(close.error_code.as_u64());
                }
                Frame::Padding(_) | Frame::Ping(_) => {}
            }
        }

        self.pump_tls();
    }

    /// Feeds newly contiguous CRYPTO bytes to rustls and captures key
    /// upgrades
    fn pump_tls(&mut self) {
        for stream in &mut self.streams {
            let prefix_len = stream.contiguous_prefix().len();
            if prefix_len == 0 {
                continue;
            }
            self.tls.read_hs(stream.contiguous_prefix()).unwrap();
            stream.consume(prefix_len);
        }

        loop {
            let mut output = Vec::new();
            let key_change = self.tls.write_hs(&mut output);
            self.pending_tx.extend_from_slice(&output);

            match key_change {
                Some(KeyChange::Handshake { keys }) => {
                    self.handshake_keys = Some(blitz_quic_rustls::key_pair(keys));
                }
                Some(KeyChange::OneRtt { .. }) => {
                    self.reached_one_rtt = true;
                }
                None => break,
            }
        }
    }
}

const INITIAL_DCID: [u8; 8] = [0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08];

/// The full accept path: ClientHello in, ServerHello and the handshake
/// flight out, Finished in, connection established.
#[test]
fn handshake_acceptance_test() {
    let (mut endpoint, cert) = server_endpoint(b"h3");
    let mut client = TestClient::new(cert, &INITIAL_DCID, &[0x11; 4]);
    let now = Instant::now();

    let mut datagram = client.initial_flight();
    endpoint.on_datagram(peer(), &mut datagram, now);
    assert_eq!(endpoint.connection_count(), 1);

    // drain the server's first flight
    let mut slot = [0u8; 1500];
    while let Some((addr, len)) = endpoint.poll_transmit(&mut slot) {
        assert_eq!(addr, peer());
        client.on_datagram(&mut slot[..len]);
    }

    assert!(client.saw_server_hello, "no ServerHello in the first flight");
    assert!(client.saw_ack, "the client initial was never acknowledged");
    assert!(
        client.reached_one_rtt,
        "the server flight did not complete the client handshake"
    );
    assert!(!endpoint_established(&endpoint));

    // return the client Finished
    let server_cid = client.server_cid.unwrap();
    let finished = std::mem::take(&mut client.pending_tx);
    assert!(!finished.is_empty());
    let mut datagram = client.seal_packet(PacketType::Handshake, server_cid, &finished, None);
    endpoint.on_datagram(peer(), &mut datagram, now);

    assert!(endpoint_established(&endpoint), "server did not complete");

    // the Finished is acknowledged at the handshake level
    client.saw_ack = false;
    while let Some((_, len)) = endpoint.poll_transmit(&mut slot) {
        client.on_datagram(&mut slot[..len]);
    }
    assert!(client.saw_ack);
}

/// An ALPN mismatch fails the handshake with a CONNECTION_CLOSE carrying
/// a TLS alert code, and the connection is reaped.
#[test]
fn alpn_mismatch_close_test() {
    let (mut endpoint, cert) = server_endpoint(b"definitely-not-h3");
    let mut client = TestClient::new(cert, &[0x42; 8], &[0x12; 4]);
    let now = Instant::now();

    let mut datagram = client.initial_flight();
    endpoint.on_datagram(peer(), &mut datagram, now);
    assert_eq!(endpoint.connection_count(), 1);

    let mut slot = [0u8; 1500];
    while let Some((_, len)) = endpoint.poll_transmit(&mut slot) {
        client.on_datagram(&mut slot[..len]);
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#section-4.8
    //# Alert descriptions are added to 0x0100
    let code = client.close_code.expect("expected a connection close");
    assert!((0x0100..0x0200).contains(&code), "code {code:#x}");

    // closed connections leave the table
    assert_eq!(endpoint.connection_count(), 0);
}

fn endpoint_established(endpoint: &Endpoint<blitz_quic_rustls::Server>) -> bool {
    endpoint.established_count() == 1
}
