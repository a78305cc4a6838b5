// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::Config,
    connection::{Connection, MIN_INITIAL_DATAGRAM_LEN},
};
use blitz_codec::EncoderBuffer;
use blitz_quic_core::{
    connection::ConnectionId,
    crypto::tls,
    packet::{
        long::{LongHeader, PacketType, QUIC_VERSION},
        short::ShortHeader,
        version_negotiation::VersionNegotiation,
    },
};
use rand::RngCore;
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    time::Instant,
};
use tracing::{debug, trace};

/// The length of the connection IDs this endpoint hands out
pub const LOCAL_CID_LEN: usize = 8;

//= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
//# A server MUST discard an Initial packet that is carried in a UDP
//# datagram with a payload that is smaller than the smallest allowed
//# maximum datagram size of 1200 bytes.

/// Demultiplexes datagrams to connections by destination connection ID and
/// accepts new connections on their first Initial.
///
/// Two routes resolve every connection: the server-chosen CID, and the
/// client's original DCID for packets the client sends before it adopts
/// the server's choice.
///
/// Address validation runs in accept-all mode: no Retry token is issued or
/// demanded. A token scheme only has to bind the client address and a
/// timestamp under a key held here, so it can validate statelessly; the
/// hook for it is this accept path.
pub struct Endpoint<Provider: tls::Endpoint> {
    config: Config,
    tls: Provider,
    connections: HashMap<ConnectionId, Connection<Provider::Session>>,
    initial_routes: HashMap<ConnectionId, ConnectionId>,
    transmit_queue: VecDeque<ConnectionId>,
    version_negotiation_queue: VecDeque<(SocketAddr, Vec<u8>)>,
}

impl<Provider: tls::Endpoint> Endpoint<Provider> {
    pub fn new(config: Config, tls: Provider) -> Self {
        Self {
            config,
            tls,
            connections: HashMap::new(),
            initial_routes: HashMap::new(),
            transmit_queue: VecDeque::new(),
            version_negotiation_queue: VecDeque::new(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn established_count(&self) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.is_established())
            .count()
    }

    /// Routes one received datagram, creating a connection when a valid
    /// Initial arrives for an unknown DCID
    pub fn on_datagram(&mut self, peer: SocketAddr, datagram: &mut [u8], now: Instant) {
        // too short to carry any QUIC header
        if datagram.len() < 7 {
            trace!(peer = %peer, len = datagram.len(), "dropping truncated datagram");
            return;
        }

        if datagram[0] & 0x80 == 0 {
            let Ok(header) = ShortHeader::decode(datagram, LOCAL_CID_LEN) else {
                trace!(peer = %peer, "dropping undecodable short header");
                return;
            };
            let Some(connection) = self.connections.get_mut(&header.destination_connection_id)
            else {
                trace!(peer = %peer, "dropping short header for unknown connection");
                return;
            };
            connection.receive(datagram, now);
            self.transmit_queue.push_back(header.destination_connection_id);
            return;
        }

        let header = match LongHeader::decode(datagram) {
            Ok(header) => header,
            Err(error) => {
                debug!(peer = %peer, %error, "dropping undecodable long header");
                return;
            }
        };

        //= https://www.rfc-editor.org/rfc/rfc9000#section-6.1
        //# If a server receives a packet that indicates an unsupported
        //# version and if the packet is large enough to initiate a new
        //# connection for any supported version, the server SHOULD send a
        //# Version Negotiation packet
        if header.version != QUIC_VERSION {
            // version zero is a Version Negotiation packet itself; never
            // answer one with another
            if header.version != 0 && datagram.len() >= MIN_INITIAL_DATAGRAM_LEN {
                self.queue_version_negotiation(peer, &header);
            }
            return;
        }

        let local_cid = if self.connections.contains_key(&header.destination_connection_id) {
            header.destination_connection_id
        } else if let Some(mapped) = self.initial_routes.get(&header.destination_connection_id) {
            *mapped
        } else {
            if header.packet_type != PacketType::Initial {
                trace!(peer = %peer, "dropping non-initial packet for unknown connection");
                return;
            }
            if datagram.len() < MIN_INITIAL_DATAGRAM_LEN {
                debug!(peer = %peer, len = datagram.len(), "dropping undersized initial");
                return;
            }
            match self.accept(&header, peer, now) {
                Some(local_cid) => local_cid,
                None => return,
            }
        };

        if let Some(connection) = self.connections.get_mut(&local_cid) {
            connection.receive(datagram, now);
            self.transmit_queue.push_back(local_cid);
        }
    }

    fn accept(&mut self, header: &LongHeader, peer: SocketAddr, now: Instant) -> Option<ConnectionId> {
        let local_cid = self.generate_local_cid();

        let mut parameters = self.config.local_parameters.clone();
        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# This parameter is the value of the Destination Connection ID field
        //# from the first Initial packet sent by the client
        parameters.original_destination_connection_id = Some(header.destination_connection_id);
        parameters.initial_source_connection_id = Some(local_cid);

        let mut encoded = vec![0u8; blitz_codec::EncoderValue::encoding_size(&parameters)];
        let mut encoder = EncoderBuffer::new(&mut encoded);
        encoder.encode(&parameters);

        let session = match self.tls.new_server_session(&encoded) {
            Ok(session) => session,
            Err(error) => {
                debug!(peer = %peer, %error, "refusing connection: tls session failed");
                return None;
            }
        };

        let connection = Connection::new(
            local_cid,
            header.source_connection_id,
            &header.destination_connection_id,
            peer,
            session,
            self.config.handshake_timeout,
            self.config.idle_timeout(),
            now,
        );

        debug!(peer = %peer, cid = ?local_cid, "accepted connection");
        self.connections.insert(local_cid, connection);
        self.initial_routes
            .insert(header.destination_connection_id, local_cid);

        Some(local_cid)
    }

    fn generate_local_cid(&self) -> ConnectionId {
        loop {
            let mut bytes = [0u8; LOCAL_CID_LEN];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            let cid = ConnectionId::try_from_bytes(&bytes).expect("cid length is in range");
            if !self.connections.contains_key(&cid) {
                return cid;
            }
        }
    }

    fn queue_version_negotiation(&mut self, peer: SocketAddr, header: &LongHeader) {
        let packet = VersionNegotiation::from_long_header(header);
        let mut encoded = vec![0u8; blitz_codec::EncoderValue::encoding_size(&packet)];
        let mut encoder = EncoderBuffer::new(&mut encoded);
        encoder.encode(&packet);

        debug!(peer = %peer, version = header.version, "queueing version negotiation");
        self.version_negotiation_queue.push_back((peer, encoded));
    }

    /// Fills `slot` with the next outgoing datagram, if any
    pub fn poll_transmit(&mut self, slot: &mut [u8]) -> Option<(SocketAddr, usize)> {
        if let Some((peer, packet)) = self.version_negotiation_queue.pop_front() {
            slot[..packet.len()].copy_from_slice(&packet);
            return Some((peer, packet.len()));
        }

        while let Some(cid) = self.transmit_queue.pop_front() {
            let Some(connection) = self.connections.get_mut(&cid) else {
                continue;
            };

            if let Some(len) = connection.next_outgoing(slot) {
                let peer = connection.peer_addr();
                if connection.is_closed() {
                    self.remove(&cid);
                } else {
                    // more datagrams may follow for the same connection
                    self.transmit_queue.push_front(cid);
                }
                return Some((peer, len));
            }

            if connection.is_closed() {
                self.remove(&cid);
            }
        }

        None
    }

    pub fn transmit_pending(&self) -> bool {
        !self.transmit_queue.is_empty() || !self.version_negotiation_queue.is_empty()
    }

    /// The earliest deadline any connection is waiting on
    pub fn next_deadline(&self) -> Option<Instant> {
        self.connections
            .values()
            .filter_map(Connection::next_timeout)
            .min()
    }

    /// Expires handshakes and idle connections; both are silent removals
    pub fn on_timeout(&mut self, now: Instant) {
        let expired: Vec<ConnectionId> = self
            .connections
            .iter_mut()
            .filter_map(|(cid, connection)| connection.on_timeout(now).then_some(*cid))
            .collect();

        for cid in expired {
            self.remove(&cid);
        }
    }

    fn remove(&mut self, cid: &ConnectionId) {
        if self.connections.remove(cid).is_some() {
            self.initial_routes.retain(|_, mapped| mapped != cid);
            debug!(cid = ?cid, "removed connection");
        }
    }
}
