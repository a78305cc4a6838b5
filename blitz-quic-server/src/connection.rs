// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::handshake;
use blitz_codec::{DecoderBuffer, EncoderBuffer, EncoderValue};
use blitz_quic_core::{
    connection::ConnectionId,
    crypto::{
        self,
        tls::{self, Level},
        HeaderKey, InitialKey as _, Key, ProtectedPayload,
    },
    frame::{Ack, ConnectionClose, Crypto, Frame, FrameIter, Padding},
    packet::{
        long::{LongHeader, LongHeaderBuilder, PacketType},
        number::{PacketNumber, PacketNumberSpace},
    },
    transport::{self, parameters::TransportParameters},
    varint::VarInt,
};
use blitz_quic_crypto::{InitialHeaderKey, InitialKey};
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};
use tracing::{debug, trace};

//= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
//# a server MUST expand the payload of all UDP datagrams carrying ack-
//# eliciting Initial packets to at least the smallest allowed maximum
//# datagram size of 1200 bytes.
pub const MIN_INITIAL_DATAGRAM_LEN: usize = 1200;

// worst case for the long-header Length field under a 1500-byte slot
const LENGTH_FIELD_LEN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Handshaking,
    Connected,
    Errored,
    Closed,
}

/// Send/receive packet number bookkeeping for one encryption level
#[derive(Debug)]
struct PacketSpace {
    space: PacketNumberSpace,
    next_tx: u64,
    largest_received: Option<PacketNumber>,
    ack_needed: bool,
}

impl PacketSpace {
    fn new(space: PacketNumberSpace) -> Self {
        Self {
            space,
            next_tx: 0,
            largest_received: None,
            ack_needed: false,
        }
    }

    /// The expansion basis for truncated packet numbers
    fn largest_received_or_zero(&self) -> PacketNumber {
        self.largest_received
            .unwrap_or_else(|| self.space.new_packet_number(VarInt::ZERO))
    }

    /// Records an authenticated receipt; `largest_received` is monotone
    fn on_packet_received(&mut self, packet_number: PacketNumber, ack_eliciting: bool) {
        if self
            .largest_received
            .map_or(true, |largest| packet_number > largest)
        {
            self.largest_received = Some(packet_number);
        }
        if ack_eliciting {
            self.ack_needed = true;
        }
    }

}

/// One accepted QUIC connection during and after its handshake.
///
/// Initial keys are derived from the client's first DCID at construction;
/// Handshake and 1-RTT keys install as the TLS engine produces them. All
/// operations are synchronous — the connection suspends only between
/// datagrams.
pub struct Connection<S: tls::Session> {
    state: State,
    local_cid: ConnectionId,
    remote_cid: ConnectionId,
    peer_addr: SocketAddr,
    driver: handshake::Driver<S>,
    initial_key: InitialKey,
    initial_header_key: InitialHeaderKey,
    handshake_keys: Option<tls::KeyPair>,
    one_rtt_keys: Option<tls::KeyPair>,
    spaces: [PacketSpace; 3],
    peer_parameters: Option<TransportParameters>,
    close_error: Option<transport::Error>,
    handshake_deadline: Instant,
    idle_timeout: Option<Duration>,
    idle_deadline: Option<Instant>,
}

impl<S: tls::Session> Connection<S> {
    pub fn new(
        local_cid: ConnectionId,
        remote_cid: ConnectionId,
        initial_dcid: &ConnectionId,
        peer_addr: SocketAddr,
        session: S,
        handshake_timeout: Duration,
        idle_timeout: Option<Duration>,
        now: Instant,
    ) -> Self {
        let (initial_key, initial_header_key) = InitialKey::new_server(initial_dcid.as_bytes());

        Self {
            state: State::Handshaking,
            local_cid,
            remote_cid,
            peer_addr,
            driver: handshake::Driver::new(session),
            initial_key,
            initial_header_key,
            handshake_keys: None,
            one_rtt_keys: None,
            spaces: [
                PacketSpace::new(PacketNumberSpace::Initial),
                PacketSpace::new(PacketNumberSpace::Handshake),
                PacketSpace::new(PacketNumberSpace::ApplicationData),
            ],
            peer_parameters: None,
            close_error: None,
            handshake_deadline: now + handshake_timeout,
            idle_timeout,
            idle_deadline: idle_timeout.map(|timeout| now + timeout),
        }
    }

    pub fn local_cid(&self) -> &ConnectionId {
        &self.local_cid
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Connected
    }

    /// The peer's transport parameters, once the handshake produced them
    pub fn peer_parameters(&self) -> Option<&TransportParameters> {
        self.peer_parameters.as_ref()
    }

    /// The 1-RTT keys, once the handshake produced them.
    ///
    /// The application data plane above this crate picks these up when it
    /// takes over an established connection.
    pub fn one_rtt_keys(&self) -> Option<&tls::KeyPair> {
        self.one_rtt_keys.as_ref()
    }

    /// The earliest instant at which this connection wants a timeout check
    pub fn next_timeout(&self) -> Option<Instant> {
        let handshake = (self.state == State::Handshaking).then_some(self.handshake_deadline);
        match (handshake, self.idle_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }

    /// Returns `true` when the connection expired and must be removed.
    ///
    /// Both expirations are silent: a handshake deadline fires before any
    /// trust is established, and an idle peer is not listening.
    pub fn on_timeout(&mut self, now: Instant) -> bool {
        if self.state == State::Handshaking && now >= self.handshake_deadline {
            debug!(peer = %self.peer_addr, "handshake deadline expired");
            self.state = State::Closed;
            return true;
        }
        if let Some(deadline) = self.idle_deadline {
            if now >= deadline {
                debug!(peer = %self.peer_addr, "idle timeout expired");
                self.state = State::Closed;
                return true;
            }
        }
        false
    }

    /// Processes one UDP datagram, which may carry several coalesced
    /// packets. Per-packet failures drop the packet, never the connection.
    pub fn receive(&mut self, datagram: &mut [u8], now: Instant) {
        if matches!(self.state, State::Closed | State::Errored) {
            return;
        }

        if let Some(timeout) = self.idle_timeout {
            self.idle_deadline = Some(now + timeout);
        }

        let mut offset = 0;
        while offset < datagram.len() && !matches!(self.state, State::Closed | State::Errored) {
            let remaining = &mut datagram[offset..];

            if remaining[0] & 0x80 == 0 {
                // 1-RTT short header: the application data plane starts
                // here and is handed off above this crate
                trace!(peer = %self.peer_addr, "ignoring short header packet");
                return;
            }

            let header = match LongHeader::decode(remaining) {
                Ok(header) => header,
                Err(error) => {
                    debug!(peer = %self.peer_addr, %error, "dropping undecodable packet");
                    return;
                }
            };

            let packet_len = header.packet_len();
            self.on_long_packet(&header, &mut remaining[..packet_len]);
            offset += packet_len;
        }
    }

    fn on_long_packet(&mut self, header: &LongHeader, packet: &mut [u8]) {
        let (level, space_index) = match header.packet_type {
            PacketType::Initial => (Level::Initial, 0),
            PacketType::Handshake => (Level::Handshake, 1),
            PacketType::ZeroRtt | PacketType::Retry => {
                trace!(packet_type = ?header.packet_type, "dropping unhandled packet type");
                return;
            }
        };

        let (key, header_key): (&dyn Key, &dyn HeaderKey) = match level {
            Level::Initial => (&self.initial_key, &self.initial_header_key),
            _ => match &self.handshake_keys {
                Some(pair) => (pair.key.as_ref(), pair.header_key.as_ref()),
                None => {
                    trace!("dropping handshake packet before handshake keys exist");
                    return;
                }
            },
        };

        let space = self.spaces[space_index].space;
        let payload = ProtectedPayload::new(header.header_len, packet);
        let (truncated, encrypted) = match crypto::unprotect(header_key, space, payload) {
            Ok(unprotected) => unprotected,
            Err(error) => {
                debug!(%error, "dropping packet with unremovable protection");
                return;
            }
        };

        let packet_number = truncated.expand(self.spaces[space_index].largest_received_or_zero());

        let (_header_bytes, cleartext) = match crypto::decrypt(key, packet_number, encrypted) {
            Ok(cleartext) => cleartext,
            Err(_) => {
                // silent: an unauthenticated packet must not change any
                // observable state (RFC 9000 §12.2)
                trace!("dropping packet that failed authentication");
                return;
            }
        };

        let mut ack_eliciting = false;
        for frame in FrameIter::new(cleartext) {
            match frame {
                Ok(Frame::Padding(_)) => {}
                Ok(Frame::Ack(_)) => {
                    // handshake CRYPTO data is re-sent at fixed offsets
                    // instead of tracking ack state
                }
                Ok(Frame::Ping(_)) => ack_eliciting = true,
                Ok(Frame::Crypto(crypto_frame)) => {
                    ack_eliciting = true;
                    if let Err(error) =
                        self.driver
                            .on_crypto_frame(level, crypto_frame.offset, crypto_frame.data)
                    {
                        self.fail(error);
                        break;
                    }
                }
                Ok(Frame::ConnectionClose(close)) => {
                    debug!(code = %close.error_code, "peer closed the connection");
                    self.state = State::Closed;
                    return;
                }
                Err(error) => {
                    debug!(%error, "terminating payload walk on unparseable frame");
                    break;
                }
            }
        }

        self.spaces[space_index].on_packet_received(packet_number, ack_eliciting);
        self.on_handshake_progress();
    }

    /// Pulls keys, parameters and completion out of the handshake driver
    fn on_handshake_progress(&mut self) {
        if let Some(keys) = self.driver.take_handshake_keys() {
            trace!("handshake keys installed");
            self.handshake_keys = Some(keys);
        }
        if let Some(keys) = self.driver.take_one_rtt_keys() {
            trace!("1-rtt keys installed");
            self.one_rtt_keys = Some(keys);
        }

        if self.peer_parameters.is_none() {
            if let Some(encoded) = self.driver.peer_transport_parameters() {
                match TransportParameters::decode(DecoderBuffer::new(&encoded)) {
                    Ok(parameters) => self.peer_parameters = Some(parameters),
                    Err(error) => self.fail(error),
                }
            }
        }

        if self.state == State::Handshaking && self.driver.is_complete() {
            debug!(peer = %self.peer_addr, "handshake complete");
            self.state = State::Connected;
        }
    }

    fn fail(&mut self, error: transport::Error) {
        if matches!(self.state, State::Handshaking | State::Connected) {
            debug!(%error, "connection failed");
            self.state = State::Errored;
            self.close_error = Some(error);
        }
    }

    /// Assembles the next outgoing datagram into `slot`, returning its
    /// length. Each datagram carries a single packet.
    pub fn next_outgoing(&mut self, slot: &mut [u8]) -> Option<usize> {
        match self.state {
            State::Closed => None,
            State::Errored => self.emit_connection_close(slot),
            _ => self
                .assemble_packet(Level::Initial, slot)
                .or_else(|| self.assemble_packet(Level::Handshake, slot)),
        }
    }

    fn assemble_packet(&mut self, level: Level, slot: &mut [u8]) -> Option<usize> {
        let (packet_type, space_index) = match level {
            Level::Initial => (PacketType::Initial, 0),
            Level::Handshake => (PacketType::Handshake, 1),
            Level::OneRtt => return None,
        };

        let (key, header_key): (&dyn Key, &dyn HeaderKey) = match level {
            Level::Initial => (&self.initial_key, &self.initial_header_key),
            _ => match &self.handshake_keys {
                Some(pair) => (pair.key.as_ref(), pair.header_key.as_ref()),
                None => return None,
            },
        };
        let tag_len = key.tag_len();

        let ack = self.spaces[space_index].ack_needed.then(|| {
            let largest = self.spaces[space_index]
                .largest_received_or_zero()
                .as_u64();
            Ack::new(VarInt::new(largest).expect("packet numbers fit a varint"))
        });
        let ack_len = ack.as_ref().map_or(0, EncoderValue::encoding_size);

        let (pending_len, pending_offset) = match self.driver.pending_output(level) {
            Some((bytes, offset)) => (bytes.len(), offset),
            None => (0, 0),
        };

        let fixed_header_len = 1
            + 4
            + 1
            + self.remote_cid.len()
            + 1
            + self.local_cid.len()
            + usize::from(packet_type == PacketType::Initial);

        let packet_number = self.spaces[space_index]
            .space
            .new_packet_number(VarInt::new(self.spaces[space_index].next_tx).expect("fits"));
        let truncated = packet_number
            .truncate(self.spaces[space_index].space.new_packet_number(VarInt::ZERO))
            .expect("handshake packet numbers stay small");
        let pn_len = truncated.len().bytesize();

        let payload_budget = slot
            .len()
            .checked_sub(fixed_header_len + LENGTH_FIELD_LEN + pn_len + tag_len)?;

        let crypto_offset = VarInt::new(pending_offset).expect("crypto offsets fit a varint");
        let data_len = pending_len.min(Crypto::max_data_len(
            crypto_offset,
            payload_budget.saturating_sub(ack_len),
        ));

        if data_len == 0 && ack.is_none() {
            return None;
        }

        let crypto_len = if data_len > 0 {
            1 + crypto_offset.encoding_size()
                + VarInt::try_from(data_len)
                    .expect("crypto data fits a packet")
                    .encoding_size()
                + data_len
        } else {
            0
        };

        let mut payload_len = ack_len + crypto_len;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
        //# a server MUST expand the payload of all UDP datagrams carrying
        //# ack-eliciting Initial packets
        if packet_type == PacketType::Initial && data_len > 0 {
            let natural = fixed_header_len + LENGTH_FIELD_LEN + pn_len + payload_len + tag_len;
            if natural < MIN_INITIAL_DATAGRAM_LEN {
                payload_len += MIN_INITIAL_DATAGRAM_LEN - natural;
            }
        }
        let padding_len = payload_len - ack_len - crypto_len;

        // a packet too short to sample for header protection gains padding
        let padding_len = if pn_len + payload_len + tag_len < 4 + 16 {
            padding_len + (4 + 16 - pn_len - payload_len - tag_len)
        } else {
            padding_len
        };
        let payload_len = ack_len + crypto_len + padding_len;

        let builder = LongHeaderBuilder {
            packet_type,
            destination_connection_id: self.remote_cid,
            source_connection_id: self.local_cid,
        };

        let mut encoder = EncoderBuffer::new(slot);
        let header_len = builder.encode(truncated, payload_len + tag_len, &mut encoder);

        if let Some(ack) = &ack {
            encoder.encode(ack);
        }
        if data_len > 0 {
            let (bytes, _) = self
                .driver
                .pending_output(level)
                .expect("pending output was checked above");
            encoder.encode(&Crypto {
                offset: crypto_offset,
                data: &bytes[..data_len],
            });
        }
        if padding_len > 0 {
            encoder.encode(&Padding {
                length: padding_len,
            });
        }
        encoder.write_zerofill(tag_len);
        let total = encoder.len();

        let mut payload =
            crypto::EncryptedPayload::new(header_len, truncated.len(), &mut slot[..total]);
        if crypto::encrypt(key, packet_number, &mut payload).is_err() {
            self.fail(transport::Error::INTERNAL_ERROR.with_reason("packet sealing failed"));
            return None;
        }
        if crypto::protect(header_key, payload).is_err() {
            self.fail(transport::Error::INTERNAL_ERROR.with_reason("header protection failed"));
            return None;
        }

        self.spaces[space_index].next_tx += 1;
        self.spaces[space_index].ack_needed = false;
        if data_len > 0 {
            self.driver.advance_output(level, data_len);
        }

        trace!(
            ?packet_type,
            packet_number = packet_number.as_u64(),
            len = total,
            "assembled packet"
        );
        Some(total)
    }

    /// Emits a CONNECTION_CLOSE at the highest level with keys, then goes
    /// terminal. Emission happens at most once.
    fn emit_connection_close(&mut self, slot: &mut [u8]) -> Option<usize> {
        let error = self.close_error.take()?;
        // terminal from here on, even if assembly fails below
        self.state = State::Closed;

        let (packet_type, space_index, key, header_key): (_, _, &dyn Key, &dyn HeaderKey) =
            match &self.handshake_keys {
                Some(pair) => (
                    PacketType::Handshake,
                    1,
                    pair.key.as_ref(),
                    pair.header_key.as_ref(),
                ),
                None => (
                    PacketType::Initial,
                    0,
                    &self.initial_key,
                    &self.initial_header_key,
                ),
            };
        let tag_len = key.tag_len();

        let close = ConnectionClose {
            error_code: error.code,
            frame_type: Some(error.frame_type.unwrap_or(VarInt::ZERO)),
            reason: error.reason.as_bytes(),
        };

        let packet_number = self.spaces[space_index]
            .space
            .new_packet_number(VarInt::new(self.spaces[space_index].next_tx).expect("fits"));
        let truncated = packet_number
            .truncate(self.spaces[space_index].space.new_packet_number(VarInt::ZERO))
            .expect("handshake packet numbers stay small");
        let pn_len = truncated.len().bytesize();

        // a CONNECTION_CLOSE frame is always long enough to leave a full
        // header protection sample behind the packet number
        let payload_len = close.encoding_size();
        let padding_len = 0usize;

        let builder = LongHeaderBuilder {
            packet_type,
            destination_connection_id: self.remote_cid,
            source_connection_id: self.local_cid,
        };

        let mut encoder = EncoderBuffer::new(slot);
        let header_len = builder.encode(truncated, payload_len + tag_len, &mut encoder);
        encoder.encode(&close);
        if padding_len > 0 {
            encoder.encode(&Padding {
                length: padding_len,
            });
        }
        encoder.write_zerofill(tag_len);
        let total = encoder.len();

        let mut payload =
            crypto::EncryptedPayload::new(header_len, truncated.len(), &mut slot[..total]);
        crypto::encrypt(key, packet_number, &mut payload).ok()?;
        crypto::protect(header_key, payload).ok()?;

        self.spaces[space_index].next_tx += 1;

        debug!(peer = %self.peer_addr, code = %close.error_code, "sent connection close");
        Some(total)
    }
}
