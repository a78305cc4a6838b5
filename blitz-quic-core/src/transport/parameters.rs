// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{connection::ConnectionId, transport::Error, varint::VarInt};
use blitz_codec::{DecoderBuffer, EncoderBuffer, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-18
//# The extension_data field of the quic_transport_parameters extension
//# defined in [QUIC-TLS] contains the QUIC transport parameters.  They
//# are encoded as a sequence of transport parameters, as shown in
//# Figure 20:
//#
//# Transport Parameters {
//#   Transport Parameter (..) ...,
//# }
//#
//# Transport Parameter {
//#   Transport Parameter ID (i),
//#   Transport Parameter Length (i),
//#   Transport Parameter Value (..),
//# }

mod id {
    pub const ORIGINAL_DESTINATION_CONNECTION_ID: u64 = 0x00;
    pub const MAX_IDLE_TIMEOUT: u64 = 0x01;
    pub const MAX_UDP_PAYLOAD_SIZE: u64 = 0x03;
    pub const INITIAL_MAX_DATA: u64 = 0x04;
    pub const INITIAL_MAX_STREAM_DATA_BIDI_LOCAL: u64 = 0x05;
    pub const INITIAL_MAX_STREAM_DATA_BIDI_REMOTE: u64 = 0x06;
    pub const INITIAL_MAX_STREAM_DATA_UNI: u64 = 0x07;
    pub const INITIAL_MAX_STREAMS_BIDI: u64 = 0x08;
    pub const INITIAL_MAX_STREAMS_UNI: u64 = 0x09;
    pub const ACK_DELAY_EXPONENT: u64 = 0x0a;
    pub const MAX_ACK_DELAY: u64 = 0x0b;
    pub const DISABLE_ACTIVE_MIGRATION: u64 = 0x0c;
    pub const ACTIVE_CONNECTION_ID_LIMIT: u64 = 0x0e;
    pub const INITIAL_SOURCE_CONNECTION_ID: u64 = 0x0f;
}

/// The transport parameter set this endpoint recognizes.
///
/// Values are immutable once the peer's set is received; unknown IDs are
/// skipped during decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportParameters {
    /// Sent by servers only; echoes the DCID of the client's first Initial
    pub original_destination_connection_id: Option<ConnectionId>,
    /// Milliseconds; zero disables the idle timeout
    pub max_idle_timeout: VarInt,
    pub max_udp_payload_size: VarInt,
    pub initial_max_data: VarInt,
    pub initial_max_stream_data_bidi_local: VarInt,
    pub initial_max_stream_data_bidi_remote: VarInt,
    pub initial_max_stream_data_uni: VarInt,
    pub initial_max_streams_bidi: VarInt,
    pub initial_max_streams_uni: VarInt,
    pub ack_delay_exponent: VarInt,
    /// Milliseconds
    pub max_ack_delay: VarInt,
    pub disable_active_migration: bool,
    pub active_connection_id_limit: VarInt,
    pub initial_source_connection_id: Option<ConnectionId>,
}

impl Default for TransportParameters {
    fn default() -> Self {
        Self {
            original_destination_connection_id: None,
            max_idle_timeout: VarInt::from_u16(30_000),
            max_udp_payload_size: VarInt::from_u32(65_527),
            initial_max_data: VarInt::from_u32(10_000_000),
            initial_max_stream_data_bidi_local: VarInt::from_u32(1_000_000),
            initial_max_stream_data_bidi_remote: VarInt::from_u32(1_000_000),
            initial_max_stream_data_uni: VarInt::from_u32(1_000_000),
            initial_max_streams_bidi: VarInt::from_u8(100),
            initial_max_streams_uni: VarInt::from_u8(100),
            ack_delay_exponent: VarInt::from_u8(3),
            max_ack_delay: VarInt::from_u8(25),
            disable_active_migration: true,
            active_connection_id_limit: VarInt::from_u8(2),
            initial_source_connection_id: None,
        }
    }
}

impl TransportParameters {
    pub fn decode(buffer: DecoderBuffer) -> Result<Self, Error> {
        let invalid =
            |reason| Error::TRANSPORT_PARAMETER_ERROR.with_reason(reason);

        let mut params = Self::default();
        let mut buffer = buffer;
        // one bit per recognized (small) id for duplicate detection
        let mut seen = 0u64;

        while !buffer.is_empty() {
            let (param_id, rest) = buffer
                .decode::<VarInt>()
                .map_err(|_| invalid("malformed transport parameter id"))?;
            let (value, rest) = rest
                .decode_slice_with_len_prefix::<VarInt>()
                .map_err(|_| invalid("malformed transport parameter length"))?;
            buffer = rest;

            let param_id = param_id.as_u64();
            if param_id < 64 {
                let bit = 1u64 << param_id;
                //= https://www.rfc-editor.org/rfc/rfc9000#section-7.4
                //# An endpoint MUST NOT send a parameter more than once in a
                //# given transport parameters extension.
                if seen & bit != 0 {
                    return Err(invalid("duplicate transport parameter"));
                }
                seen |= bit;
            }

            match param_id {
                id::ORIGINAL_DESTINATION_CONNECTION_ID => {
                    params.original_destination_connection_id = Some(cid_value(value)?);
                }
                id::MAX_IDLE_TIMEOUT => params.max_idle_timeout = varint_value(value)?,
                id::MAX_UDP_PAYLOAD_SIZE => params.max_udp_payload_size = varint_value(value)?,
                id::INITIAL_MAX_DATA => params.initial_max_data = varint_value(value)?,
                id::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL => {
                    params.initial_max_stream_data_bidi_local = varint_value(value)?;
                }
                id::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE => {
                    params.initial_max_stream_data_bidi_remote = varint_value(value)?;
                }
                id::INITIAL_MAX_STREAM_DATA_UNI => {
                    params.initial_max_stream_data_uni = varint_value(value)?;
                }
                id::INITIAL_MAX_STREAMS_BIDI => {
                    params.initial_max_streams_bidi = varint_value(value)?;
                }
                id::INITIAL_MAX_STREAMS_UNI => {
                    params.initial_max_streams_uni = varint_value(value)?;
                }
                id::ACK_DELAY_EXPONENT => params.ack_delay_exponent = varint_value(value)?,
                id::MAX_ACK_DELAY => params.max_ack_delay = varint_value(value)?,
                id::DISABLE_ACTIVE_MIGRATION => {
                    //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
                    //# This parameter is a zero-length value.
                    if !value.is_empty() {
                        return Err(invalid("disable_active_migration carries a value"));
                    }
                    params.disable_active_migration = true;
                }
                id::ACTIVE_CONNECTION_ID_LIMIT => {
                    params.active_connection_id_limit = varint_value(value)?;
                }
                id::INITIAL_SOURCE_CONNECTION_ID => {
                    params.initial_source_connection_id = Some(cid_value(value)?);
                }
                // reserved and unrecognized parameters are skipped
                _ => {}
            }
        }

        params.validate()
    }

    fn validate(self) -> Result<Self, Error> {
        let invalid =
            |reason| Error::TRANSPORT_PARAMETER_ERROR.with_reason(reason);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# Values below 1200 are invalid.
        if self.max_udp_payload_size.as_u64() < 1200
            || self.max_udp_payload_size.as_u64() > 65_527
        {
            return Err(invalid("max_udp_payload_size out of range"));
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# Values above 20 are invalid.
        if self.ack_delay_exponent.as_u64() > 20 {
            return Err(invalid("ack_delay_exponent out of range"));
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# Values of 2^14 or greater are invalid.
        if self.max_ack_delay.as_u64() >= 1 << 14 {
            return Err(invalid("max_ack_delay out of range"));
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# The value of the active_connection_id_limit parameter MUST be at
        //# least 2.
        if self.active_connection_id_limit.as_u64() < 2 {
            return Err(invalid("active_connection_id_limit below 2"));
        }

        Ok(self)
    }
}

fn varint_value(value: &[u8]) -> Result<VarInt, Error> {
    let (varint, rest) = DecoderBuffer::new(value)
        .decode::<VarInt>()
        .map_err(|_| Error::TRANSPORT_PARAMETER_ERROR.with_reason("truncated parameter value"))?;
    if !rest.is_empty() {
        return Err(Error::TRANSPORT_PARAMETER_ERROR.with_reason("trailing parameter bytes"));
    }
    Ok(varint)
}

fn cid_value(value: &[u8]) -> Result<ConnectionId, Error> {
    ConnectionId::try_from(value)
        .map_err(|_| Error::TRANSPORT_PARAMETER_ERROR.with_reason("connection id too long"))
}

fn varint_param(encoder: &mut EncoderBuffer, param_id: u64, value: VarInt) {
    bytes_param_header(encoder, param_id, value.encoding_size());
    encoder.encode(&value);
}

fn bytes_param(encoder: &mut EncoderBuffer, param_id: u64, value: &[u8]) {
    bytes_param_header(encoder, param_id, value.len());
    encoder.write_slice(value);
}

fn bytes_param_header(encoder: &mut EncoderBuffer, param_id: u64, len: usize) {
    encoder.encode(&VarInt::new(param_id).expect("recognized parameter ids are small"));
    encoder.encode(&VarInt::try_from(len).expect("parameter values fit a packet"));
}

fn param_size(param_id: u64, value_len: usize) -> usize {
    VarInt::new(param_id)
        .expect("recognized parameter ids are small")
        .encoding_size()
        + VarInt::try_from(value_len)
            .expect("parameter values fit a packet")
            .encoding_size()
        + value_len
}

impl EncoderValue for TransportParameters {
    fn encode(&self, encoder: &mut EncoderBuffer) {
        if let Some(cid) = &self.original_destination_connection_id {
            bytes_param(encoder, id::ORIGINAL_DESTINATION_CONNECTION_ID, cid.as_bytes());
        }
        varint_param(encoder, id::MAX_IDLE_TIMEOUT, self.max_idle_timeout);
        varint_param(encoder, id::MAX_UDP_PAYLOAD_SIZE, self.max_udp_payload_size);
        varint_param(encoder, id::INITIAL_MAX_DATA, self.initial_max_data);
        varint_param(
            encoder,
            id::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL,
            self.initial_max_stream_data_bidi_local,
        );
        varint_param(
            encoder,
            id::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE,
            self.initial_max_stream_data_bidi_remote,
        );
        varint_param(
            encoder,
            id::INITIAL_MAX_STREAM_DATA_UNI,
            self.initial_max_stream_data_uni,
        );
        varint_param(encoder, id::INITIAL_MAX_STREAMS_BIDI, self.initial_max_streams_bidi);
        varint_param(encoder, id::INITIAL_MAX_STREAMS_UNI, self.initial_max_streams_uni);
        varint_param(encoder, id::ACK_DELAY_EXPONENT, self.ack_delay_exponent);
        varint_param(encoder, id::MAX_ACK_DELAY, self.max_ack_delay);
        if self.disable_active_migration {
            bytes_param(encoder, id::DISABLE_ACTIVE_MIGRATION, &[]);
        }
        varint_param(
            encoder,
            id::ACTIVE_CONNECTION_ID_LIMIT,
            self.active_connection_id_limit,
        );
        if let Some(cid) = &self.initial_source_connection_id {
            bytes_param(encoder, id::INITIAL_SOURCE_CONNECTION_ID, cid.as_bytes());
        }
    }

    fn encoding_size(&self) -> usize {
        let mut size = 0;
        if let Some(cid) = &self.original_destination_connection_id {
            size += param_size(id::ORIGINAL_DESTINATION_CONNECTION_ID, cid.len());
        }
        for value in [
            (id::MAX_IDLE_TIMEOUT, self.max_idle_timeout),
            (id::MAX_UDP_PAYLOAD_SIZE, self.max_udp_payload_size),
            (id::INITIAL_MAX_DATA, self.initial_max_data),
            (
                id::INITIAL_MAX_STREAM_DATA_BIDI_LOCAL,
                self.initial_max_stream_data_bidi_local,
            ),
            (
                id::INITIAL_MAX_STREAM_DATA_BIDI_REMOTE,
                self.initial_max_stream_data_bidi_remote,
            ),
            (
                id::INITIAL_MAX_STREAM_DATA_UNI,
                self.initial_max_stream_data_uni,
            ),
            (id::INITIAL_MAX_STREAMS_BIDI, self.initial_max_streams_bidi),
            (id::INITIAL_MAX_STREAMS_UNI, self.initial_max_streams_uni),
            (id::ACK_DELAY_EXPONENT, self.ack_delay_exponent),
            (id::MAX_ACK_DELAY, self.max_ack_delay),
            (
                id::ACTIVE_CONNECTION_ID_LIMIT,
                self.active_connection_id_limit,
            ),
        ] {
            size += param_size(value.0, value.1.encoding_size());
        }
        if self.disable_active_migration {
            size += param_size(id::DISABLE_ACTIVE_MIGRATION, 0);
        }
        if let Some(cid) = &self.initial_source_connection_id {
            size += param_size(id::INITIAL_SOURCE_CONNECTION_ID, cid.len());
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(params: &TransportParameters) -> TransportParameters {
        let mut slot = [0u8; 256];
        let mut encoder = EncoderBuffer::new(&mut slot);
        encoder.encode(params);
        assert_eq!(encoder.len(), params.encoding_size());
        let len = encoder.len();
        TransportParameters::decode(DecoderBuffer::new(&slot[..len])).unwrap()
    }

    #[test]
    fn round_trip_test() {
        let mut params = TransportParameters {
            original_destination_connection_id: ConnectionId::try_from_bytes(&[1, 2, 3, 4]),
            initial_source_connection_id: ConnectionId::try_from_bytes(&[5, 6, 7, 8]),
            ..Default::default()
        };
        params.max_idle_timeout = VarInt::from_u16(10_000);
        params.initial_max_streams_bidi = VarInt::from_u8(16);

        assert_eq!(round_trip(&params), params);
    }

    #[test]
    fn unknown_ids_are_skipped_test() {
        // a GREASE-style parameter (31 * N + 27) followed by a recognized one
        let mut slot = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut slot);
        encoder.encode(&VarInt::from_u16(0x1b)); // 27: reserved
        encoder.encode(&VarInt::from_u8(3));
        encoder.write_slice(&[0xde, 0xad, 0xbe]);
        varint_param(&mut encoder, id::MAX_ACK_DELAY, VarInt::from_u8(11));
        let len = encoder.len();

        let params = TransportParameters::decode(DecoderBuffer::new(&slot[..len])).unwrap();
        assert_eq!(params.max_ack_delay, VarInt::from_u8(11));
    }

    #[test]
    fn duplicate_id_test() {
        let mut slot = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut slot);
        varint_param(&mut encoder, id::MAX_ACK_DELAY, VarInt::from_u8(11));
        varint_param(&mut encoder, id::MAX_ACK_DELAY, VarInt::from_u8(12));
        let len = encoder.len();

        assert!(TransportParameters::decode(DecoderBuffer::new(&slot[..len])).is_err());
    }

    #[test]
    fn validation_test() {
        let mut slot = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut slot);
        varint_param(&mut encoder, id::ACK_DELAY_EXPONENT, VarInt::from_u8(21));
        let len = encoder.len();

        let error = TransportParameters::decode(DecoderBuffer::new(&slot[..len])).unwrap_err();
        assert_eq!(error.code, Error::TRANSPORT_PARAMETER_ERROR.code);
    }

    #[test]
    fn truncated_value_test() {
        // length prefix promises 4 bytes, value holds 1
        let bytes = [0x01, 0x04, 0x19];
        assert!(TransportParameters::decode(DecoderBuffer::new(&bytes)).is_err());
    }
}
