// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use core::fmt;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# QUIC transport error codes and application error codes are 62-bit
//# unsigned integers.

/// A connection-level error, as carried in a CONNECTION_CLOSE frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error {
    pub code: VarInt,
    pub frame_type: Option<VarInt>,
    pub reason: &'static str,
}

impl Error {
    pub const fn new(code: VarInt) -> Self {
        Self {
            code,
            frame_type: None,
            reason: "",
        }
    }

    #[must_use]
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }

    #[must_use]
    pub const fn with_frame_type(mut self, frame_type: VarInt) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#section-4.8
    //# A TLS alert is converted into a QUIC connection error.  Alert
    //# descriptions are added to 0x0100 to produce a QUIC error code from
    //# the range reserved for CRYPTO_ERROR.
    pub const fn crypto_error(alert: u8) -> Self {
        Self::new(VarInt::from_u16(0x0100 + alert as u16))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "TransportError({})", self.code)
        } else {
            f.write_str(self.reason)
        }
    }
}

impl std::error::Error for Error {}

/// Defines the RFC 9000 §20.1 error code constants
macro_rules! def_error {
    ($doc:expr, $name:ident, $code:expr) => {
        impl Error {
            #[doc = $doc]
            pub const $name: Self = Self::new(VarInt::from_u8($code));
        }
    };
}

def_error!(
    "The connection is being closed abruptly in the absence of any error.",
    NO_ERROR,
    0x00
);
def_error!(
    "The endpoint encountered an internal error and cannot continue.",
    INTERNAL_ERROR,
    0x01
);
def_error!(
    "The server refused to accept a new connection.",
    CONNECTION_REFUSED,
    0x02
);
def_error!(
    "An endpoint received more data than it permitted.",
    FLOW_CONTROL_ERROR,
    0x03
);
def_error!(
    "An endpoint received a frame for a stream identifier that exceeded its advertised limit.",
    STREAM_LIMIT_ERROR,
    0x04
);
def_error!(
    "An endpoint received a frame for a stream that was not in a state that permitted that frame.",
    STREAM_STATE_ERROR,
    0x05
);
def_error!(
    "An endpoint received a frame containing an invalid size for a stream.",
    FINAL_SIZE_ERROR,
    0x06
);
def_error!(
    "An endpoint received a frame that was badly formatted.",
    FRAME_ENCODING_ERROR,
    0x07
);
def_error!(
    "An endpoint received transport parameters that were badly formatted or invalid.",
    TRANSPORT_PARAMETER_ERROR,
    0x08
);
def_error!(
    "The number of connection IDs provided by the peer exceeds the advertised limit.",
    CONNECTION_ID_LIMIT_ERROR,
    0x09
);
def_error!(
    "An endpoint detected an error with protocol compliance.",
    PROTOCOL_VIOLATION,
    0x0a
);
def_error!(
    "A server received a client Initial that contained an invalid Token field.",
    INVALID_TOKEN,
    0x0b
);
def_error!(
    "The application or application protocol caused the connection to be closed.",
    APPLICATION_ERROR,
    0x0c
);
def_error!(
    "An endpoint has received more data in CRYPTO frames than it can buffer.",
    CRYPTO_BUFFER_EXCEEDED,
    0x0d
);
def_error!(
    "An endpoint detected errors in performing key updates.",
    KEY_UPDATE_ERROR,
    0x0e
);
def_error!(
    "An endpoint has reached the confidentiality or integrity limit for the AEAD algorithm.",
    AEAD_LIMIT_REACHED,
    0x0f
);
