// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use blitz_quic_core::transport::parameters::TransportParameters;
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

/// The default UDP port the gateway terminates QUIC on
pub const DEFAULT_PORT: u16 = 8443;

/// Endpoint configuration with gateway defaults.
///
/// `local_parameters` is the template advertised to every client; the
/// per-connection CID parameters are filled in at accept time.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,

    /// Number of 1500-byte datagram slots shared by receives and sends
    pub pool_size: usize,

    /// A connection that has not completed its handshake by this deadline
    /// is dropped without a CONNECTION_CLOSE
    pub handshake_timeout: Duration,

    pub local_parameters: TransportParameters,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT).into(),
            pool_size: 1024,
            handshake_timeout: Duration::from_secs(10),
            local_parameters: TransportParameters::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_address.set_port(port);
        self
    }

    #[must_use]
    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// The peer idle timeout this endpoint enforces, from its own
    /// advertised `max_idle_timeout`
    pub fn idle_timeout(&self) -> Option<Duration> {
        let millis = self.local_parameters.max_idle_timeout.as_u64();
        if millis == 0 {
            return None;
        }
        Some(Duration::from_millis(millis))
    }
}
