// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A TLS 1.3 engine for the blitz QUIC core, backed by rustls.
//!
//! rustls's QUIC API already removes the record layer: it consumes raw
//! handshake bytes per encryption level and emits packet protection keys
//! as it derives them, which is exactly the [`tls::Session`] contract.

pub mod keys;
mod session;

pub use keys::key_pair;
pub use session::Session;

use blitz_quic_core::{crypto::tls, transport};
use rustls::{quic, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;

/// The default application protocols offered by the gateway
pub const DEFAULT_ALPN_PROTOCOLS: &[&[u8]] = &[b"h3"];

/// A server-side TLS engine holding certificate and signing material.
///
/// One instance serves every connection of an endpoint; sessions share the
/// underlying `ServerConfig` by reference count.
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
}

impl Server {
    /// Builds an engine from a certificate chain and its private key.
    ///
    /// The offered signature schemes come from the aws-lc provider and
    /// include RSA-PSS-SHA256 and ECDSA-P256-SHA256;
    /// TLS_AES_128_GCM_SHA256 is always enabled.
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, rustls::Error> {
        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?;

        // rustls refuses QUIC sessions without ALPN
        config.alpn_protocols = DEFAULT_ALPN_PROTOCOLS
            .iter()
            .map(|proto| proto.to_vec())
            .collect();

        Ok(Self {
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn with_application_protocols<P: IntoIterator<Item = Vec<u8>>>(
        mut self,
        protocols: P,
    ) -> Self {
        let config =
            Arc::get_mut(&mut self.config).expect("no sessions exist while configuring");
        config.alpn_protocols = protocols.into_iter().collect();
        self
    }
}

impl From<Arc<ServerConfig>> for Server {
    fn from(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }
}

impl tls::Endpoint for Server {
    type Session = Session;

    fn new_server_session(
        &mut self,
        transport_parameters: &[u8],
    ) -> Result<Self::Session, transport::Error> {
        let connection = quic::ServerConnection::new(
            self.config.clone(),
            quic::Version::V1,
            transport_parameters.to_vec(),
        )
        .map_err(|_| {
            transport::Error::INTERNAL_ERROR.with_reason("failed to construct a tls session")
        })?;

        Ok(Session::new(connection))
    }
}
