// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Standalone QUIC terminator for the blitz gateway.

use blitz_quic_server::{Config, Server};
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "blitz-quicd", about = "The blitz gateway QUIC endpoint")]
struct Opt {
    /// UDP port to terminate QUIC on
    #[structopt(long, default_value = "8443")]
    port: u16,

    /// PEM file with the certificate chain, leaf first
    #[structopt(long)]
    cert: PathBuf,

    /// PEM file with the private key
    #[structopt(long)]
    key: PathBuf,

    /// Offered application protocols; defaults to h3
    #[structopt(long)]
    alpn: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let cert_chain: Vec<CertificateDer<'static>> =
        CertificateDer::pem_file_iter(&opt.cert)?.collect::<Result<_, _>>()?;
    let key = PrivateKeyDer::from_pem_file(&opt.key)?;

    let mut tls = blitz_quic_rustls::Server::new(cert_chain, key)?;
    if !opt.alpn.is_empty() {
        tls = tls.with_application_protocols(
            opt.alpn.iter().map(|protocol| protocol.as_bytes().to_vec()),
        );
    }

    let config = Config::default().with_port(opt.port);
    Server::bind(config, tls)?.run()?;

    Ok(())
}
