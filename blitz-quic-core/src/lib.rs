// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Transport-level types for the blitz QUIC server core: wire codecs
//! (varints, packet headers, frames), the packet protection pipeline, the
//! CRYPTO-stream reassembly buffer, transport parameters, and the contract
//! a TLS 1.3 engine has to satisfy to drive a handshake.
//!
//! This crate is wire-format and crypto-*shape* only; the concrete AEAD and
//! key schedule live in `blitz-quic-crypto`, and connection state lives in
//! `blitz-quic-server`.

pub mod connection;
pub mod crypto;
pub mod endpoint;
pub mod frame;
pub mod packet;
pub mod transport;
pub mod varint;
