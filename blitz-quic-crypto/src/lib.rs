// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Concrete packet protection for the blitz QUIC core, backed by aws-lc.
//!
//! Only the Initial level is derived here — Handshake and 1-RTT keys come
//! out of the TLS engine and are adapted in `blitz-quic-rustls`.

pub mod cipher_suite;
pub mod header_key;
pub mod initial;
pub mod iv;

pub use initial::{InitialHeaderKey, InitialKey};

/// The AES-128-GCM authentication tag length
pub const TAG_LEN: usize = 16;
