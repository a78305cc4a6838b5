// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The packet protection pipeline.
//!
//! An inbound packet moves `ProtectedPayload → unprotect() →
//! (TruncatedPacketNumber, EncryptedPayload) → expand() → decrypt() →
//! cleartext`. Outbound packets run the same ladder in reverse: the
//! assembled cleartext is sealed with `encrypt()` and masked with
//! `protect()` as the final step.

pub mod header_crypto;
pub mod initial;
pub mod key;
pub mod label;
pub mod packet_protection;
pub mod payload;
pub mod stream;
pub mod tls;

pub use header_crypto::*;
pub use initial::InitialKey;
pub use key::*;
pub use payload::*;

use crate::packet::number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber};
use blitz_codec::DecoderError;

/// Removes header protection, exposing the truncated packet number
#[inline]
pub fn unprotect<'a, K: HeaderKey + ?Sized>(
    crypto: &K,
    space: PacketNumberSpace,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), DecoderError> {
    let sample = payload.header_protection_sample(crypto.opening_sample_len())?;
    let mask = crypto.opening_header_protection_mask(sample);

    remove_header_protection(space, mask, payload)
}

/// Applies header protection to a sealed payload
#[inline]
pub fn protect<'a, K: HeaderKey + ?Sized>(
    crypto: &K,
    payload: EncryptedPayload<'a>,
) -> Result<ProtectedPayload<'a>, DecoderError> {
    let sample = payload.header_protection_sample(crypto.sealing_sample_len())?;
    let mask = crypto.sealing_header_protection_mask(sample);

    Ok(apply_header_protection(mask, payload))
}

/// Opens an `EncryptedPayload`, returning the header and the cleartext
/// with the auth tag stripped
#[inline]
pub fn decrypt<'a, K: Key + ?Sized>(
    key: &K,
    packet_number: PacketNumber,
    payload: EncryptedPayload<'a>,
) -> Result<(&'a mut [u8], &'a mut [u8]), packet_protection::Error> {
    let EncryptedPayload {
        header_len,
        packet_number_len,
        buffer,
    } = payload;

    let (header, body) = buffer.split_at_mut(header_len + packet_number_len.bytesize());
    key.decrypt(packet_number.as_crypto_nonce(), header, body)?;

    let cleartext_len = body
        .len()
        .checked_sub(key.tag_len())
        .ok_or(packet_protection::Error::DECRYPT_ERROR)?;
    let (cleartext, _tag) = body.split_at_mut(cleartext_len);

    Ok((header, cleartext))
}

/// Seals a cleartext payload in place.
///
/// The payload's body must already reserve `tag_len` bytes at the end.
#[inline]
pub fn encrypt<K: Key + ?Sized>(
    key: &K,
    packet_number: PacketNumber,
    payload: &mut EncryptedPayload<'_>,
) -> Result<(), packet_protection::Error> {
    let split = payload.header_len + payload.packet_number_len.bytesize();
    let (header, body) = payload.buffer.split_at_mut(split);
    key.encrypt(packet_number.as_crypto_nonce(), header, body)
}
