// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::packet_protection;

/// A packet protection key for one encryption level.
///
/// One value covers both directions; implementations hold a sealer for the
/// send direction and an opener for the receive direction.
pub trait Key: Send {
    /// Opens `payload` (ciphertext plus tag) in place, authenticating it
    /// against `header`. On success the cleartext occupies the front of
    /// `payload`.
    fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error>;

    /// Seals `payload` in place; the final `tag_len` bytes are the
    /// reserved tag region, the rest is cleartext.
    fn encrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error>;

    fn tag_len(&self) -> usize;
}
