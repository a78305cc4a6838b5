// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use aws_lc_rs::{aead::NONCE_LEN, hkdf};
use blitz_quic_core::crypto::label::QUIC_IV_12;
use zeroize::Zeroize;

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.3
//# The nonce, N, is formed by combining the packet
//# protection IV with the packet number.  The 62 bits of the
//# reconstructed QUIC packet number in network byte order are left-
//# padded with zeros to the size of the IV.  The exclusive OR of the
//# padded packet number and the IV forms the AEAD nonce.

pub struct Iv([u8; NONCE_LEN]);

impl Iv {
    #[inline]
    pub fn new(secret: &hkdf::Prk) -> Self {
        let mut bytes = [0u8; NONCE_LEN];

        secret
            .expand(&[&QUIC_IV_12], IvLen)
            .expect("label size verified")
            .fill(&mut bytes)
            .expect("fill size verified");

        Self(bytes)
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn nonce(&self, packet_number: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[NONCE_LEN - 8..].copy_from_slice(&packet_number.to_be_bytes());

        for (nonce_byte, iv_byte) in nonce.iter_mut().zip(self.0.iter()) {
            *nonce_byte ^= iv_byte;
        }

        nonce
    }
}

impl Drop for Iv {
    fn drop(&mut self) {
        self.0.zeroize()
    }
}

struct IvLen;

impl hkdf::KeyType for IvLen {
    #[inline]
    fn len(&self) -> usize {
        NONCE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_xor_test() {
        let iv = Iv::from_bytes([0xaa; NONCE_LEN]);

        // a zero packet number leaves the IV untouched
        assert_eq!(iv.nonce(0), [0xaa; NONCE_LEN]);

        // the packet number lands in the trailing eight bytes
        let nonce = iv.nonce(0x0102_0304_0506_0708);
        assert_eq!(&nonce[..4], &[0xaa; 4]);
        assert_eq!(
            &nonce[4..],
            &[
                0xaa ^ 0x01,
                0xaa ^ 0x02,
                0xaa ^ 0x03,
                0xaa ^ 0x04,
                0xaa ^ 0x05,
                0xaa ^ 0x06,
                0xaa ^ 0x07,
                0xaa ^ 0x08
            ]
        );
    }
}
