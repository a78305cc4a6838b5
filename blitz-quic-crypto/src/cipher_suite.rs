// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{iv::Iv, TAG_LEN};
use aws_lc_rs::{aead, hkdf};
use blitz_quic_core::crypto::{label::QUIC_KEY_16, packet_protection};
use zeroize::Zeroizing;

/// One direction of TLS_AES_128_GCM_SHA256 packet protection, expanded
/// from a traffic secret per RFC 9001 §5.1
pub struct Aes128GcmKey {
    key: aead::LessSafeKey,
    iv: Iv,
}

impl Aes128GcmKey {
    pub fn new(secret: &hkdf::Prk) -> Self {
        let mut key_bytes = Zeroizing::new([0u8; 16]);

        secret
            .expand(&[&QUIC_KEY_16], &aead::AES_128_GCM)
            .expect("label size verified")
            .fill(key_bytes.as_mut())
            .expect("fill size verified");

        let unbound_key =
            aead::UnboundKey::new(&aead::AES_128_GCM, key_bytes.as_ref()).expect("key size verified");

        Self {
            key: aead::LessSafeKey::new(unbound_key),
            iv: Iv::new(secret),
        }
    }

    /// Seals `payload` in place; the trailing [`TAG_LEN`] bytes are
    /// overwritten with the auth tag.
    pub fn seal(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        let cleartext_len = payload
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(packet_protection::Error::INTERNAL_ERROR)?;
        let (cleartext, tag_space) = payload.split_at_mut(cleartext_len);

        let nonce = aead::Nonce::assume_unique_for_key(self.iv.nonce(packet_number));
        let tag = self
            .key
            .seal_in_place_separate_tag(nonce, aead::Aad::from(header), cleartext)
            .map_err(|_| packet_protection::Error::INTERNAL_ERROR)?;
        tag_space.copy_from_slice(tag.as_ref());

        Ok(())
    }

    /// Opens `payload` (ciphertext plus tag) in place; the cleartext
    /// occupies the front on success.
    pub fn open(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        let nonce = aead::Nonce::assume_unique_for_key(self.iv.nonce(packet_number));

        self.key
            .open_in_place(nonce, aead::Aad::from(header), payload)
            .map(|_| ())
            .map_err(|_| packet_protection::Error::DECRYPT_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lc_rs::hkdf::{Salt, HKDF_SHA256};

    fn test_key(ikm: &[u8]) -> Aes128GcmKey {
        let secret = Salt::new(HKDF_SHA256, b"test salt").extract(ikm);
        let secret = secret
            .expand(&[b"test"], HKDF_SHA256)
            .expect("label size verified")
            .into();
        Aes128GcmKey::new(&secret)
    }

    #[test]
    fn seal_open_round_trip_test() {
        let key = test_key(b"round trip");
        let header = [0xc3, 0x00, 0x00, 0x00, 0x01];

        let cleartext = b"the quic brown fox";
        let mut payload = cleartext.to_vec();
        payload.extend_from_slice(&[0u8; TAG_LEN]);

        key.seal(7, &header, &mut payload).unwrap();
        assert_ne!(&payload[..cleartext.len()], cleartext);

        key.open(7, &header, &mut payload).unwrap();
        assert_eq!(&payload[..cleartext.len()], cleartext);
    }

    #[test]
    fn corruption_test() {
        let key = test_key(b"corruption");
        let header = [0xc3, 0x01];

        let mut sealed = b"payload bytes".to_vec();
        sealed.extend_from_slice(&[0u8; TAG_LEN]);
        key.seal(1, &header, &mut sealed).unwrap();

        // flipping any bit of the ciphertext or tag must fail auth
        for index in 0..sealed.len() {
            let mut corrupted = sealed.clone();
            corrupted[index] ^= 1;
            assert!(key.open(1, &header, &mut corrupted).is_err());
        }

        // a mismatched packet number (wrong nonce) must fail auth
        let mut replayed = sealed.clone();
        assert!(key.open(2, &header, &mut replayed).is_err());

        // mismatched associated data must fail auth
        let mut wrong_aad = sealed.clone();
        assert!(key.open(1, &[0xc3, 0x02], &mut wrong_aad).is_err());

        // the untouched payload still opens
        key.open(1, &header, &mut sealed).unwrap();
    }
}
