// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use aws_lc_rs::{aead::quic, hkdf};
use blitz_quic_core::crypto::{self, label::QUIC_HP_16, HeaderProtectionMask};
use core::fmt;
use zeroize::Zeroizing;

/// A header protection key for one direction.
///
/// The mask is the AES-ECB encryption of a 16-byte ciphertext sample under
/// the "quic hp" key (RFC 9001 §5.4.3), which aws-lc exposes directly.
pub struct HeaderKey(quic::HeaderProtectionKey);

impl HeaderKey {
    pub fn new(secret: &hkdf::Prk) -> Self {
        let alg = &quic::AES_128;
        let mut bytes = Zeroizing::new([0u8; 16]);

        secret
            .expand(&[&QUIC_HP_16], alg)
            .expect("label size verified")
            .fill(bytes.as_mut())
            .expect("fill size verified");

        let key = quic::HeaderProtectionKey::new(alg, bytes.as_ref())
            .expect("header secret length already checked");
        Self(key)
    }

    #[inline]
    pub(crate) fn mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        self.0
            .new_mask(sample)
            .expect("sample length already checked")
    }

    #[inline]
    pub(crate) fn sample_len(&self) -> usize {
        self.0.algorithm().sample_len()
    }
}

impl fmt::Debug for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HeaderKey").finish()
    }
}

/// Send and receive header keys for one encryption level
#[derive(Debug)]
pub struct HeaderKeyPair {
    pub(crate) sealer: HeaderKey,
    pub(crate) opener: HeaderKey,
}

impl crypto::HeaderKey for HeaderKeyPair {
    #[inline]
    fn opening_header_protection_mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        self.opener.mask(sample)
    }

    #[inline]
    fn opening_sample_len(&self) -> usize {
        self.opener.sample_len()
    }

    #[inline]
    fn sealing_header_protection_mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        self.sealer.mask(sample)
    }

    #[inline]
    fn sealing_sample_len(&self) -> usize {
        self.sealer.sample_len()
    }
}
