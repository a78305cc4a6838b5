// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    cipher_suite::Aes128GcmKey,
    header_key::{HeaderKey, HeaderKeyPair},
};
use aws_lc_rs::hkdf;
use blitz_quic_core::{
    crypto::{
        self,
        initial::INITIAL_SALT,
        label::{CLIENT_IN, SERVER_IN},
        packet_protection, HeaderProtectionMask,
    },
    endpoint,
};

lazy_static::lazy_static! {
    /// Compute the Initial salt once, as the seed is constant
    static ref INITIAL_SIGNING_KEY: hkdf::Salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &INITIAL_SALT);
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# initial_secret = HKDF-Extract(initial_salt,
//#                               client_dst_connection_id)
//#
//# client_initial_secret = HKDF-Expand-Label(initial_secret,
//#                                           "client in", "",
//#                                           Hash.length)
//# server_initial_secret = HKDF-Expand-Label(initial_secret,
//#                                           "server in", "",
//#                                           Hash.length)

#[derive(Debug)]
pub struct InitialHeaderKey(HeaderKeyPair);

impl crypto::HeaderKey for InitialHeaderKey {
    #[inline]
    fn opening_header_protection_mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        self.0.opening_header_protection_mask(sample)
    }

    #[inline]
    fn opening_sample_len(&self) -> usize {
        self.0.opening_sample_len()
    }

    #[inline]
    fn sealing_header_protection_mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        self.0.sealing_header_protection_mask(sample)
    }

    #[inline]
    fn sealing_sample_len(&self) -> usize {
        self.0.sealing_sample_len()
    }
}

pub struct InitialKey {
    sealer: Aes128GcmKey,
    opener: Aes128GcmKey,
}

impl InitialKey {
    fn new(endpoint: endpoint::Type, connection_id: &[u8]) -> (Self, InitialHeaderKey) {
        let initial_secret = INITIAL_SIGNING_KEY.extract(connection_id);
        let digest = INITIAL_SIGNING_KEY.algorithm();

        let client_secret: hkdf::Prk = initial_secret
            .expand(&[&CLIENT_IN], digest)
            .expect("label size verified")
            .into();

        let server_secret: hkdf::Prk = initial_secret
            .expand(&[&SERVER_IN], digest)
            .expect("label size verified")
            .into();

        let (sealing_secret, opening_secret) = match endpoint {
            endpoint::Type::Client => (&client_secret, &server_secret),
            endpoint::Type::Server => (&server_secret, &client_secret),
        };

        let key = Self {
            sealer: Aes128GcmKey::new(sealing_secret),
            opener: Aes128GcmKey::new(opening_secret),
        };
        let header_key = InitialHeaderKey(HeaderKeyPair {
            sealer: HeaderKey::new(sealing_secret),
            opener: HeaderKey::new(opening_secret),
        });

        (key, header_key)
    }
}

impl crypto::InitialKey for InitialKey {
    type HeaderKey = InitialHeaderKey;

    fn new_server(connection_id: &[u8]) -> (Self, Self::HeaderKey) {
        Self::new(endpoint::Type::Server, connection_id)
    }

    fn new_client(connection_id: &[u8]) -> (Self, Self::HeaderKey) {
        Self::new(endpoint::Type::Client, connection_id)
    }
}

impl crypto::Key for InitialKey {
    #[inline]
    fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        self.opener.open(packet_number, header, payload)
    }

    #[inline]
    fn encrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        self.sealer.seal(packet_number, header, payload)
    }

    #[inline]
    fn tag_len(&self) -> usize {
        crate::TAG_LEN
    }
}

impl core::fmt::Debug for InitialKey {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("InitialKey").finish()
    }
}
