// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use blitz_quic_core::crypto::{
    self, packet_protection, tls, HeaderProtectionMask, HEADER_PROTECTION_MASK_LEN,
};
use rustls::quic;

/// Adapts one level's rustls key set to the core crypto traits.
///
/// `local` keys seal what this endpoint sends; `remote` keys open what the
/// peer sent. This works for either role, so client-side tooling can reuse
/// it against a `quic::ClientConnection`.
pub fn key_pair(keys: quic::Keys) -> tls::KeyPair {
    tls::KeyPair {
        key: Box::new(PacketKeyPair {
            sealer: keys.local.packet,
            opener: keys.remote.packet,
        }),
        header_key: Box::new(HeaderKeyPair {
            sealer: keys.local.header,
            opener: keys.remote.header,
        }),
    }
}

struct PacketKeyPair {
    sealer: Box<dyn quic::PacketKey>,
    opener: Box<dyn quic::PacketKey>,
}

impl crypto::Key for PacketKeyPair {
    fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        self.opener
            .decrypt_in_place(packet_number, header, payload)
            .map(|_| ())
            .map_err(|_| packet_protection::Error::DECRYPT_ERROR)
    }

    fn encrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        let cleartext_len = payload
            .len()
            .checked_sub(self.sealer.tag_len())
            .ok_or(packet_protection::Error::INTERNAL_ERROR)?;
        let (cleartext, tag_space) = payload.split_at_mut(cleartext_len);

        let tag = self
            .sealer
            .encrypt_in_place(packet_number, header, cleartext)
            .map_err(|_| packet_protection::Error::INTERNAL_ERROR)?;
        tag_space.copy_from_slice(tag.as_ref());

        Ok(())
    }

    fn tag_len(&self) -> usize {
        self.sealer.tag_len()
    }
}

struct HeaderKeyPair {
    sealer: Box<dyn quic::HeaderProtectionKey>,
    opener: Box<dyn quic::HeaderProtectionKey>,
}

/// Recovers the raw 5-byte mask from rustls's in-place masking API.
///
/// rustls XORs the mask into a first byte and packet number directly; a
/// zeroed short-header template therefore reads the mask back out. The
/// short form exposes five bits of `mask[0]`, a superset of the four the
/// long form uses, so one template serves both header forms.
fn recover_mask(key: &dyn quic::HeaderProtectionKey, sample: &[u8]) -> HeaderProtectionMask {
    let mut mask = [0u8; HEADER_PROTECTION_MASK_LEN];
    let (first, packet_number) = mask.split_at_mut(1);

    key.encrypt_in_place(sample, &mut first[0], packet_number)
        .expect("sample length already checked");

    mask
}

impl crypto::HeaderKey for HeaderKeyPair {
    fn opening_header_protection_mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        recover_mask(self.opener.as_ref(), sample)
    }

    fn opening_sample_len(&self) -> usize {
        self.opener.sample_len()
    }

    fn sealing_header_protection_mask(&self, sample: &[u8]) -> HeaderProtectionMask {
        recover_mask(self.sealer.as_ref(), sample)
    }

    fn sealing_sample_len(&self) -> usize {
        self.sealer.sample_len()
    }
}
