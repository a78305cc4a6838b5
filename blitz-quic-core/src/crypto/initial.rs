// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto;
use hex_literal::hex;

/// Initial-level packet protection.
///
/// Initial keys are a pure function of the client's first destination
/// connection ID, so both endpoints derive the same bundle before any
/// key exchange has happened.
pub trait InitialKey: crypto::Key + Sized {
    type HeaderKey: crypto::HeaderKey;

    fn new_server(connection_id: &[u8]) -> (Self, Self::HeaderKey);
    fn new_client(connection_id: &[u8]) -> (Self, Self::HeaderKey);
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# initial_salt = 0x38762cf7f55934b34d179ae6a4c80cadccbb7f0a

pub const INITIAL_SALT: [u8; 20] = hex!("38762cf7f55934b34d179ae6a4c80cadccbb7f0a");

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# client_initial_secret = HKDF-Expand-Label(initial_secret,
//#                                           "client in", "",
//#                                           Hash.length)

pub const INITIAL_CLIENT_LABEL: [u8; 9] = *b"client in";

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# server_initial_secret = HKDF-Expand-Label(initial_secret,
//#                                           "server in", "",
//#                                           Hash.length)

pub const INITIAL_SERVER_LABEL: [u8; 9] = *b"server in";

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A
//# These packets use an 8-byte client-chosen Destination Connection ID of
//# 0x8394c8f03e515708.

pub const EXAMPLE_DCID: [u8; 8] = hex!("8394c8f03e515708");

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# client_initial_secret
//#     = HKDF-Expand-Label(initial_secret, "client in", "", 32)
//#     = c00cf151ca5be075ed0ebfb5c80323c4
//#       2d6b7db67881289af4008f1f6c357aea

pub const EXAMPLE_CLIENT_INITIAL_SECRET: [u8; 32] = hex!(
    "
    c00cf151ca5be075ed0ebfb5c80323c4
    2d6b7db67881289af4008f1f6c357aea
    "
);

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# key = HKDF-Expand-Label(client_initial_secret, "quic key", "", 16)
//#     = 1f369613dd76d5467730efcbe3b1a22d
//#
//# iv  = HKDF-Expand-Label(client_initial_secret, "quic iv", "", 12)
//#     = fa044b2f42a3fd3b46fb255c
//#
//# hp  = HKDF-Expand-Label(client_initial_secret, "quic hp", "", 16)
//#     = 9f50449e04a0e810283a1e9933adedd2

pub const EXAMPLE_CLIENT_KEY: [u8; 16] = hex!("1f369613dd76d5467730efcbe3b1a22d");
pub const EXAMPLE_CLIENT_IV: [u8; 12] = hex!("fa044b2f42a3fd3b46fb255c");
pub const EXAMPLE_CLIENT_HP: [u8; 16] = hex!("9f50449e04a0e810283a1e9933adedd2");

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# server_initial_secret
//#     = HKDF-Expand-Label(initial_secret, "server in", "", 32)
//#     = 3c199828fd139efd216c155ad844cc81
//#       fb82fa8d7446fa7d78be803acdda951b

pub const EXAMPLE_SERVER_INITIAL_SECRET: [u8; 32] = hex!(
    "
    3c199828fd139efd216c155ad844cc81
    fb82fa8d7446fa7d78be803acdda951b
    "
);

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# key = HKDF-Expand-Label(server_initial_secret, "quic key", "", 16)
//#     = cf3a5331653c364c88f0f379b6067e37
//#
//# iv  = HKDF-Expand-Label(server_initial_secret, "quic iv", "", 12)
//#     = 0ac1493ca1905853b0bba03e
//#
//# hp  = HKDF-Expand-Label(server_initial_secret, "quic hp", "", 16)
//#     = c206b8d9b9f0f37644430b490eeaa314

pub const EXAMPLE_SERVER_KEY: [u8; 16] = hex!("cf3a5331653c364c88f0f379b6067e37");
pub const EXAMPLE_SERVER_IV: [u8; 12] = hex!("0ac1493ca1905853b0bba03e");
pub const EXAMPLE_SERVER_HP: [u8; 16] = hex!("c206b8d9b9f0f37644430b490eeaa314");

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.2
//# The unprotected header indicates a length of 1182 bytes: the 4-byte
//# packet number, 1162 bytes of frames, and the 16-byte authentication
//# tag.  The header includes the connection ID and a packet number of 2:
//#
//# c300000001088394c8f03e5157080000449e00000002

#[cfg(test)]
const EXAMPLE_CLIENT_INITIAL_HEADER: [u8; 22] =
    hex!("c300000001088394c8f03e5157080000449e00000002");

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.2
//# sample = d1b1c98dd7689fb8ec11d242b123dc9b
//#
//# mask = AES-ECB(hp, sample)[0..4]
//#      = 437b9aec36
//#
//# header[0] ^= mask[0] & 0x0f
//#      = c0
//# header[18..22] ^= mask[1..5]
//#      = 7b9aec34
//# header = c000000001088394c8f03e5157080000449e7b9aec34

#[test]
fn client_initial_protection_test() {
    let mask = hex!("437b9aec36");
    let unprotected_header = EXAMPLE_CLIENT_INITIAL_HEADER;
    let protected_header = hex!("c000000001088394c8f03e5157080000449e7b9aec34");
    let packet_tag = 0b11; // 4 byte packet number

    header_protection_test_helper(mask, &unprotected_header, &protected_header, packet_tag);
}

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.3
//# The header from the server includes a new connection ID and a 2-byte
//# packet number encoding for a packet number of 1:
//#
//# c1000000010008f067a5502a4262b50040750001

#[cfg(test)]
const EXAMPLE_SERVER_INITIAL_HEADER: [u8; 20] =
    hex!("c1000000010008f067a5502a4262b50040750001");

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.3
//# As a result, after protection, the header protection sample is taken
//# starting from the third protected byte:
//#
//# sample = 2cd0991cd25b0aac406a5816b6394100
//# mask   = 2ec0d8356a
//# header = cf000000010008f067a5502a4262b5004075c0d9

#[test]
fn server_initial_protection_test() {
    let mask = hex!("2ec0d8356a");
    let unprotected_header = EXAMPLE_SERVER_INITIAL_HEADER;
    let protected_header = hex!("cf000000010008f067a5502a4262b5004075c0d9");
    let packet_tag = 0b01; // 2 byte packet number

    header_protection_test_helper(mask, &unprotected_header, &protected_header, packet_tag);
}

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.3
//# The server sends the following payload in response, including an ACK
//# frame, a CRYPTO frame, and no PADDING frames:
//#
//# 02000000000600405a020000560303ee fce7f7b37ba1d1632e96677825ddf739
//# 88cfc79825df566dc5430b9a045a1200 130100002e00330024001d00209d3c94
//# 0d89690b84d08a60993c144eca684d10 81287c834d5311bcf32bb9da1a002b00
//# 020304

/// Example payload from RFC 9001 Appendix A.3
pub const EXAMPLE_SERVER_INITIAL_PAYLOAD: [u8; 99] = hex!(
    "
    02000000000600405a020000560303ee fce7f7b37ba1d1632e96677825ddf739
    88cfc79825df566dc5430b9a045a1200 130100002e00330024001d00209d3c94
    0d89690b84d08a60993c144eca684d10 81287c834d5311bcf32bb9da1a002b00
    020304
    "
);

#[cfg(test)]
fn header_protection_test_helper(
    mask: crate::crypto::HeaderProtectionMask,
    unprotected_header: &[u8],
    protected_header: &[u8],
    packet_tag: u8,
) {
    use crate::{
        crypto::{
            header_crypto::{apply_header_protection, remove_header_protection},
            EncryptedPayload, ProtectedPayload,
        },
        packet::number::PacketNumberSpace,
    };
    let space = PacketNumberSpace::Initial;

    let packet_number_len = space.new_packet_number_len(packet_tag);
    let header_len = protected_header.len() - packet_number_len.bytesize();

    let mut subject = protected_header.to_vec();
    // the sample is drawn from the payload, which these vectors don't
    // carry; the mask is supplied directly
    subject.extend_from_slice(&[0u8; 32]);

    let (packet_number, _) = remove_header_protection(
        space,
        mask,
        ProtectedPayload::new(header_len, &mut subject),
    )
    .unwrap();

    assert_eq!(
        unprotected_header,
        &subject[..unprotected_header.len()],
        "packet protection removal failed"
    );
    assert_eq!(packet_number.len(), packet_number_len);

    apply_header_protection(
        mask,
        EncryptedPayload::new(header_len, packet_number_len, &mut subject),
    );

    assert_eq!(
        protected_header,
        &subject[..protected_header.len()],
        "packet protection application failed"
    );
}
