// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// A packet protection failure.
///
/// Authentication failures are fatal to the packet but not the connection:
/// the packet is dropped with no observable reaction (RFC 9000 §12.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error {
    pub reason: &'static str,
}

impl Error {
    /// The payload failed to authenticate or decrypt
    pub const DECRYPT_ERROR: Self = Self {
        reason: "decrypt error",
    };

    /// The crypto implementation failed internally
    pub const INTERNAL_ERROR: Self = Self {
        reason: "internal crypto error",
    };
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.reason)
    }
}

impl std::error::Error for Error {}
