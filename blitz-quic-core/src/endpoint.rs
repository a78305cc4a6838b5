// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// The role of an endpoint on a connection.
///
/// Key schedules are direction-sensitive: client-direction keys protect
/// packets the server receives, and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Client,
    Server,
}

impl Type {
    #[inline]
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }

    #[inline]
    pub fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }

    /// The peer's role
    #[inline]
    pub fn peer_type(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}
