// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{transport, varint::VarInt};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# The stream does not have an explicit end, so CRYPTO frames do not have
//# a FIN bit.

/// The most handshake bytes a peer may leave buffered on one level.
///
/// A ClientHello is bounded at 16 KiB by TLS; the full inbound flight is
/// comfortably inside this.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// An offset-indexed reassembly log for one crypto stream direction.
///
/// CRYPTO frames may arrive out of order and duplicated; bytes at a given
/// offset are written once and must agree with any retransmission. The TLS
/// engine only ever consumes the contiguous prefix.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    buffer: Vec<u8>,
    /// sorted, disjoint, merged `[start, end)` ranges of received bytes
    received: Vec<(u64, u64)>,
    consumed: u64,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `data` at `offset`, tolerating duplicates and reordering.
    ///
    /// Overlapping bytes that disagree with what was already received are a
    /// peer protocol violation.
    pub fn append(&mut self, offset: VarInt, data: &[u8]) -> Result<(), transport::Error> {
        if data.is_empty() {
            return Ok(());
        }

        let start = offset.as_u64();
        let end = start
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_BUFFER_SIZE as u64)
            .ok_or_else(|| {
                transport::Error::CRYPTO_BUFFER_EXCEEDED
                    .with_reason("peer exceeded the crypto stream buffer")
            })?;

        if self.buffer.len() < end as usize {
            self.buffer.resize(end as usize, 0);
        }

        for &(s, e) in &self.received {
            let overlap_start = s.max(start);
            let overlap_end = e.min(end);
            if overlap_start < overlap_end {
                let existing = &self.buffer[overlap_start as usize..overlap_end as usize];
                let incoming = &data[(overlap_start - start) as usize..(overlap_end - start) as usize];
                if existing != incoming {
                    return Err(transport::Error::PROTOCOL_VIOLATION
                        .with_reason("crypto stream retransmission mismatch"));
                }
            }
        }

        self.buffer[start as usize..end as usize].copy_from_slice(data);
        self.mark_received(start, end);

        Ok(())
    }

    fn mark_received(&mut self, start: u64, end: u64) {
        let mut merged = (start, end);
        let mut out = Vec::with_capacity(self.received.len() + 1);
        let mut inserted = false;

        for &(s, e) in &self.received {
            if e < merged.0 {
                out.push((s, e));
            } else if s > merged.1 {
                if !inserted {
                    out.push(merged);
                    inserted = true;
                }
                out.push((s, e));
            } else {
                merged.0 = merged.0.min(s);
                merged.1 = merged.1.max(e);
            }
        }
        if !inserted {
            out.push(merged);
        }

        self.received = out;
    }

    /// The end of the contiguous prefix starting at offset zero
    pub fn contiguous_end(&self) -> u64 {
        match self.received.first() {
            Some(&(0, end)) => end,
            _ => 0,
        }
    }

    /// The received-but-unconsumed contiguous bytes
    pub fn contiguous_prefix(&self) -> &[u8] {
        let end = self.contiguous_end();
        if self.consumed >= end {
            return &[];
        }
        &self.buffer[self.consumed as usize..end as usize]
    }

    /// Marks `len` bytes of the contiguous prefix as delivered
    pub fn consume(&mut self, len: usize) {
        self.consumed += len as u64;
        debug_assert!(self.consumed <= self.contiguous_end());
    }

    /// The absolute offset of the next byte to deliver
    pub fn consumed_offset(&self) -> u64 {
        self.consumed
    }
}
