// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Panic-free codec buffers for untrusted wire input and fixed-capacity
//! output slots.
//!
//! Decoding moves an immutable cursor over a borrowed byte slice; every
//! read is bounds-checked and failures surface as [`DecoderError`] instead
//! of panics. Encoding writes through a positional cursor into a caller
//! provided slice, which lets packet assembly reserve fields (such as a
//! long-header length) and patch them once the final size is known.

pub mod decoder;
pub mod encoder;

pub use decoder::*;
pub use encoder::*;
